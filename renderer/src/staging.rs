use retimer_common::gpu::{CommandBuffer, GpuError, RenderDevice, Texture, TextureSlot};

/// Result of staging one newly arrived frame.
#[derive(Debug, Clone)]
pub struct StagedFrame {
    pub current: Texture,
    /// Set only when the other slot holds a frame of exactly the same shape.
    pub previous: Option<Texture>,
}

/// Current/previous frame pair.
///
/// With frame generation on, each new frame is copied into one of two slots
/// and the write index flips, so the slot written last tick stays readable as
/// the previous frame. With it off the upscaled texture is used directly and
/// both slots are dropped, so re-enabling starts without a previous frame.
#[derive(Debug, Default)]
pub struct FrameStaging {
    slots: [TextureSlot; 2],
    write_index: usize,
    current: Option<Texture>,
    previous: Option<Texture>,
}

impl FrameStaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Texture> {
        self.current.as_ref()
    }

    pub fn previous(&self) -> Option<&Texture> {
        self.previous.as_ref()
    }

    pub fn stage(
        &mut self,
        device: &RenderDevice,
        cmd: &mut CommandBuffer,
        source: &Texture,
        frame_generation_enabled: bool,
    ) -> Result<StagedFrame, GpuError> {
        if !frame_generation_enabled {
            self.reset();
            self.current = Some(source.clone());
            return Ok(StagedFrame {
                current: source.clone(),
                previous: None,
            });
        }

        let write_index = self.write_index;
        let read_index = (write_index + 1) % 2;
        let target = self.slots[write_index].ensure(device, source.descriptor())?;

        self.previous = self.slots[read_index]
            .get()
            .filter(|previous| previous.is_compatible_with(&target))
            .cloned();

        cmd.copy_texture(source, &target);
        self.current = Some(target.clone());
        self.write_index = read_index;

        Ok(StagedFrame {
            current: target,
            previous: self.previous.clone(),
        })
    }

    /// Drop both slots and forget the pair.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.clear();
        }
        self.write_index = 0;
        self.current = None;
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{solid_texture, test_device};

    #[test]
    fn slots_ping_pong_and_previous_survives_one_frame() {
        let device = test_device();
        let mut staging = FrameStaging::new();

        let a = solid_texture(&device, 8, 8, 0.25);
        let mut cmd = device.command_buffer("stage");
        let first = staging.stage(&device, &mut cmd, &a, true).unwrap();
        cmd.commit();
        assert!(first.previous.is_none());
        assert_eq!(first.current.texel(3, 3)[0], 0.25);

        let b = solid_texture(&device, 8, 8, 0.75);
        let mut cmd = device.command_buffer("stage");
        let second = staging.stage(&device, &mut cmd, &b, true).unwrap();
        cmd.commit();
        let previous = second.previous.expect("previous should be valid");
        assert!(previous.ptr_eq(&first.current));
        assert!(!second.current.ptr_eq(&first.current));
        assert_eq!(previous.texel(0, 0)[0], 0.25);
        assert_eq!(second.current.texel(0, 0)[0], 0.75);

        let mut cmd = device.command_buffer("stage");
        let third = staging.stage(&device, &mut cmd, &a, true).unwrap();
        cmd.commit();
        assert!(third.current.ptr_eq(&first.current));
    }

    #[test]
    fn shape_change_invalidates_previous() {
        let device = test_device();
        let mut staging = FrameStaging::new();
        let mut cmd = device.command_buffer("stage");
        staging
            .stage(&device, &mut cmd, &solid_texture(&device, 8, 8, 0.1), true)
            .unwrap();
        let staged = staging
            .stage(&device, &mut cmd, &solid_texture(&device, 16, 8, 0.1), true)
            .unwrap();
        cmd.commit();
        assert!(staged.previous.is_none());
        assert!(staging.previous().is_none());
    }

    #[test]
    fn disabled_generation_uses_source_directly() {
        let device = test_device();
        let mut staging = FrameStaging::new();
        let source = solid_texture(&device, 4, 4, 0.5);
        let mut cmd = device.command_buffer("stage");
        let staged = staging.stage(&device, &mut cmd, &source, false).unwrap();
        assert_eq!(cmd.pass_count(), 0);
        assert!(staged.current.ptr_eq(&source));
        assert!(staged.previous.is_none());
    }

    #[test]
    fn reenabling_generation_starts_without_previous() {
        let device = test_device();
        let mut staging = FrameStaging::new();
        let mut cmd = device.command_buffer("stage");
        staging
            .stage(&device, &mut cmd, &solid_texture(&device, 8, 8, 0.1), true)
            .unwrap();
        staging
            .stage(&device, &mut cmd, &solid_texture(&device, 8, 8, 0.2), true)
            .unwrap();
        let direct = solid_texture(&device, 8, 8, 0.9);
        staging.stage(&device, &mut cmd, &direct, false).unwrap();
        assert!(staging.previous().is_none());

        let staged = staging.stage(&device, &mut cmd, &direct, true).unwrap();
        cmd.commit();
        assert!(staged.previous.is_none());
        assert_eq!(staged.current.texel(4, 4)[0], 0.9);
    }

    #[test]
    fn reset_releases_slot_textures() {
        let device = test_device();
        let mut staging = FrameStaging::new();
        let source = solid_texture(&device, 4, 4, 0.5);
        let mut cmd = device.command_buffer("stage");
        staging.stage(&device, &mut cmd, &source, true).unwrap();
        staging.stage(&device, &mut cmd, &source, true).unwrap();
        cmd.commit();
        assert_eq!(device.live_textures(), 3);
        staging.reset();
        assert_eq!(device.live_textures(), 1);
    }
}
