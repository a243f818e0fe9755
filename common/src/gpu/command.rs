use rayon::prelude::*;
use tracing::{trace, warn};

use super::device::RenderDevice;
use super::texture::{Texels, Texture};

type Pass = Box<dyn FnOnce() + Send>;

/// Sequential list of passes, executed in order on [`CommandBuffer::commit`].
pub struct CommandBuffer {
    device: RenderDevice,
    label: &'static str,
    passes: Vec<(&'static str, Pass)>,
}

impl CommandBuffer {
    pub(crate) fn new(device: RenderDevice, label: &'static str) -> Self {
        Self {
            device,
            label,
            passes: Vec::new(),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn device(&self) -> &RenderDevice {
        &self.device
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Record an arbitrary pass. The closure runs on the device pool, so
    /// anything it does with rayon is scheduled there.
    pub fn encode_pass(&mut self, label: &'static str, pass: impl FnOnce() + Send + 'static) {
        self.passes.push((label, Box::new(pass)));
    }

    /// Blit `source` into `destination`. Both must share a descriptor.
    pub fn copy_texture(&mut self, source: &Texture, destination: &Texture) {
        if !source.is_compatible_with(destination) {
            warn!(
                source = ?source.descriptor(),
                destination = ?destination.descriptor(),
                "skipping copy between incompatible textures"
            );
            return;
        }
        if source.ptr_eq(destination) {
            return;
        }

        let source = source.clone();
        let destination = destination.clone();
        self.encode_pass("copy", move || {
            let from = source.read();
            let mut to = destination.write();
            let from: &[f32] = &from;
            let to: &mut [f32] = &mut to;
            to.copy_from_slice(from);
        });
    }

    pub fn clear_texture(&mut self, texture: &Texture, color: [f32; 4]) {
        let texture = texture.clone();
        self.encode_pass("clear", move || {
            let mut texels = texture.write();
            dispatch_pixels(&mut texels, |_, _| color);
        });
    }

    /// Execute every recorded pass in order, returning once all have run.
    pub fn commit(self) {
        let label = self.label;
        let passes = self.passes;
        trace!(label, passes = passes.len(), "committing command buffer");
        self.device.execute(move || {
            for (pass_label, pass) in passes {
                trace!(command_buffer = label, pass = pass_label, "executing pass");
                pass();
            }
        });
    }
}

/// Evaluate `shader` for every texel of `target`, rows in parallel.
pub fn dispatch_pixels<F>(target: &mut Texels, shader: F)
where
    F: Fn(u32, u32) -> [f32; 4] + Sync + Send,
{
    let width = target.width() as usize;
    if width == 0 {
        return;
    }
    let texels: &mut [f32] = target;
    texels
        .par_chunks_mut(width * 4)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, texel) in row.chunks_exact_mut(4).enumerate() {
                texel.copy_from_slice(&shader(x as u32, y as u32));
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{DeviceDescriptor, PixelFormat, TextureDescriptor};

    #[test]
    fn passes_run_in_recorded_order() {
        let device = RenderDevice::new(DeviceDescriptor {
            threads: 2,
            ..Default::default()
        })
        .unwrap();
        let descriptor = TextureDescriptor::new(3, 2, PixelFormat::Bgra8Unorm);
        let a = device.create_texture(descriptor).unwrap();
        let b = device.create_texture(descriptor).unwrap();

        let mut cmd = device.command_buffer("test");
        cmd.clear_texture(&a, [0.25, 0.5, 0.75, 1.0]);
        cmd.copy_texture(&a, &b);
        cmd.clear_texture(&a, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(cmd.pass_count(), 3);
        cmd.commit();

        assert_eq!(b.texel(2, 1), [0.25, 0.5, 0.75, 1.0]);
        assert_eq!(a.texel(0, 0), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn incompatible_copy_is_skipped() {
        let device = RenderDevice::new(DeviceDescriptor {
            threads: 1,
            ..Default::default()
        })
        .unwrap();
        let a = device
            .create_texture(TextureDescriptor::new(2, 2, PixelFormat::Bgra8Unorm))
            .unwrap();
        let b = device
            .create_texture(TextureDescriptor::new(4, 2, PixelFormat::Bgra8Unorm))
            .unwrap();
        let mut cmd = device.command_buffer("test");
        cmd.copy_texture(&a, &b);
        assert_eq!(cmd.pass_count(), 0);
    }
}
