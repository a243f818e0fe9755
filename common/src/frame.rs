use std::time::Duration;

use serde::Serialize;

use crate::gpu::Texture;

/// Region of the texture that carries captured content, in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ContentRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ContentRect {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// Estimated global content motion since the previous captured frame, in
/// source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MotionHint {
    pub x: f32,
    pub y: f32,
}

impl MotionHint {
    pub const ZERO: MotionHint = MotionHint { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A frame delivered by the capture producer.
///
/// `timestamp` is the monotonic source presentation time. The texture handle
/// is shared, so holding a frame keeps its texture alive.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub texture: Texture,
    pub timestamp: Duration,
    pub content_rect: ContentRect,
    pub motion_hint: MotionHint,
}

impl CapturedFrame {
    /// Frame whose content covers the whole texture.
    pub fn new(texture: Texture, timestamp: Duration, motion_hint: MotionHint) -> Self {
        let content_rect = ContentRect::full(texture.width(), texture.height());
        Self {
            texture,
            timestamp,
            content_rect,
            motion_hint,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.texture.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{DeviceDescriptor, PixelFormat, RenderDevice, TextureDescriptor};

    #[test]
    fn new_frame_covers_whole_texture() {
        let device = RenderDevice::new(DeviceDescriptor {
            threads: 1,
            ..Default::default()
        })
        .unwrap();
        let texture = device
            .create_texture(TextureDescriptor::new(320, 180, PixelFormat::Bgra8Unorm))
            .unwrap();
        let frame = CapturedFrame::new(texture, Duration::from_millis(33), MotionHint::ZERO);
        assert_eq!(frame.content_rect, ContentRect::full(320, 180));
        assert_eq!(frame.size(), (320, 180));
    }

    #[test]
    fn cloned_frame_shares_texture() {
        let device = RenderDevice::new(DeviceDescriptor {
            threads: 1,
            ..Default::default()
        })
        .unwrap();
        let texture = device
            .create_texture(TextureDescriptor::new(4, 4, PixelFormat::Bgra8Unorm))
            .unwrap();
        let frame = CapturedFrame::new(texture, Duration::ZERO, MotionHint::new(1.0, -2.0));
        let copy = frame.clone();
        assert!(copy.texture.ptr_eq(&frame.texture));
        assert_eq!(device.live_textures(), 1);
    }
}
