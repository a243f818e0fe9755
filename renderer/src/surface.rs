use retimer_common::gpu::{
    GpuError, PixelFormat, RenderDevice, Texture, TextureDescriptor, TextureSlot,
};
use tracing::debug;

const DRAWABLE_COUNT: usize = 3;

/// Where presented frames end up. The host drives `present` timing off
/// `preferred_fps`.
pub trait DisplaySurface: Send {
    fn drawable_size(&self) -> (u32, u32);

    fn preferred_fps(&self) -> u32;

    fn set_preferred_fps(&mut self, fps: u32);

    /// Next texture to render into, sized to `drawable_size`.
    fn next_drawable(&mut self) -> Result<Texture, GpuError>;

    fn present(&mut self, drawable: Texture);
}

/// Headless surface backed by a ring of drawables.
#[derive(Debug)]
pub struct OffscreenSurface {
    device: RenderDevice,
    size: (u32, u32),
    preferred_fps: u32,
    drawables: [TextureSlot; DRAWABLE_COUNT],
    next_index: usize,
    last_presented: Option<Texture>,
    presented_count: u64,
}

impl OffscreenSurface {
    pub fn new(device: &RenderDevice, width: u32, height: u32) -> Self {
        Self {
            device: device.clone(),
            size: (width.max(1), height.max(1)),
            preferred_fps: 60,
            drawables: Default::default(),
            next_index: 0,
            last_presented: None,
            presented_count: 0,
        }
    }

    /// Change the drawable size. Drawables are recreated lazily.
    pub fn resize(&mut self, width: u32, height: u32) {
        let size = (width.max(1), height.max(1));
        if size != self.size {
            debug!(width = size.0, height = size.1, "offscreen surface resized");
            self.size = size;
        }
    }

    pub fn last_presented(&self) -> Option<&Texture> {
        self.last_presented.as_ref()
    }

    pub fn presented_count(&self) -> u64 {
        self.presented_count
    }
}

impl DisplaySurface for OffscreenSurface {
    fn drawable_size(&self) -> (u32, u32) {
        self.size
    }

    fn preferred_fps(&self) -> u32 {
        self.preferred_fps
    }

    fn set_preferred_fps(&mut self, fps: u32) {
        self.preferred_fps = fps.max(1);
    }

    fn next_drawable(&mut self) -> Result<Texture, GpuError> {
        let descriptor = TextureDescriptor::new(self.size.0, self.size.1, PixelFormat::Bgra8Unorm);
        let drawable = self.drawables[self.next_index].ensure(&self.device, descriptor)?;
        self.next_index = (self.next_index + 1) % DRAWABLE_COUNT;
        Ok(drawable)
    }

    fn present(&mut self, drawable: Texture) {
        self.presented_count += 1;
        self.last_presented = Some(drawable);
    }
}
