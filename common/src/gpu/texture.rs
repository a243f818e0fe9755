use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use image::Rgba32FImage;

use super::device::{AllocationCounters, RenderDevice};
use super::GpuError;

/// Texel storage. Colour formats keep normalized RGBA; `Rg16Float` uses the
/// red and green channels only.
pub type Texels = Rgba32FImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Bgra8Unorm,
    Rgba8Unorm,
    Rg16Float,
}

impl PixelFormat {
    pub fn is_color(self) -> bool {
        matches!(self, PixelFormat::Bgra8Unorm | PixelFormat::Rgba8Unorm)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl TextureDescriptor {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }
}

struct TextureInner {
    id: u64,
    descriptor: TextureDescriptor,
    texels: RwLock<Texels>,
    counters: Arc<AllocationCounters>,
}

impl Drop for TextureInner {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Opaque texture handle. Clones share the same storage and identity.
#[derive(Clone)]
pub struct Texture {
    inner: Arc<TextureInner>,
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.inner.id)
            .field("width", &self.inner.descriptor.width)
            .field("height", &self.inner.descriptor.height)
            .field("format", &self.inner.descriptor.format)
            .finish()
    }
}

impl Texture {
    pub(crate) fn new(
        id: u64,
        descriptor: TextureDescriptor,
        texels: Texels,
        counters: Arc<AllocationCounters>,
    ) -> Self {
        Self {
            inner: Arc::new(TextureInner {
                id,
                descriptor,
                texels: RwLock::new(texels),
                counters,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn descriptor(&self) -> TextureDescriptor {
        self.inner.descriptor
    }

    pub fn width(&self) -> u32 {
        self.inner.descriptor.width
    }

    pub fn height(&self) -> u32 {
        self.inner.descriptor.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.inner.descriptor.width, self.inner.descriptor.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.inner.descriptor.format
    }

    /// Same dimensions and format, so one can stand in for the other.
    pub fn is_compatible_with(&self, other: &Texture) -> bool {
        self.inner.descriptor == other.inner.descriptor
    }

    pub fn ptr_eq(&self, other: &Texture) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Texels> {
        self.inner
            .texels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Texels> {
        self.inner
            .texels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Read back one texel. Meant for inspection, not for hot paths.
    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        self.read().get_pixel(x, y).0
    }
}

/// Arena slot holding at most one cached texture.
///
/// The cached texture is handed out again while the requested shape matches;
/// any other shape drops it and allocates a fresh one.
#[derive(Debug, Default)]
pub struct TextureSlot {
    texture: Option<Texture>,
}

impl TextureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure(
        &mut self,
        device: &RenderDevice,
        descriptor: TextureDescriptor,
    ) -> Result<Texture, GpuError> {
        if let Some(texture) = &self.texture {
            if texture.descriptor() == descriptor {
                return Ok(texture.clone());
            }
        }

        self.texture = None;
        let texture = device.create_texture(descriptor)?;
        self.texture = Some(texture.clone());
        Ok(texture)
    }

    pub fn get(&self) -> Option<&Texture> {
        self.texture.as_ref()
    }

    pub fn clear(&mut self) {
        self.texture = None;
    }
}
