//! Software render device.
//!
//! Mirrors the contract of a hardware GPU queue closely enough that the
//! pipeline above it never needs to know the difference: textures are opaque
//! handles with identity, pipelines are built up front and can fail on
//! missing features, and work is recorded into a command buffer that is
//! executed in order on the device's own worker pool.

mod command;
mod device;
mod sampler;
mod texture;

pub use command::{dispatch_pixels, CommandBuffer};
pub use device::{
    ComputePipeline, DeviceDescriptor, DeviceFeatures, DeviceLimits, RenderDevice, RenderPipeline,
};
pub use sampler::{load, luminance, mix, saturate, FilterMode, Sampler};
pub use texture::{PixelFormat, Texels, Texture, TextureDescriptor, TextureSlot};

#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("failed to create render device: {0}")]
    DeviceCreation(String),
    #[error("device does not support {0}")]
    UnsupportedFeature(&'static str),
    #[error("invalid texture size {width}x{height} (limit {limit})")]
    InvalidTextureSize { width: u32, height: u32, limit: u32 },
}
