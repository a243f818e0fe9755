use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use image::{ImageBuffer, Rgba};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use super::command::CommandBuffer;
use super::texture::{Texels, Texture, TextureDescriptor};
use super::GpuError;

/// Optional capabilities of a device. Pipelines that need a missing feature
/// fail to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFeatures {
    /// Full-screen render passes (resample, present, interpolation).
    pub render: bool,
    /// Compute kernels (block-matching flow estimation).
    pub compute: bool,
    /// The super-resolution spatial scaler.
    pub spatial_scaler: bool,
}

impl Default for DeviceFeatures {
    fn default() -> Self {
        Self {
            render: true,
            compute: true,
            spatial_scaler: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub max_texture_dimension: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_texture_dimension: 16384,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub label: String,
    /// Worker threads for pass execution. 0 lets rayon pick.
    pub threads: usize,
    pub features: DeviceFeatures,
    pub limits: DeviceLimits,
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self {
            label: "retimer-gpu".into(),
            threads: 0,
            features: DeviceFeatures::default(),
            limits: DeviceLimits::default(),
        }
    }
}

/// Texture bookkeeping shared by the device and every texture it created.
#[derive(Debug, Default)]
pub(crate) struct AllocationCounters {
    next_id: AtomicU64,
    pub(crate) live: AtomicUsize,
    allocated: AtomicU64,
}

struct DeviceInner {
    label: String,
    features: DeviceFeatures,
    limits: DeviceLimits,
    pool: ThreadPool,
    counters: Arc<AllocationCounters>,
}

/// Handle to the render device. Cheap to clone.
#[derive(Clone)]
pub struct RenderDevice {
    inner: Arc<DeviceInner>,
}

impl fmt::Debug for RenderDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderDevice")
            .field("label", &self.inner.label)
            .field("features", &self.inner.features)
            .field("threads", &self.inner.pool.current_num_threads())
            .finish()
    }
}

/// Built render pipeline. Holding one proves the device can run the pass.
#[derive(Debug, Clone)]
pub struct RenderPipeline {
    label: &'static str,
}

impl RenderPipeline {
    pub fn label(&self) -> &'static str {
        self.label
    }
}

/// Built compute pipeline.
#[derive(Debug, Clone)]
pub struct ComputePipeline {
    label: &'static str,
}

impl ComputePipeline {
    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl RenderDevice {
    pub fn new(descriptor: DeviceDescriptor) -> Result<Self, GpuError> {
        let label = descriptor.label.clone();
        let pool = ThreadPoolBuilder::new()
            .num_threads(descriptor.threads)
            .thread_name(move |i| format!("{label}-{i}"))
            .build()
            .map_err(|e| GpuError::DeviceCreation(e.to_string()))?;

        info!(
            label = descriptor.label,
            threads = pool.current_num_threads(),
            render = descriptor.features.render,
            compute = descriptor.features.compute,
            spatial_scaler = descriptor.features.spatial_scaler,
            "render device created"
        );

        Ok(Self {
            inner: Arc::new(DeviceInner {
                label: descriptor.label,
                features: descriptor.features,
                limits: descriptor.limits,
                pool,
                counters: Arc::new(AllocationCounters::default()),
            }),
        })
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn features(&self) -> DeviceFeatures {
        self.inner.features
    }

    pub fn limits(&self) -> DeviceLimits {
        self.inner.limits
    }

    /// Allocate a texture cleared to transparent black.
    pub fn create_texture(&self, descriptor: TextureDescriptor) -> Result<Texture, GpuError> {
        self.validate(&descriptor)?;
        let texels: Texels =
            ImageBuffer::from_pixel(descriptor.width, descriptor.height, Rgba([0.0; 4]));
        Ok(self.wrap(descriptor, texels))
    }

    /// Upload CPU texels into a new texture of the given format.
    pub fn create_texture_from_texels(
        &self,
        format: super::PixelFormat,
        texels: Texels,
    ) -> Result<Texture, GpuError> {
        let descriptor = TextureDescriptor::new(texels.width(), texels.height(), format);
        self.validate(&descriptor)?;
        Ok(self.wrap(descriptor, texels))
    }

    pub fn command_buffer(&self, label: &'static str) -> CommandBuffer {
        CommandBuffer::new(self.clone(), label)
    }

    pub fn make_render_pipeline(&self, label: &'static str) -> Result<RenderPipeline, GpuError> {
        if !self.inner.features.render {
            return Err(GpuError::UnsupportedFeature("render pipelines"));
        }
        debug!(label, "render pipeline built");
        Ok(RenderPipeline { label })
    }

    pub fn make_compute_pipeline(&self, label: &'static str) -> Result<ComputePipeline, GpuError> {
        if !self.inner.features.compute {
            return Err(GpuError::UnsupportedFeature("compute pipelines"));
        }
        debug!(label, "compute pipeline built");
        Ok(ComputePipeline { label })
    }

    pub fn supports_spatial_scaler(&self) -> bool {
        self.inner.features.spatial_scaler
    }

    /// Textures currently alive (created by this device and not yet dropped).
    pub fn live_textures(&self) -> usize {
        self.inner.counters.live.load(Ordering::Relaxed)
    }

    /// Total textures ever allocated by this device.
    pub fn textures_allocated(&self) -> u64 {
        self.inner.counters.allocated.load(Ordering::Relaxed)
    }

    /// Run `work` on the device pool, blocking until it completes.
    pub(crate) fn execute<R: Send>(&self, work: impl FnOnce() -> R + Send) -> R {
        self.inner.pool.install(work)
    }

    fn validate(&self, descriptor: &TextureDescriptor) -> Result<(), GpuError> {
        let limit = self.inner.limits.max_texture_dimension;
        if descriptor.width == 0
            || descriptor.height == 0
            || descriptor.width > limit
            || descriptor.height > limit
        {
            return Err(GpuError::InvalidTextureSize {
                width: descriptor.width,
                height: descriptor.height,
                limit,
            });
        }
        Ok(())
    }

    fn wrap(&self, descriptor: TextureDescriptor, texels: Texels) -> Texture {
        let counters = &self.inner.counters;
        let id = counters.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        counters.live.fetch_add(1, Ordering::Relaxed);
        counters.allocated.fetch_add(1, Ordering::Relaxed);
        Texture::new(id, descriptor, texels, Arc::clone(counters))
    }
}
