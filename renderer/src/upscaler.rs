use retimer_common::gpu::{
    dispatch_pixels, load, CommandBuffer, GpuError, PixelFormat, RenderDevice, Sampler, Texels,
    Texture, TextureDescriptor, TextureSlot,
};
use retimer_common::settings::{RenderSettings, UpscalingAlgorithm};
use tracing::{debug, warn};

use crate::compositor::Compositor;

#[derive(Debug, thiserror::Error)]
pub enum UpscaleError {
    #[error("device has no spatial scaler")]
    UnsupportedDevice,
    #[error("spatial scaler cannot process {0:?} textures")]
    UnsupportedFormat(PixelFormat),
}

/// How a frame is brought to its target size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpscalePath {
    Resample(Sampler),
    /// Spatial scaler, resampling with `fallback` if it cannot run.
    SuperResolution { fallback: Sampler },
}

impl UpscalePath {
    pub fn for_settings(settings: &RenderSettings) -> Self {
        let sampler = settings.sampling_mode.sampler();
        match settings.upscaling_algorithm {
            UpscalingAlgorithm::NativeLinear => UpscalePath::Resample(sampler),
            UpscalingAlgorithm::SuperResolution => UpscalePath::SuperResolution { fallback: sampler },
        }
    }
}

/// Target size for `input` scaled by `scale`, truncated and at least 1x1.
pub fn scaled_size(input: (u32, u32), scale: f32) -> (u32, u32) {
    let width = (input.0 as f32 * scale) as u32;
    let height = (input.1 as f32 * scale) as u32;
    (width.max(1), height.max(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScalerDescriptor {
    input: TextureDescriptor,
    output: TextureDescriptor,
}

/// Catmull-Rom spatial scaler with local min/max clamping against ringing.
#[derive(Debug)]
pub struct SuperResolutionScaler {
    device: RenderDevice,
    descriptor: Option<ScalerDescriptor>,
    descriptor_builds: u64,
}

impl SuperResolutionScaler {
    pub fn new(device: &RenderDevice) -> Self {
        Self {
            device: device.clone(),
            descriptor: None,
            descriptor_builds: 0,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.device.supports_spatial_scaler()
    }

    /// Times the scaler was rebuilt for a new input/output shape.
    pub fn descriptor_builds(&self) -> u64 {
        self.descriptor_builds
    }

    pub fn encode(
        &mut self,
        cmd: &mut CommandBuffer,
        input: &Texture,
        output: &Texture,
    ) -> Result<(), UpscaleError> {
        if !self.is_supported() {
            return Err(UpscaleError::UnsupportedDevice);
        }
        for format in [input.format(), output.format()] {
            if !format.is_color() {
                return Err(UpscaleError::UnsupportedFormat(format));
            }
        }

        let descriptor = ScalerDescriptor {
            input: input.descriptor(),
            output: output.descriptor(),
        };
        if self.descriptor != Some(descriptor) {
            debug!(?descriptor, "building spatial scaler");
            self.descriptor = Some(descriptor);
            self.descriptor_builds += 1;
        }

        let input = input.clone();
        let output = output.clone();
        cmd.encode_pass("spatial-scaler", move || {
            let source = input.read();
            let mut target = output.write();
            catmull_rom(&source, &mut target);
        });
        Ok(())
    }
}

fn catmull_rom_weights(t: f32) -> [f32; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        0.5 * (-t3 + 2.0 * t2 - t),
        0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
        0.5 * (-3.0 * t3 + 4.0 * t2 + t),
        0.5 * (t3 - t2),
    ]
}

fn catmull_rom(source: &Texels, target: &mut Texels) {
    let ratio_x = source.width() as f32 / target.width().max(1) as f32;
    let ratio_y = source.height() as f32 / target.height().max(1) as f32;

    dispatch_pixels(target, |x, y| {
        let sx = (x as f32 + 0.5) * ratio_x - 0.5;
        let sy = (y as f32 + 0.5) * ratio_y - 0.5;
        let ix = sx.floor();
        let iy = sy.floor();
        let wx = catmull_rom_weights(sx - ix);
        let wy = catmull_rom_weights(sy - iy);
        let (ix, iy) = (ix as i64, iy as i64);

        let mut color = [0.0f32; 4];
        for (j, weight_y) in wy.iter().enumerate() {
            for (i, weight_x) in wx.iter().enumerate() {
                let texel = load(source, ix - 1 + i as i64, iy - 1 + j as i64);
                let weight = weight_x * weight_y;
                for c in 0..4 {
                    color[c] += texel[c] * weight;
                }
            }
        }

        let mut low = [f32::MAX; 4];
        let mut high = [f32::MIN; 4];
        for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            let texel = load(source, ix + dx, iy + dy);
            for c in 0..4 {
                low[c] = low[c].min(texel[c]);
                high[c] = high[c].max(texel[c]);
            }
        }
        for c in 0..4 {
            color[c] = color[c].clamp(low[c], high[c]);
        }
        color
    });
}

/// Resizes captured frames, caching one output texture per shape.
pub struct SpatialUpscaler {
    device: RenderDevice,
    resampler: Compositor,
    scaler: SuperResolutionScaler,
    scratch: TextureSlot,
    logged_fallback: bool,
    logged_unavailable_target: bool,
}

impl SpatialUpscaler {
    pub fn new(device: &RenderDevice) -> Result<Self, GpuError> {
        Ok(Self {
            device: device.clone(),
            resampler: Compositor::new(device)?,
            scaler: SuperResolutionScaler::new(device),
            scratch: TextureSlot::new(),
            logged_fallback: false,
            logged_unavailable_target: false,
        })
    }

    pub fn scaler(&self) -> &SuperResolutionScaler {
        &self.scaler
    }

    /// Whether the super-resolution fallback has fired this session.
    pub fn fallback_logged(&self) -> bool {
        self.logged_fallback
    }

    /// Encode a resize of `input` to `size`. A target equal to the input shape
    /// returns the input itself. Never fails; allocation problems present the
    /// source unscaled.
    pub fn upscale(
        &mut self,
        cmd: &mut CommandBuffer,
        input: &Texture,
        size: (u32, u32),
        path: UpscalePath,
    ) -> Texture {
        if size == input.size() {
            return input.clone();
        }

        let descriptor = TextureDescriptor::new(size.0, size.1, input.format());
        let output = match self.scratch.ensure(&self.device, descriptor) {
            Ok(texture) => texture,
            Err(e) => {
                if !self.logged_unavailable_target {
                    warn!(
                        error = %e,
                        width = size.0,
                        height = size.1,
                        "upscale target unavailable, presenting source"
                    );
                    self.logged_unavailable_target = true;
                }
                return input.clone();
            }
        };

        match path {
            UpscalePath::Resample(sampler) => {
                self.resampler.resample(cmd, input, &output, sampler);
            }
            UpscalePath::SuperResolution { fallback } => {
                if let Err(e) = self.scaler.encode(cmd, input, &output) {
                    if !self.logged_fallback {
                        warn!(error = %e, "spatial scaler unavailable, falling back to resample");
                        self.logged_fallback = true;
                    }
                    self.resampler.resample(cmd, input, &output, fallback);
                }
            }
        }
        output
    }

    /// Release the cached output and re-arm both warnings.
    pub fn reset(&mut self) {
        self.scratch.clear();
        self.logged_fallback = false;
        self.logged_unavailable_target = false;
    }
}
