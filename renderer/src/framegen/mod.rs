//! Frame generation: synthesizes an intermediate frame between two captured
//! frames from a block-matched flow field.

mod auxiliary;
mod flow;
mod interpolate;

use retimer_common::frame::MotionHint;
use retimer_common::gpu::{
    CommandBuffer, ComputePipeline, GpuError, PixelFormat, RenderDevice, RenderPipeline, Texture,
    TextureDescriptor, TextureSlot,
};
use tracing::{debug, warn};

pub use auxiliary::{AuxiliaryProvider, FrameGenerationAuxiliary};
pub use flow::{flow_size, SearchParams, BLOCK_SIZE};
pub use interpolate::global_motion_uv;

use interpolate::InterpolationInputs;

#[derive(Debug, thiserror::Error)]
pub enum FrameGenerationError {
    #[error("frame generation pipelines are unavailable")]
    Unsupported,
    #[error("previous frame {previous:?} does not match current frame {current:?}")]
    IncompatibleTextures {
        previous: TextureDescriptor,
        current: TextureDescriptor,
    },
    #[error("auxiliary {0} texture does not match the frame size")]
    InvalidAuxiliary(&'static str),
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

#[derive(Debug)]
struct Pipelines {
    flow: ComputePipeline,
    interpolate: RenderPipeline,
}

#[derive(Debug)]
pub struct FrameGenerationEngine {
    device: RenderDevice,
    pipelines: Option<Pipelines>,
    flow: TextureSlot,
    output: TextureSlot,
}

impl FrameGenerationEngine {
    /// Missing pipelines do not fail construction; the engine just reports
    /// itself unsupported.
    pub fn new(device: &RenderDevice) -> Self {
        let pipelines = match Self::build_pipelines(device) {
            Ok(pipelines) => Some(pipelines),
            Err(e) => {
                warn!(error = %e, "frame generation unavailable on this device");
                None
            }
        };

        Self {
            device: device.clone(),
            pipelines,
            flow: TextureSlot::new(),
            output: TextureSlot::new(),
        }
    }

    fn build_pipelines(device: &RenderDevice) -> Result<Pipelines, GpuError> {
        Ok(Pipelines {
            flow: device.make_compute_pipeline("estimate-flow")?,
            interpolate: device.make_render_pipeline("interpolate")?,
        })
    }

    pub fn is_supported(&self) -> bool {
        self.pipelines.is_some()
    }

    /// Encode flow estimation and interpolation at `blend_factor` between
    /// `previous` (0) and `current` (1). The returned texture is reused by
    /// later calls of the same shape.
    pub fn interpolate(
        &mut self,
        cmd: &mut CommandBuffer,
        previous: &Texture,
        current: &Texture,
        blend_factor: f32,
        motion_hint: MotionHint,
    ) -> Result<Texture, FrameGenerationError> {
        self.encode(cmd, previous, current, blend_factor, motion_hint, None)
    }

    /// As [`interpolate`](Self::interpolate), but with the flow taken from
    /// `auxiliary` motion and its UI layer composited on top.
    pub fn interpolate_with_auxiliary(
        &mut self,
        cmd: &mut CommandBuffer,
        previous: &Texture,
        current: &Texture,
        blend_factor: f32,
        motion_hint: MotionHint,
        auxiliary: &FrameGenerationAuxiliary,
    ) -> Result<Texture, FrameGenerationError> {
        self.encode(
            cmd,
            previous,
            current,
            blend_factor,
            motion_hint,
            Some(auxiliary),
        )
    }

    /// Drop the cached flow and output textures.
    pub fn reset(&mut self) {
        self.flow.clear();
        self.output.clear();
    }

    fn encode(
        &mut self,
        cmd: &mut CommandBuffer,
        previous: &Texture,
        current: &Texture,
        blend_factor: f32,
        motion_hint: MotionHint,
        auxiliary: Option<&FrameGenerationAuxiliary>,
    ) -> Result<Texture, FrameGenerationError> {
        let Some(pipelines) = &self.pipelines else {
            return Err(FrameGenerationError::Unsupported);
        };
        if !previous.is_compatible_with(current) {
            return Err(FrameGenerationError::IncompatibleTextures {
                previous: previous.descriptor(),
                current: current.descriptor(),
            });
        }
        if let Some(auxiliary) = auxiliary {
            if auxiliary.motion.size() != current.size() {
                return Err(FrameGenerationError::InvalidAuxiliary("motion"));
            }
            if auxiliary.ui.as_ref().is_some_and(|ui| ui.size() != current.size()) {
                return Err(FrameGenerationError::InvalidAuxiliary("ui"));
            }
        }

        let (width, height) = current.size();
        let (flow_width, flow_height) = flow_size(width, height);
        let flow_texture = self.flow.ensure(
            &self.device,
            TextureDescriptor::new(flow_width, flow_height, PixelFormat::Rg16Float),
        )?;
        let output = self.output.ensure(&self.device, current.descriptor())?;
        let global_motion = global_motion_uv(motion_hint, width, height);

        debug!(
            flow_pipeline = pipelines.flow.label(),
            interpolate_pipeline = pipelines.interpolate.label(),
            blend_factor,
            auxiliary = auxiliary.is_some(),
            "encoding frame generation"
        );

        match auxiliary {
            Some(auxiliary) => {
                let motion = auxiliary.motion.clone();
                let target = flow_texture.clone();
                cmd.encode_pass("flow-from-motion", move || {
                    let motion = motion.read();
                    let mut target = target.write();
                    flow::flow_from_motion(&motion, &mut target);
                });
            }
            None => {
                let previous = previous.clone();
                let current = current.clone();
                let target = flow_texture.clone();
                cmd.encode_pass("estimate-flow", move || {
                    let previous = previous.read();
                    let current = current.read();
                    let mut target = target.write();
                    flow::estimate_flow(&previous, &current, &mut target);
                });
            }
        }

        let previous = previous.clone();
        let current = current.clone();
        let overlay = auxiliary.and_then(|auxiliary| auxiliary.ui.clone());
        let target = output.clone();
        cmd.encode_pass("interpolate", move || {
            let previous = previous.read();
            let current = current.read();
            let flow = flow_texture.read();
            let overlay = overlay.as_ref().map(|ui| ui.read());
            let mut target = target.write();
            interpolate::shade_interpolated(
                &InterpolationInputs {
                    previous: &previous,
                    current: &current,
                    flow: &flow,
                    overlay: overlay.as_deref(),
                    blend_factor,
                    global_motion,
                },
                &mut target,
            );
        });

        Ok(output)
    }
}
