use retimer_common::gpu::Texture;

/// Externally supplied data that replaces block matching for one frame pair.
#[derive(Debug, Clone)]
pub struct FrameGenerationAuxiliary {
    /// Per-pixel motion from the previous to the current frame, in pixels,
    /// in the `r` and `g` channels. Must match the frame size.
    pub motion: Texture,
    /// UI layer drawn over the interpolated frame without warping.
    pub ui: Option<Texture>,
}

impl FrameGenerationAuxiliary {
    pub fn new(motion: Texture) -> Self {
        Self { motion, ui: None }
    }

    pub fn with_ui(mut self, ui: Texture) -> Self {
        self.ui = Some(ui);
        self
    }
}

/// Pulled once per interpolated tick. `None` selects block matching.
pub type AuxiliaryProvider = Box<dyn Fn() -> Option<FrameGenerationAuxiliary> + Send + Sync>;
