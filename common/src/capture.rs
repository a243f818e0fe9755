use serde::{Deserialize, Serialize};

/// What the capture producer should record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureTarget {
    /// Frontmost foreign window, or the main display if there is none.
    #[default]
    Automatic,
    Display(u32),
    /// A specific window, or any shareable window when `None`.
    Window(Option<u32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

/// Producer-side capture parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfiguration {
    pub frames_per_second: u32,
    pub queue_depth: u32,
    pub shows_cursor: bool,
    pub preferred_pixel_size: Option<PixelSize>,
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            frames_per_second: 30,
            queue_depth: 5,
            shows_cursor: false,
            preferred_pixel_size: None,
        }
    }
}

impl CaptureConfiguration {
    /// Capture rate floored at 1 FPS.
    pub fn effective_fps(&self) -> u32 {
        self.frames_per_second.max(1)
    }
}
