use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl From<(u32, u32)> for FrameSize {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Throughput snapshot for one rolling window. Rates are frames per second
/// over the window that just closed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RendererStats {
    pub is_running: bool,
    pub frame_generation_enabled: bool,
    pub source_fps: f64,
    pub capture_fps: f64,
    pub present_fps: f64,
    pub generated_fps: f64,
    pub input_size: FrameSize,
    pub output_size: FrameSize,
    pub effective_scale: f32,
    pub published_at: DateTime<Utc>,
}

/// Receives every published stats snapshot. Display only.
pub trait StatsObserver: Send + Sync {
    fn on_stats(&self, stats: &RendererStats);
}

impl<F> StatsObserver for F
where
    F: Fn(&RendererStats) + Send + Sync,
{
    fn on_stats(&self, stats: &RendererStats) {
        self(stats)
    }
}
