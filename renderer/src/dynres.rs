use std::time::Instant;

use retimer_common::settings::RenderSettings;
use tracing::debug;

pub const MIN_SCALE: f32 = 0.5;
pub const MAX_SCALE: f32 = 3.0;

const INITIAL_FRAME_TIME: f64 = 1.0 / 60.0;
pub(crate) const MIN_FRAME_TIME: f64 = 1.0 / 240.0;
const FRAME_TIME_DECAY: f64 = 0.9;
const TARGET_FPS_FLOOR: u32 = 30;
const SLOW_RATIO: f64 = 1.06;
const FAST_RATIO: f64 = 0.92;
const STEP_DOWN: f32 = 0.02;
const STEP_UP: f32 = 0.01;

/// Feedback controller that trades internal resolution for frame time.
///
/// Presentation frame time is smoothed with an EMA. When it runs over the
/// target the multiplier sheds resolution quickly; when there is headroom it
/// recovers slowly. The multiplier always stays within the configured
/// `[dynamic_scale_minimum, dynamic_scale_maximum]`.
#[derive(Debug)]
pub struct DynamicResolutionController {
    /// EMA of wall-clock time between ticks, in seconds.
    smoothed_frame_time: f64,
    last_tick: Option<Instant>,
    multiplier: f32,
}

impl Default for DynamicResolutionController {
    fn default() -> Self {
        Self {
            smoothed_frame_time: INITIAL_FRAME_TIME,
            last_tick: None,
            multiplier: 1.0,
        }
    }
}

impl DynamicResolutionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    pub fn smoothed_frame_time(&self) -> f64 {
        self.smoothed_frame_time
    }

    /// Fold the time since the previous tick into the smoothed frame time.
    pub fn record_tick(&mut self, now: Instant) {
        if let Some(last) = self.last_tick {
            self.record_frame_time(now.saturating_duration_since(last).as_secs_f64());
        }
        self.last_tick = Some(now);
    }

    pub fn record_frame_time(&mut self, seconds: f64) {
        if !seconds.is_finite() {
            return;
        }
        let delta = seconds.max(MIN_FRAME_TIME);
        self.smoothed_frame_time =
            self.smoothed_frame_time * FRAME_TIME_DECAY + delta * (1.0 - FRAME_TIME_DECAY);
    }

    /// Step the multiplier once against the current smoothed frame time.
    pub fn update(&mut self, settings: &RenderSettings) -> f32 {
        if !settings.dynamic_resolution_enabled {
            self.multiplier = 1.0;
            return self.multiplier;
        }

        let target_fps = settings.target_presentation_fps.max(TARGET_FPS_FLOOR);
        let target_frame_time = 1.0 / f64::from(target_fps);

        if self.smoothed_frame_time > target_frame_time * SLOW_RATIO {
            self.multiplier -= STEP_DOWN;
        } else if self.smoothed_frame_time < target_frame_time * FAST_RATIO {
            self.multiplier += STEP_UP;
        }

        let (low, high) = multiplier_bounds(settings);
        self.multiplier = self.multiplier.clamp(low, high);
        debug!(
            frame_time_ms = self.smoothed_frame_time * 1000.0,
            target_ms = target_frame_time * 1000.0,
            multiplier = self.multiplier,
            "dynamic resolution step"
        );
        self.multiplier
    }

    /// Manual/fit scale composed with the dynamic multiplier.
    pub fn effective_scale(
        &mut self,
        settings: &RenderSettings,
        input: (u32, u32),
        drawable: (u32, u32),
    ) -> f32 {
        base_scale(settings, input, drawable) * self.update(settings)
    }
}

/// Scale before the dynamic multiplier. With match-output the fit-to-surface
/// factor is the base and the manual scale biases it.
pub fn base_scale(settings: &RenderSettings, input: (u32, u32), drawable: (u32, u32)) -> f32 {
    let manual = clamp_scale(settings.output_scale);
    if !settings.match_output_resolution {
        return manual;
    }

    let scale_x = drawable.0.max(1) as f32 / input.0.max(1) as f32;
    let scale_y = drawable.1.max(1) as f32 / input.1.max(1) as f32;
    let fit = clamp_scale(scale_x.min(scale_y));
    clamp_scale(fit * manual)
}

fn clamp_scale(scale: f32) -> f32 {
    if scale.is_finite() {
        scale.clamp(MIN_SCALE, MAX_SCALE)
    } else {
        1.0
    }
}

fn multiplier_bounds(settings: &RenderSettings) -> (f32, f32) {
    let sanitize = |v: f32| if v.is_finite() { v } else { 1.0 };
    let a = sanitize(settings.dynamic_scale_minimum);
    let b = sanitize(settings.dynamic_scale_maximum);
    (a.min(b), a.max(b))
}
