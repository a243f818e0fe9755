use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::gpu::Sampler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpscalingAlgorithm {
    /// Plain full-screen resample using the selected sampling mode.
    NativeLinear,
    /// Super-resolution spatial scaler, with resample as the fallback.
    SuperResolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplingMode {
    Nearest,
    Linear,
}

impl SamplingMode {
    pub fn sampler(self) -> Sampler {
        match self {
            SamplingMode::Nearest => Sampler::NEAREST,
            SamplingMode::Linear => Sampler::LINEAR,
        }
    }
}

const X2_BLEND_FACTORS: [f32; 1] = [0.5];
const X3_BLEND_FACTORS: [f32; 2] = [1.0 / 3.0, 2.0 / 3.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameGenerationMode {
    X2,
    X3,
}

impl FrameGenerationMode {
    /// Presented frames per captured frame.
    pub fn multiplier(self) -> u32 {
        match self {
            FrameGenerationMode::X2 => 2,
            FrameGenerationMode::X3 => 3,
        }
    }

    /// Blend factors of the synthesized frames between two captured frames,
    /// in presentation order.
    pub fn blend_factors(self) -> &'static [f32] {
        match self {
            FrameGenerationMode::X2 => &X2_BLEND_FACTORS,
            FrameGenerationMode::X3 => &X3_BLEND_FACTORS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub upscaling_algorithm: UpscalingAlgorithm,
    pub output_scale: f32,
    pub match_output_resolution: bool,
    pub sampling_mode: SamplingMode,
    pub sharpness: f32,
    pub dynamic_resolution_enabled: bool,
    pub dynamic_scale_minimum: f32,
    pub dynamic_scale_maximum: f32,
    pub target_presentation_fps: u32,
    pub frame_generation_enabled: bool,
    pub frame_generation_mode: FrameGenerationMode,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            upscaling_algorithm: UpscalingAlgorithm::SuperResolution,
            output_scale: 1.0,
            match_output_resolution: true,
            sampling_mode: SamplingMode::Linear,
            sharpness: 0.0,
            dynamic_resolution_enabled: false,
            dynamic_scale_minimum: 0.75,
            dynamic_scale_maximum: 1.0,
            target_presentation_fps: 60,
            frame_generation_enabled: true,
            frame_generation_mode: FrameGenerationMode::X2,
        }
    }
}

/// Source of the per-tick settings snapshot.
pub trait SettingsProvider: Send + Sync {
    fn snapshot(&self) -> RenderSettings;
}

/// Lock-protected settings shared between the UI side and the renderer.
#[derive(Debug, Default)]
pub struct SettingsStore {
    settings: Mutex<RenderSettings>,
}

impl SettingsStore {
    pub fn new(initial: RenderSettings) -> Self {
        Self {
            settings: Mutex::new(initial),
        }
    }

    /// Apply `action` under the lock and return the resulting settings.
    pub fn update(&self, action: impl FnOnce(&mut RenderSettings)) -> RenderSettings {
        let mut settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
        action(&mut settings);
        settings.clone()
    }
}

impl SettingsProvider for SettingsStore {
    fn snapshot(&self) -> RenderSettings {
        self.settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_factors_per_mode() {
        assert_eq!(FrameGenerationMode::X2.blend_factors(), &[0.5]);
        let x3 = FrameGenerationMode::X3.blend_factors();
        assert_eq!(x3.len(), 2);
        assert!((x3[0] - 1.0 / 3.0).abs() < 1e-6);
        assert!((x3[1] - 2.0 / 3.0).abs() < 1e-6);
        assert!(x3[0] < x3[1]);
    }

    #[test]
    fn store_update_is_visible_in_snapshot() {
        let store = SettingsStore::new(RenderSettings::default());
        let updated = store.update(|s| {
            s.frame_generation_mode = FrameGenerationMode::X3;
            s.target_presentation_fps = 90;
        });
        assert_eq!(updated, store.snapshot());
        assert_eq!(store.snapshot().frame_generation_mode.multiplier(), 3);
    }

    #[test]
    fn settings_parse_with_partial_fields() {
        let settings: RenderSettings = toml::from_str(
            r#"
            upscaling_algorithm = "native-linear"
            frame_generation_mode = "x3"
            sharpness = 0.4
            "#,
        )
        .unwrap();
        assert_eq!(settings.upscaling_algorithm, UpscalingAlgorithm::NativeLinear);
        assert_eq!(settings.frame_generation_mode, FrameGenerationMode::X3);
        assert_eq!(settings.target_presentation_fps, 60);
    }
}
