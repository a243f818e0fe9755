use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use retimer_capture::{CaptureError, CaptureProducer, CaptureSink, FrameHandler};
use retimer_common::capture::{CaptureConfiguration, CaptureTarget};
use retimer_common::frame::{CapturedFrame, MotionHint};
use retimer_common::gpu::{saturate, CommandBuffer, GpuError, RenderDevice, Texture};
use retimer_common::settings::{RenderSettings, SettingsProvider};
use retimer_common::stats::{FrameSize, RendererStats, StatsObserver};
use tracing::{debug, error, info, warn};

use crate::compositor::{Compositor, PresentParams};
use crate::dynres::{DynamicResolutionController, MIN_FRAME_TIME};
use crate::framegen::{AuxiliaryProvider, FrameGenerationEngine};
use crate::mailbox::FrameMailbox;
use crate::schedule::InterpolationSchedule;
use crate::staging::FrameStaging;
use crate::surface::DisplaySurface;
use crate::upscaler::{scaled_size, SpatialUpscaler, UpscalePath};

/// Length of one stats window in seconds.
const STATS_WINDOW: f64 = 1.0;
const SOURCE_FRAME_TIME_DECAY: f64 = 0.9;

#[derive(Debug, thiserror::Error)]
pub enum RendererError {
    #[error("render device error: {0}")]
    Gpu(#[from] GpuError),
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
}

/// Presentation rate to request from the display clock. With frame
/// generation on it never exceeds what the capture rate can fill.
pub fn preferred_presentation_fps(settings: &RenderSettings, capture_fps: u32) -> u32 {
    let target = settings.target_presentation_fps.max(1);
    if !settings.frame_generation_enabled {
        return target;
    }
    let ceiling = capture_fps
        .max(1)
        .saturating_mul(settings.frame_generation_mode.multiplier());
    target.min(ceiling)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationKind {
    /// Drawable cleared, nothing to show.
    Idle,
    /// Current staged frame as is.
    Direct,
    /// Flow-interpolated frame from the generation engine.
    Interpolated,
    /// Raw cross-dissolve of the staged pair.
    BlendFallback,
}

/// What the last tick put on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresentationInfo {
    pub kind: PresentationKind,
    pub blend_factor: f32,
    pub generated: bool,
}

impl PresentationInfo {
    const IDLE: PresentationInfo = PresentationInfo {
        kind: PresentationKind::Idle,
        blend_factor: 0.0,
        generated: false,
    };
}

enum Presentation {
    Direct(Texture),
    Interpolated {
        frame: Texture,
        blend_factor: f32,
    },
    Blend {
        previous: Texture,
        current: Texture,
        blend_factor: f32,
    },
}

impl Presentation {
    fn info(&self) -> PresentationInfo {
        match self {
            Presentation::Direct(_) => PresentationInfo {
                kind: PresentationKind::Direct,
                blend_factor: 0.0,
                generated: false,
            },
            Presentation::Interpolated { blend_factor, .. } => PresentationInfo {
                kind: PresentationKind::Interpolated,
                blend_factor: *blend_factor,
                generated: true,
            },
            Presentation::Blend { blend_factor, .. } => PresentationInfo {
                kind: PresentationKind::BlendFallback,
                blend_factor: *blend_factor,
                generated: true,
            },
        }
    }
}

#[derive(Debug, Default)]
struct FrameCounters {
    captured: u64,
    presented: u64,
    generated: u64,
}

/// State touched from the producer's delivery context.
#[derive(Default)]
struct SharedState {
    mailbox: FrameMailbox,
    running: AtomicBool,
    counters: Mutex<FrameCounters>,
}

impl SharedState {
    fn counters(&self) -> MutexGuard<'_, FrameCounters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct CoordinatorSink {
    shared: Arc<SharedState>,
}

impl FrameHandler for CoordinatorSink {
    fn on_frame(&self, frame: CapturedFrame) {
        self.shared.mailbox.publish(frame);
        self.shared.counters().captured += 1;
    }

    fn on_error(&self, error: CaptureError) {
        error!(error = %error, "capture stream stopped");
        self.shared.running.store(false, Ordering::Release);
    }
}

/// Per-session bookkeeping of the render context.
#[derive(Debug)]
struct Session {
    processed_sequence: u64,
    last_source_timestamp: Option<Duration>,
    source_frame_time: Option<f64>,
    motion_hint: MotionHint,
    input_size: (u32, u32),
    output_size: (u32, u32),
    effective_scale: f32,
    window_start: Option<Instant>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            processed_sequence: 0,
            last_source_timestamp: None,
            source_frame_time: None,
            motion_hint: MotionHint::ZERO,
            input_size: (0, 0),
            output_size: (0, 0),
            effective_scale: 1.0,
            window_start: None,
        }
    }
}

impl Session {
    fn observe_source_timestamp(&mut self, timestamp: Duration) {
        if let Some(last) = self.last_source_timestamp {
            let delta = timestamp.saturating_sub(last).as_secs_f64().max(MIN_FRAME_TIME);
            self.source_frame_time = Some(match self.source_frame_time {
                Some(smoothed) => {
                    smoothed * SOURCE_FRAME_TIME_DECAY + delta * (1.0 - SOURCE_FRAME_TIME_DECAY)
                }
                None => delta,
            });
        }
        self.last_source_timestamp = Some(timestamp);
    }

    fn source_fps(&self) -> f64 {
        self.source_frame_time.map_or(0.0, |frame_time| 1.0 / frame_time)
    }
}

/// Drives capture, scaling, frame generation and presentation, one tick per
/// display refresh.
pub struct RendererCoordinator<P: CaptureProducer, S: DisplaySurface> {
    device: RenderDevice,
    producer: P,
    surface: S,
    settings: Arc<dyn SettingsProvider>,
    observers: Vec<Arc<dyn StatsObserver>>,
    auxiliary: Option<AuxiliaryProvider>,
    capture_configuration: CaptureConfiguration,
    target: CaptureTarget,

    shared: Arc<SharedState>,
    compositor: Compositor,
    upscaler: SpatialUpscaler,
    engine: FrameGenerationEngine,
    dynres: DynamicResolutionController,
    staging: FrameStaging,
    schedule: InterpolationSchedule,
    session: Session,
    last_presentation: PresentationInfo,
    logged_blend_fallback: bool,
}

impl<P: CaptureProducer, S: DisplaySurface> RendererCoordinator<P, S> {
    /// Build every pipeline up front and bind the producer's push channels.
    /// Fails if the device cannot present at all.
    pub fn new(
        device: &RenderDevice,
        mut producer: P,
        mut surface: S,
        settings: Arc<dyn SettingsProvider>,
        capture_configuration: CaptureConfiguration,
        target: CaptureTarget,
    ) -> Result<Self, RendererError> {
        let compositor = Compositor::new(device)?;
        let upscaler = SpatialUpscaler::new(device)?;
        let engine = FrameGenerationEngine::new(device);

        let shared = Arc::new(SharedState::default());
        producer.bind(CaptureSink::new(Arc::new(CoordinatorSink {
            shared: shared.clone(),
        })));
        surface.set_preferred_fps(capture_configuration.effective_fps());

        info!(
            frame_generation = engine.is_supported(),
            spatial_scaler = upscaler.scaler().is_supported(),
            "renderer coordinator ready"
        );

        Ok(Self {
            device: device.clone(),
            producer,
            surface,
            settings,
            observers: Vec::new(),
            auxiliary: None,
            capture_configuration,
            target,
            shared,
            compositor,
            upscaler,
            engine,
            dynres: DynamicResolutionController::new(),
            staging: FrameStaging::new(),
            schedule: InterpolationSchedule::new(),
            session: Session::default(),
            last_presentation: PresentationInfo::IDLE,
            logged_blend_fallback: false,
        })
    }

    pub fn add_stats_observer(&mut self, observer: Arc<dyn StatsObserver>) {
        self.observers.push(observer);
    }

    pub fn set_auxiliary_provider(&mut self, provider: Option<AuxiliaryProvider>) {
        self.auxiliary = provider;
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn capture_configuration(&self) -> &CaptureConfiguration {
        &self.capture_configuration
    }

    pub fn target(&self) -> &CaptureTarget {
        &self.target
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn presentation(&self) -> PresentationInfo {
        self.last_presentation
    }

    /// Blend factors still queued for the current frame pair.
    pub fn pending_interpolations(&self) -> usize {
        self.schedule.len()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the producer, then begin a fresh session. On failure the
    /// coordinator stays stopped.
    pub async fn start(&mut self) -> Result<(), RendererError> {
        self.producer.start().await?;
        self.reset_session();
        self.shared.running.store(true, Ordering::Release);
        info!(
            capture_target = ?self.target,
            fps = self.capture_configuration.frames_per_second,
            "renderer started"
        );
        Ok(())
    }

    pub async fn stop(&mut self) {
        self.producer.stop().await;
        self.shared.running.store(false, Ordering::Release);
        self.reset_session();
        info!("renderer stopped");
    }

    pub async fn reconfigure_target(&mut self, target: CaptureTarget) -> Result<(), RendererError> {
        info!(capture_target = ?target, "reconfiguring capture target");
        self.target = target;
        self.producer.reconfigure_target(target).await?;
        Ok(())
    }

    pub async fn reconfigure_configuration(
        &mut self,
        configuration: CaptureConfiguration,
    ) -> Result<(), RendererError> {
        info!(
            fps = configuration.frames_per_second,
            queue_depth = configuration.queue_depth,
            "reconfiguring capture"
        );
        self.capture_configuration = configuration;
        self.surface.set_preferred_fps(configuration.effective_fps());
        self.producer.reconfigure_configuration(configuration).await?;
        Ok(())
    }

    fn reset_session(&mut self) {
        self.shared.mailbox.clear();
        *self.shared.counters() = FrameCounters::default();
        self.staging.reset();
        self.upscaler.reset();
        self.engine.reset();
        self.schedule.clear();
        self.dynres.reset();
        self.session = Session::default();
        self.last_presentation = PresentationInfo::IDLE;
        self.logged_blend_fallback = false;
    }

    // ========================================================================
    // Tick
    // ========================================================================

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Render and present one frame as of `now`.
    pub fn tick_at(&mut self, now: Instant) {
        self.dynres.record_tick(now);

        let drawable = match self.surface.next_drawable() {
            Ok(drawable) => drawable,
            Err(e) => {
                warn!(error = %e, "no drawable available, skipping tick");
                return;
            }
        };
        let mut cmd = self.device.command_buffer("tick");

        let snapshot = if self.is_running() {
            self.shared.mailbox.snapshot()
        } else {
            None
        };
        let Some((frame, sequence)) = snapshot else {
            self.present_idle(cmd, drawable);
            return;
        };

        let settings = self.settings.snapshot();
        let preferred_fps =
            preferred_presentation_fps(&settings, self.capture_configuration.frames_per_second);
        if self.surface.preferred_fps() != preferred_fps {
            debug!(fps = preferred_fps, "updating presentation rate");
            self.surface.set_preferred_fps(preferred_fps);
        }

        if sequence != self.session.processed_sequence {
            self.consume_frame(&mut cmd, &settings, &frame, sequence, drawable.size());
        } else if !settings.frame_generation_enabled {
            self.schedule.clear();
        }

        let Some(presentation) = self.resolve(&mut cmd, &settings) else {
            self.present_idle(cmd, drawable);
            return;
        };

        let params = PresentParams {
            blend_factor: 0.0,
            sharpness: settings.sharpness,
            sampler: settings.sampling_mode.sampler(),
        };
        match &presentation {
            Presentation::Direct(frame) | Presentation::Interpolated { frame, .. } => {
                self.compositor.present(&mut cmd, frame, frame, &drawable, params);
            }
            Presentation::Blend {
                previous,
                current,
                blend_factor,
            } => {
                let params = PresentParams {
                    blend_factor: *blend_factor,
                    ..params
                };
                self.compositor.present(&mut cmd, previous, current, &drawable, params);
            }
        }

        self.last_presentation = presentation.info();
        self.record_presented(now, &settings, self.last_presentation.generated);

        cmd.commit();
        self.surface.present(drawable);
    }

    fn present_idle(&mut self, mut cmd: CommandBuffer, drawable: Texture) {
        self.compositor.clear(&mut cmd, &drawable);
        cmd.commit();
        self.surface.present(drawable);
        self.last_presentation = PresentationInfo::IDLE;
    }

    /// Scale, upscale and stage a newly arrived frame, then rebuild or drop
    /// the interpolation schedule for the new pair.
    fn consume_frame(
        &mut self,
        cmd: &mut CommandBuffer,
        settings: &RenderSettings,
        frame: &CapturedFrame,
        sequence: u64,
        drawable_size: (u32, u32),
    ) {
        let input = &frame.texture;
        let scale = self
            .dynres
            .effective_scale(settings, input.size(), drawable_size);
        let target_size = scaled_size(input.size(), scale);
        let upscaled =
            self.upscaler
                .upscale(cmd, input, target_size, UpscalePath::for_settings(settings));

        let staged = match self.staging.stage(
            &self.device,
            cmd,
            &upscaled,
            settings.frame_generation_enabled,
        ) {
            Ok(staged) => staged,
            Err(e) => {
                warn!(error = %e, sequence, "failed to stage frame");
                return;
            }
        };

        self.session.processed_sequence = sequence;
        self.session.observe_source_timestamp(frame.timestamp);
        self.session.motion_hint = frame.motion_hint;
        self.session.input_size = input.size();
        self.session.output_size = staged.current.size();
        self.session.effective_scale = scale;

        if settings.frame_generation_enabled && staged.previous.is_some() {
            self.schedule.rebuild(settings.frame_generation_mode);
        } else {
            self.schedule.clear();
        }

        debug!(
            sequence,
            scale,
            width = target_size.0,
            height = target_size.1,
            pending = self.schedule.len(),
            "frame staged"
        );
    }

    fn resolve(
        &mut self,
        cmd: &mut CommandBuffer,
        settings: &RenderSettings,
    ) -> Option<Presentation> {
        let current = self.staging.current()?.clone();
        let previous = match self.staging.previous() {
            Some(previous) if settings.frame_generation_enabled => previous.clone(),
            _ => return Some(Presentation::Direct(current)),
        };
        let Some(blend_factor) = self.schedule.pop() else {
            return Some(Presentation::Direct(current));
        };

        if self.engine.is_supported() {
            if let Some(frame) = self.interpolate(cmd, &previous, &current, blend_factor) {
                return Some(Presentation::Interpolated {
                    frame,
                    blend_factor,
                });
            }
        }

        if !self.logged_blend_fallback {
            warn!("frame generation fallback active, blending raw frames");
            self.logged_blend_fallback = true;
        }
        Some(Presentation::Blend {
            previous,
            current,
            blend_factor: saturate(blend_factor),
        })
    }

    fn interpolate(
        &mut self,
        cmd: &mut CommandBuffer,
        previous: &Texture,
        current: &Texture,
        blend_factor: f32,
    ) -> Option<Texture> {
        let hint = self.session.motion_hint;

        if let Some(auxiliary) = self.auxiliary.as_ref().and_then(|provider| provider()) {
            match self.engine.interpolate_with_auxiliary(
                cmd,
                previous,
                current,
                blend_factor,
                hint,
                &auxiliary,
            ) {
                Ok(frame) => return Some(frame),
                Err(e) => debug!(error = %e, "auxiliary interpolation rejected, estimating flow"),
            }
        }

        match self
            .engine
            .interpolate(cmd, previous, current, blend_factor, hint)
        {
            Ok(frame) => Some(frame),
            Err(e) => {
                debug!(error = %e, "interpolation failed");
                None
            }
        }
    }

    // ========================================================================
    // Stats
    // ========================================================================

    fn record_presented(&mut self, now: Instant, settings: &RenderSettings, generated: bool) {
        let window_start = *self.session.window_start.get_or_insert(now);
        let elapsed = now.saturating_duration_since(window_start).as_secs_f64();

        let counters = {
            let mut counters = self.shared.counters();
            counters.presented += 1;
            if generated {
                counters.generated += 1;
            }
            if elapsed < STATS_WINDOW {
                return;
            }
            std::mem::take(&mut *counters)
        };
        self.session.window_start = Some(now);

        let stats = RendererStats {
            is_running: self.is_running(),
            frame_generation_enabled: settings.frame_generation_enabled,
            source_fps: self.session.source_fps(),
            capture_fps: counters.captured as f64 / elapsed,
            present_fps: counters.presented as f64 / elapsed,
            generated_fps: counters.generated as f64 / elapsed,
            input_size: FrameSize::from(self.session.input_size),
            output_size: FrameSize::from(self.session.output_size),
            effective_scale: self.session.effective_scale,
            published_at: Utc::now(),
        };

        debug!(
            present_fps = stats.present_fps,
            generated_fps = stats.generated_fps,
            capture_fps = stats.capture_fps,
            "stats window closed"
        );
        for observer in &self.observers {
            observer.on_stats(&stats);
        }
    }
}
