//! Test-pattern capture producer.
//!
//! A generator task renders frames at the configured rate into a bounded
//! queue of `queue_depth` frames; a delivery task drains the queue, attaches
//! the motion hint and pushes into the sink. A full queue drops the new frame.

use std::time::Duration;

use retimer_common::capture::{CaptureConfiguration, CaptureTarget, PixelSize};
use retimer_common::frame::CapturedFrame;
use retimer_common::gpu::{dispatch_pixels, PixelFormat, RenderDevice, Texture, TextureDescriptor};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::motion::GlobalMotionEstimator;
use crate::{CaptureError, CaptureProducer, CaptureSink};

/// Native sizes of the simulated sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceGeometry {
    pub display: (u32, u32),
    pub window: (u32, u32),
}

impl Default for SourceGeometry {
    fn default() -> Self {
        Self {
            display: (1920, 1080),
            window: (1280, 720),
        }
    }
}

impl SourceGeometry {
    fn native_size(&self, target: CaptureTarget) -> (u32, u32) {
        match target {
            CaptureTarget::Automatic | CaptureTarget::Display(_) => self.display,
            CaptureTarget::Window(_) => self.window,
        }
    }
}

/// Output size for a capture. A preferred size keeps its pixel area but takes
/// the aspect ratio of the source.
pub fn capture_size(native: (u32, u32), preferred: Option<PixelSize>) -> (u32, u32) {
    let Some(preferred) = preferred else {
        return (native.0.max(1), native.1.max(1));
    };
    let area = (f64::from(preferred.width) * f64::from(preferred.height)).max(1.0);
    let aspect = (f64::from(native.0.max(1)) / f64::from(native.1.max(1))).max(0.1);
    let width = ((area * aspect).sqrt().round() as u32).max(1);
    let height = ((f64::from(width) / aspect).round() as u32).max(1);
    (width, height)
}

struct Session {
    shutdown: watch::Sender<bool>,
    generator: JoinHandle<()>,
    delivery: JoinHandle<()>,
}

pub struct SyntheticProducer {
    device: RenderDevice,
    target: CaptureTarget,
    configuration: CaptureConfiguration,
    geometry: SourceGeometry,
    sink: Option<CaptureSink>,
    session: Option<Session>,
}

impl SyntheticProducer {
    pub fn new(
        device: RenderDevice,
        target: CaptureTarget,
        configuration: CaptureConfiguration,
        geometry: SourceGeometry,
    ) -> Self {
        Self {
            device,
            target,
            configuration,
            geometry,
            sink: None,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn frame_size(&self) -> (u32, u32) {
        capture_size(
            self.geometry.native_size(self.target),
            self.configuration.preferred_pixel_size,
        )
    }

    async fn shutdown_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let _ = session.shutdown.send(true);
        for (name, task) in [("generator", session.generator), ("delivery", session.delivery)] {
            if let Err(e) = task.await {
                warn!(task = name, error = %e, "capture task ended abnormally");
            }
        }
    }

    async fn restart_if_active(&mut self) -> Result<(), CaptureError> {
        if self.is_active() {
            self.start().await
        } else {
            Ok(())
        }
    }
}

impl CaptureProducer for SyntheticProducer {
    fn bind(&mut self, sink: CaptureSink) {
        self.sink = Some(sink);
    }

    async fn start(&mut self) -> Result<(), CaptureError> {
        self.shutdown_session().await;
        let sink = self.sink.clone().ok_or(CaptureError::NotBound)?;

        let (width, height) = self.frame_size();
        let descriptor = TextureDescriptor::new(width, height, PixelFormat::Bgra8Unorm);
        // Surface size errors here rather than on the first generated frame.
        drop(self.device.create_texture(descriptor)?);

        let fps = self.configuration.effective_fps();
        let queue_depth = self.configuration.queue_depth.max(1) as usize;
        let (frame_tx, frame_rx) = mpsc::channel(queue_depth);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let pattern = TestPattern {
            shows_cursor: self.configuration.shows_cursor,
        };
        let generator = tokio::spawn(generate_frames(
            self.device.clone(),
            descriptor,
            fps,
            pattern,
            frame_tx,
            sink.clone(),
            shutdown_rx.clone(),
        ));
        let delivery = tokio::spawn(deliver_frames(frame_rx, sink, shutdown_rx));

        self.session = Some(Session {
            shutdown: shutdown_tx,
            generator,
            delivery,
        });
        info!(
            capture_target = ?self.target,
            width,
            height,
            fps,
            queue_depth,
            "synthetic capture started"
        );
        Ok(())
    }

    async fn stop(&mut self) {
        if self.session.is_some() {
            self.shutdown_session().await;
            info!("synthetic capture stopped");
        }
    }

    async fn reconfigure_target(&mut self, target: CaptureTarget) -> Result<(), CaptureError> {
        self.target = target;
        self.restart_if_active().await
    }

    async fn reconfigure_configuration(
        &mut self,
        configuration: CaptureConfiguration,
    ) -> Result<(), CaptureError> {
        self.configuration = configuration;
        self.restart_if_active().await
    }
}

async fn generate_frames(
    device: RenderDevice,
    descriptor: TextureDescriptor,
    fps: u32,
    pattern: TestPattern,
    frames: mpsc::Sender<CapturedFrame>,
    sink: CaptureSink,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(fps)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let started = Instant::now();
    let mut index: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        let device = device.clone();
        let rendered =
            tokio::task::spawn_blocking(move || pattern.render(&device, descriptor, index)).await;
        let texture = match rendered {
            Ok(Ok(texture)) => texture,
            Ok(Err(e)) => {
                error!(error = %e, "failed to render capture frame");
                sink.on_error(e.into());
                break;
            }
            Err(e) => {
                error!(error = %e, "capture render task failed");
                sink.on_error(CaptureError::Task(e.to_string()));
                break;
            }
        };

        let frame = CapturedFrame::new(texture, started.elapsed(), Default::default());
        if let Err(mpsc::error::TrySendError::Full(_)) = frames.try_send(frame) {
            debug!(index, "capture queue full, dropping frame");
        }
        index += 1;
    }
}

async fn deliver_frames(
    mut frames: mpsc::Receiver<CapturedFrame>,
    sink: CaptureSink,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut estimator = GlobalMotionEstimator::new();
    loop {
        let mut frame = tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = shutdown.changed() => break,
        };
        frame.motion_hint = estimator.estimate(&frame.texture.read());
        sink.on_frame(frame);
    }
}

/// Gradient background with a block that pans right and an optional cursor.
#[derive(Debug, Clone, Copy)]
struct TestPattern {
    shows_cursor: bool,
}

const BLOCK_SPEED: u32 = 4;
const CURSOR_SIZE: u32 = 6;

impl TestPattern {
    fn render(
        &self,
        device: &RenderDevice,
        descriptor: TextureDescriptor,
        index: u64,
    ) -> Result<Texture, CaptureError> {
        let texture = device.create_texture(descriptor)?;
        let (width, height) = (descriptor.width, descriptor.height);
        let block = (height / 4).max(1);
        let travel = width + block;
        let block_x = ((index * u64::from(BLOCK_SPEED)) % u64::from(travel)) as i64 - i64::from(block);
        let block_y = i64::from(height / 2) - i64::from(block / 2);
        let cursor = (
            i64::from(width / 3) + (index % 60) as i64,
            i64::from(height / 3),
        );
        let shows_cursor = self.shows_cursor;

        let target = texture.clone();
        let mut cmd = device.command_buffer("synthetic-capture");
        cmd.encode_pass("test-pattern", move || {
            let mut texels = target.write();
            dispatch_pixels(&mut texels, |x, y| {
                let (px, py) = (i64::from(x), i64::from(y));
                if shows_cursor
                    && (0..i64::from(CURSOR_SIZE)).contains(&(px - cursor.0))
                    && (0..i64::from(CURSOR_SIZE)).contains(&(py - cursor.1))
                {
                    return [1.0, 1.0, 1.0, 1.0];
                }
                if (0..i64::from(block)).contains(&(px - block_x))
                    && (0..i64::from(block)).contains(&(py - block_y))
                {
                    return [0.9, 0.35, 0.1, 1.0];
                }
                let u = x as f32 / width as f32;
                let v = y as f32 / height as f32;
                [0.1 + 0.5 * u, 0.15 + 0.4 * v, 0.35, 1.0]
            });
        });
        cmd.commit();
        Ok(texture)
    }
}
