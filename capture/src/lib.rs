//! Capture producer port.
//!
//! A producer delivers frames asynchronously through a bound [`CaptureSink`].
//! Lifecycle operations are async and resolve once the producer has actually
//! started, stopped or restarted.

pub mod motion;
pub mod synthetic;
mod unavailable;

use std::future::Future;
use std::sync::Arc;

use retimer_common::capture::{CaptureConfiguration, CaptureTarget};
use retimer_common::config::CaptureConfig;
use retimer_common::frame::CapturedFrame;
use retimer_common::gpu::{GpuError, RenderDevice};
use tracing::info;

pub use motion::GlobalMotionEstimator;
pub use synthetic::{SourceGeometry, SyntheticProducer};
pub use unavailable::UnavailableProducer;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture unavailable: {0}")]
    Unavailable(String),
    #[error("unknown capture backend '{0}', expected 'synthetic' or 'none'")]
    UnknownBackend(String),
    #[error("producer started without a bound sink")]
    NotBound,
    #[error("capture device error: {0}")]
    Gpu(#[from] GpuError),
    #[error("capture task failed: {0}")]
    Task(String),
}

/// Receiver side of a producer's push channels.
pub trait FrameHandler: Send + Sync {
    fn on_frame(&self, frame: CapturedFrame);
    fn on_error(&self, error: CaptureError);
}

/// Shared handle the producer pushes frames and errors into.
#[derive(Clone)]
pub struct CaptureSink {
    handler: Arc<dyn FrameHandler>,
}

impl CaptureSink {
    pub fn new(handler: Arc<dyn FrameHandler>) -> Self {
        Self { handler }
    }

    pub fn on_frame(&self, frame: CapturedFrame) {
        self.handler.on_frame(frame);
    }

    pub fn on_error(&self, error: CaptureError) {
        self.handler.on_error(error);
    }
}

pub trait CaptureProducer: Send {
    /// Attach the push channels. Must happen before `start`.
    fn bind(&mut self, sink: CaptureSink);

    /// Begin delivering frames. Starting an active producer restarts it.
    fn start(&mut self) -> impl Future<Output = Result<(), CaptureError>> + Send;

    fn stop(&mut self) -> impl Future<Output = ()> + Send;

    /// Switch target. Restarts internally only if currently active.
    fn reconfigure_target(
        &mut self,
        target: CaptureTarget,
    ) -> impl Future<Output = Result<(), CaptureError>> + Send;

    /// Switch capture parameters. Restarts internally only if currently active.
    fn reconfigure_configuration(
        &mut self,
        configuration: CaptureConfiguration,
    ) -> impl Future<Output = Result<(), CaptureError>> + Send;
}

/// Producer selected by the `capture.backend` setting.
pub enum Producer {
    Synthetic(SyntheticProducer),
    Unavailable(UnavailableProducer),
}

impl Producer {
    pub fn from_config(config: &CaptureConfig, device: &RenderDevice) -> Result<Self, CaptureError> {
        let configuration = config.capture_configuration();
        let producer = match config.backend.as_str() {
            "synthetic" => Producer::Synthetic(SyntheticProducer::new(
                device.clone(),
                config.target,
                configuration,
                SourceGeometry {
                    display: (config.display_width, config.display_height),
                    window: (config.window_width, config.window_height),
                },
            )),
            "none" => Producer::Unavailable(UnavailableProducer::new(
                "no capture backend configured",
                config.target,
                configuration,
            )),
            other => return Err(CaptureError::UnknownBackend(other.to_string())),
        };
        info!(backend = config.backend, capture_target = ?config.target, "capture producer created");
        Ok(producer)
    }
}

impl CaptureProducer for Producer {
    fn bind(&mut self, sink: CaptureSink) {
        match self {
            Producer::Synthetic(p) => p.bind(sink),
            Producer::Unavailable(p) => p.bind(sink),
        }
    }

    async fn start(&mut self) -> Result<(), CaptureError> {
        match self {
            Producer::Synthetic(p) => p.start().await,
            Producer::Unavailable(p) => p.start().await,
        }
    }

    async fn stop(&mut self) {
        match self {
            Producer::Synthetic(p) => p.stop().await,
            Producer::Unavailable(p) => p.stop().await,
        }
    }

    async fn reconfigure_target(&mut self, target: CaptureTarget) -> Result<(), CaptureError> {
        match self {
            Producer::Synthetic(p) => p.reconfigure_target(target).await,
            Producer::Unavailable(p) => p.reconfigure_target(target).await,
        }
    }

    async fn reconfigure_configuration(
        &mut self,
        configuration: CaptureConfiguration,
    ) -> Result<(), CaptureError> {
        match self {
            Producer::Synthetic(p) => p.reconfigure_configuration(configuration).await,
            Producer::Unavailable(p) => p.reconfigure_configuration(configuration).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retimer_common::gpu::DeviceDescriptor;

    fn device() -> RenderDevice {
        RenderDevice::new(DeviceDescriptor {
            threads: 1,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn backend_selects_producer() {
        let device = device();
        let mut config = CaptureConfig::default();
        assert!(matches!(
            Producer::from_config(&config, &device),
            Ok(Producer::Synthetic(_))
        ));

        config.backend = "none".into();
        assert!(matches!(
            Producer::from_config(&config, &device),
            Ok(Producer::Unavailable(_))
        ));

        config.backend = "screencapturekit".into();
        assert!(matches!(
            Producer::from_config(&config, &device),
            Err(CaptureError::UnknownBackend(_))
        ));
    }

    #[tokio::test]
    async fn none_backend_fails_to_start() {
        let device = device();
        let config = CaptureConfig {
            backend: "none".into(),
            ..Default::default()
        };
        let mut producer = Producer::from_config(&config, &device).unwrap();
        assert!(matches!(
            producer.start().await,
            Err(CaptureError::Unavailable(_))
        ));
        producer.stop().await;
    }
}
