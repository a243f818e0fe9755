use retimer_common::capture::{CaptureConfiguration, CaptureTarget};
use tracing::warn;

use crate::{CaptureError, CaptureProducer, CaptureSink};

/// Producer for hosts without a usable capture backend. Every start fails.
pub struct UnavailableProducer {
    reason: String,
    target: CaptureTarget,
    configuration: CaptureConfiguration,
    sink: Option<CaptureSink>,
}

impl UnavailableProducer {
    pub fn new(
        reason: impl Into<String>,
        target: CaptureTarget,
        configuration: CaptureConfiguration,
    ) -> Self {
        Self {
            reason: reason.into(),
            target,
            configuration,
            sink: None,
        }
    }

    pub fn target(&self) -> CaptureTarget {
        self.target
    }

    pub fn configuration(&self) -> CaptureConfiguration {
        self.configuration
    }
}

impl CaptureProducer for UnavailableProducer {
    fn bind(&mut self, sink: CaptureSink) {
        self.sink = Some(sink);
    }

    async fn start(&mut self) -> Result<(), CaptureError> {
        warn!(reason = self.reason, capture_target = ?self.target, "capture start refused");
        Err(CaptureError::Unavailable(self.reason.clone()))
    }

    async fn stop(&mut self) {}

    async fn reconfigure_target(&mut self, target: CaptureTarget) -> Result<(), CaptureError> {
        self.target = target;
        Ok(())
    }

    async fn reconfigure_configuration(
        &mut self,
        configuration: CaptureConfiguration,
    ) -> Result<(), CaptureError> {
        self.configuration = configuration;
        Ok(())
    }
}
