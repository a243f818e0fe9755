use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{ImageBuffer, Rgba};
use retimer_capture::{CaptureError, CaptureProducer, CaptureSink};
use retimer_common::capture::{CaptureConfiguration, CaptureTarget};
use retimer_common::frame::{CapturedFrame, MotionHint};
use retimer_common::gpu::{
    DeviceDescriptor, DeviceFeatures, PixelFormat, RenderDevice, Texels, Texture,
};

pub fn test_device() -> RenderDevice {
    device_with(DeviceFeatures::default())
}

pub fn device_with(features: DeviceFeatures) -> RenderDevice {
    RenderDevice::new(DeviceDescriptor {
        threads: 2,
        features,
        ..Default::default()
    })
    .unwrap()
}

pub fn solid_texture(device: &RenderDevice, width: u32, height: u32, value: f32) -> Texture {
    texture_from_fn(device, width, height, |_, _| [value, value, value, 1.0])
}

pub fn texture_from_fn(
    device: &RenderDevice,
    width: u32,
    height: u32,
    f: impl Fn(u32, u32) -> [f32; 4],
) -> Texture {
    let texels: Texels = ImageBuffer::from_fn(width, height, |x, y| Rgba(f(x, y)));
    device
        .create_texture_from_texels(PixelFormat::Bgra8Unorm, texels)
        .unwrap()
}

pub fn solid_frame(
    device: &RenderDevice,
    width: u32,
    height: u32,
    value: f32,
    timestamp: Duration,
) -> CapturedFrame {
    CapturedFrame::new(
        solid_texture(device, width, height, value),
        timestamp,
        MotionHint::ZERO,
    )
}

pub fn assert_texel_near(actual: [f32; 4], expected: [f32; 4], tolerance: f32) {
    for channel in 0..4 {
        assert!(
            (actual[channel] - expected[channel]).abs() <= tolerance,
            "texel {actual:?} differs from {expected:?}"
        );
    }
}

#[derive(Default)]
struct MockState {
    sink: Option<CaptureSink>,
    fail_start: bool,
    active: bool,
    starts: u32,
    stops: u32,
    targets: Vec<CaptureTarget>,
    configurations: Vec<CaptureConfiguration>,
}

/// Test-side controls of a [`MockProducer`].
#[derive(Clone, Default)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    pub fn push_frame(&self, frame: CapturedFrame) {
        let sink = self.state.lock().unwrap().sink.clone();
        sink.expect("producer not bound").on_frame(frame);
    }

    pub fn push_error(&self, error: CaptureError) {
        let sink = self.state.lock().unwrap().sink.clone();
        sink.expect("producer not bound").on_error(error);
    }

    pub fn fail_start(&self, fail: bool) {
        self.state.lock().unwrap().fail_start = fail;
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().unwrap().active
    }

    pub fn starts(&self) -> u32 {
        self.state.lock().unwrap().starts
    }

    pub fn stops(&self) -> u32 {
        self.state.lock().unwrap().stops
    }

    pub fn targets(&self) -> Vec<CaptureTarget> {
        self.state.lock().unwrap().targets.clone()
    }

    pub fn configurations(&self) -> Vec<CaptureConfiguration> {
        self.state.lock().unwrap().configurations.clone()
    }
}

/// Scripted producer: frames and errors are pushed by the test through its
/// [`MockHandle`].
pub struct MockProducer {
    handle: MockHandle,
}

impl MockProducer {
    pub fn new() -> (Self, MockHandle) {
        let handle = MockHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl CaptureProducer for MockProducer {
    fn bind(&mut self, sink: CaptureSink) {
        self.handle.state.lock().unwrap().sink = Some(sink);
    }

    async fn start(&mut self) -> Result<(), CaptureError> {
        let mut state = self.handle.state.lock().unwrap();
        state.starts += 1;
        if state.fail_start {
            return Err(CaptureError::Unavailable("scripted failure".into()));
        }
        state.active = true;
        Ok(())
    }

    async fn stop(&mut self) {
        let mut state = self.handle.state.lock().unwrap();
        state.stops += 1;
        state.active = false;
    }

    async fn reconfigure_target(&mut self, target: CaptureTarget) -> Result<(), CaptureError> {
        let mut state = self.handle.state.lock().unwrap();
        state.targets.push(target);
        if state.active {
            state.starts += 1;
            state.stops += 1;
        }
        Ok(())
    }

    async fn reconfigure_configuration(
        &mut self,
        configuration: CaptureConfiguration,
    ) -> Result<(), CaptureError> {
        let mut state = self.handle.state.lock().unwrap();
        state.configurations.push(configuration);
        if state.active {
            state.starts += 1;
            state.stops += 1;
        }
        Ok(())
    }
}
