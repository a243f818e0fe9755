use std::sync::{Mutex, PoisonError};

use retimer_common::frame::CapturedFrame;

#[derive(Default)]
struct MailboxState {
    latest: Option<CapturedFrame>,
    sequence: u64,
}

/// Single-slot hand-off between the capture producer and the render tick.
///
/// Every publish replaces the held frame and bumps the sequence, so a reader
/// only ever sees the newest frame; anything published between two reads is
/// dropped. The sequence keeps counting across `clear`.
#[derive(Default)]
pub struct FrameMailbox {
    state: Mutex<MailboxState>,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame` and return its sequence number.
    pub fn publish(&self, frame: CapturedFrame) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.latest = Some(frame);
        state.sequence = state.sequence.wrapping_add(1);
        state.sequence
    }

    pub fn snapshot(&self) -> Option<(CapturedFrame, u64)> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .latest
            .as_ref()
            .map(|frame| (frame.clone(), state.sequence))
    }

    pub fn clear(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latest = None;
    }
}
