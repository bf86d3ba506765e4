use crate::error::CaptureError;
use schema::CaptureFrame;
use std::future::Future;

/// Something that can produce one encoded frame on demand.
pub trait FrameSource: Send + 'static {
    /// Capture and encode a single frame. Every call counts as an attempt,
    /// successful or not.
    fn capture(&mut self) -> impl Future<Output = Result<CaptureFrame, CaptureError>> + Send;

    /// Capture attempts since the last reset.
    fn attempts(&self) -> u64;

    /// Restart attempt numbering; called once per session start.
    fn reset_counter(&mut self);
}

/// Ever-increasing capture-attempt counter shared by the source implementations.
#[derive(Debug, Default, Clone, Copy)]
pub struct AttemptCounter {
    attempts: u64,
}

impl AttemptCounter {
    /// Record a new attempt and return its 1-based sequence number.
    pub fn next(&mut self) -> u64 {
        self.attempts += 1;
        self.attempts
    }

    pub fn get(&self) -> u64 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
