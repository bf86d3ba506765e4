use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};

/// One encoded still produced by a capture source.
///
/// Frames are handed straight to the detection client and dropped after the
/// request is built; nothing keeps them around.
#[derive(Clone, PartialEq, Eq)]
pub struct CaptureFrame {
    /// Capture-attempt number within the session, starting at 1.
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    /// JPEG bytes.
    pub jpeg: Vec<u8>,
}

impl CaptureFrame {
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.jpeg)
    }

    pub fn size_bytes(&self) -> usize {
        self.jpeg.len()
    }
}

// Keep image payloads out of debug logs.
impl std::fmt::Debug for CaptureFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureFrame")
            .field("sequence", &self.sequence)
            .field("captured_at", &self.captured_at)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.jpeg.len())
            .finish()
    }
}

/// RFC 3339 with millisecond precision, the format the detect endpoint expects.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
