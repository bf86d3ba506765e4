use crate::error::DetectionError;
use crate::stats::RequestStats;
use chrono::{DateTime, Utc};
use schema::{Analysis, CaptureFrame, DetectionResult};
use std::future::Future;

/// The three remote operations a scan session needs.
///
/// Implementations own their retry policy and request counters. Session
/// tokens are opaque and passed back verbatim.
pub trait DetectionClient: Send + Sync + 'static {
    /// Open a remote session and return its token. Resets request counters.
    fn open_session(
        &self,
        user_id: &str,
        property_label: &str,
    ) -> impl Future<Output = Result<String, DetectionError>> + Send;

    fn detect(
        &self,
        frame: &CaptureFrame,
        session_id: &str,
        timestamp: DateTime<Utc>,
    ) -> impl Future<Output = Result<DetectionResult, DetectionError>> + Send;

    fn finalize(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<Analysis, DetectionError>> + Send;

    fn stats(&self) -> RequestStats;
}
