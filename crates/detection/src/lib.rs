//! Client side of the detection service: the [`DetectionClient`] seam the
//! session controller is generic over, and its HTTP implementation.

pub mod client;
pub mod error;
pub mod http;
pub mod stats;

pub use client::DetectionClient;
pub use error::DetectionError;
pub use http::{DEFAULT_REQUEST_TIMEOUT, HttpClientConfig, HttpDetectionClient};
pub use stats::RequestStats;
