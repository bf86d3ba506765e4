pub mod detection;
pub mod frame;
pub mod wire;

pub use detection::{Analysis, BoundingBox, Detection, DetectionResult, Rooms};
pub use frame::{CaptureFrame, format_timestamp};
pub use wire::HealthStatus;
