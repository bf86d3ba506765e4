//! JSON bodies exchanged with the detection service.
//!
//! Responses are decoded leniently: every field except `success` may be
//! missing and falls back to an empty value.

use crate::detection::{Analysis, BoundingBox, Detection, DetectionResult};
use serde::{Deserialize, Serialize};

pub const OPEN_SESSION_PATH: &str = "/api/spectacles/scan-session";
pub const DETECT_PATH: &str = "/api/spectacles/detect";
pub const FINALIZE_PATH: &str = "/api/spectacles/finalize";
pub const HEALTH_PATH: &str = "/health";

/// Common shape of every service reply: an explicit success flag plus an
/// optional human-readable reason when it is false.
pub trait ServiceReply {
    fn success(&self) -> bool;
    fn failure_reason(&self) -> Option<&str>;
}

macro_rules! impl_service_reply {
    ($($ty:ty),+ $(,)?) => {
        $(impl ServiceReply for $ty {
            fn success(&self) -> bool {
                self.success
            }

            fn failure_reason(&self) -> Option<&str> {
                self.error.as_deref().or(self.message.as_deref())
            }
        })+
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSessionRequest<'a> {
    pub user_id: &'a str,
    pub property_label: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSessionResponse {
    pub success: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectRequest<'a> {
    pub image_base64: String,
    pub session_id: &'a str,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedObject {
    pub object: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResponse {
    pub success: bool,
    #[serde(default)]
    pub total_objects: u32,
    #[serde(default)]
    pub room_type: Option<String>,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl From<DetectResponse> for DetectionResult {
    fn from(resp: DetectResponse) -> Self {
        let detections: Vec<Detection> = resp
            .objects
            .into_iter()
            .map(|o| Detection {
                label: o.object,
                confidence: o.confidence,
                bbox: o.bbox,
            })
            .collect();

        // Older service builds omit total_objects.
        let total_objects = if resp.total_objects == 0 {
            detections.len() as u32
        } else {
            resp.total_objects
        };

        Self {
            detections,
            room_type: resp.room_type.filter(|r| !r.is_empty()),
            amenities: resp
                .amenities
                .into_iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            total_objects,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeRequest<'a> {
    pub session_id: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeResponse {
    pub success: bool,
    #[serde(default)]
    pub analysis: Option<Analysis>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.to_lowercase().as_str(), "ok" | "healthy")
    }
}

impl_service_reply!(OpenSessionResponse, DetectResponse, FinalizeResponse);
