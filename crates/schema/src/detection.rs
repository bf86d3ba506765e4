use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Corner coordinates in source image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl From<[f32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Outcome of one detect call, merged into the session and then dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    pub room_type: Option<String>,
    pub amenities: BTreeSet<String>,
    pub total_objects: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rooms {
    #[serde(default)]
    pub bedrooms: u32,
    /// Half baths are reported as .5.
    #[serde(default)]
    pub bathrooms: f32,
}

/// Consolidated property analysis returned when a session is finalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub property_type: String,
    #[serde(default)]
    pub rooms: Rooms,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub quality_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_round_trips_through_array_form() {
        let json = "[10.0,20.0,110.0,220.0]";
        let bbox: BoundingBox = serde_json::from_str(json).unwrap();
        assert_eq!(bbox.width(), 100.0);
        assert_eq!(bbox.height(), 200.0);
        assert_eq!(serde_json::to_string(&bbox).unwrap(), "[10.0,20.0,110.0,220.0]");
    }

    #[test]
    fn inverted_bbox_has_zero_extent() {
        let bbox = BoundingBox::from([50.0, 50.0, 10.0, 10.0]);
        assert_eq!(bbox.width(), 0.0);
        assert_eq!(bbox.height(), 0.0);
    }

    #[test]
    fn analysis_tolerates_missing_fields() {
        let analysis: Analysis =
            serde_json::from_str(r#"{"property_type":"apartment","amenities":["tv"]}"#).unwrap();
        assert_eq!(analysis.property_type, "apartment");
        assert_eq!(analysis.rooms, Rooms::default());
        assert_eq!(analysis.amenities, vec!["tv".to_string()]);
        assert_eq!(analysis.quality_score, 0.0);
    }

    #[test]
    fn analysis_accepts_half_baths() {
        let analysis: Analysis = serde_json::from_str(
            r#"{"property_type":"house","rooms":{"bedrooms":3,"bathrooms":1.5},"amenities":[],"quality_score":0.82}"#,
        )
        .unwrap();
        assert_eq!(analysis.rooms.bedrooms, 3);
        assert_eq!(analysis.rooms.bathrooms, 1.5);
    }
}
