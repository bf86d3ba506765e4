use crate::aggregation::AmenitySet;
use schema::DetectionResult;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Display-side consumer of detection results. Purely observational: the
/// session behaves the same with or without one.
pub trait FeedbackSink: Send + Sync {
    fn on_detection(&self, result: &DetectionResult, amenities: &AmenitySet);
}

pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;
pub const DEFAULT_OVERLAY_LIFETIME: Duration = Duration::from_secs(3);
const MAX_OVERLAY_LINES: usize = 8;

fn confidence_band(confidence: f32) -> &'static str {
    if confidence > 0.7 {
        "high"
    } else if confidence > 0.5 {
        "medium"
    } else {
        "low"
    }
}

fn render_lines(result: &DetectionResult, min_confidence: f32) -> Vec<String> {
    let shown: Vec<_> = result
        .detections
        .iter()
        .filter(|d| d.confidence >= min_confidence)
        .collect();

    let mut lines: Vec<String> = shown
        .iter()
        .take(MAX_OVERLAY_LINES)
        .map(|d| {
            format!(
                "{} {} {}%",
                confidence_band(d.confidence),
                d.label,
                (d.confidence * 100.0).round() as u32
            )
        })
        .collect();

    if shown.len() > MAX_OVERLAY_LINES {
        lines.push(format!("... +{} more", shown.len() - MAX_OVERLAY_LINES));
    }
    lines
}

struct Overlay {
    lines: Vec<String>,
    shown_at: Instant,
}

/// Text overlay of the latest confident detections. The overlay clears
/// itself once `lifetime` passes without a new result; the session's
/// amenity set is unaffected.
pub struct OverlayFeedback {
    min_confidence: f32,
    lifetime: Duration,
    current: Mutex<Option<Overlay>>,
}

impl Default for OverlayFeedback {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CONFIDENCE, DEFAULT_OVERLAY_LIFETIME)
    }
}

impl OverlayFeedback {
    pub fn new(min_confidence: f32, lifetime: Duration) -> Self {
        Self {
            min_confidence,
            lifetime,
            current: Mutex::new(None),
        }
    }

    /// Lines currently on screen, empty once the overlay expired.
    pub fn lines(&self) -> Vec<String> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        match current.as_ref() {
            Some(overlay) if overlay.shown_at.elapsed() < self.lifetime => overlay.lines.clone(),
            Some(_) => {
                *current = None;
                Vec::new()
            }
            None => Vec::new(),
        }
    }
}

impl FeedbackSink for OverlayFeedback {
    fn on_detection(&self, result: &DetectionResult, amenities: &AmenitySet) {
        let lines = render_lines(result, self.min_confidence);

        tracing::info!(
            shown = lines.len(),
            detections = result.detections.len(),
            room_type = result.room_type.as_deref().unwrap_or("-"),
            amenities = amenities.len(),
            overlay = %lines.join(" | "),
            "Overlay updated"
        );

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current = if lines.is_empty() {
            None
        } else {
            Some(Overlay {
                lines,
                shown_at: Instant::now(),
            })
        };
    }
}

#[derive(Debug, Clone)]
pub struct FeedbackEvent {
    pub result: DetectionResult,
    pub amenities: AmenitySet,
}

/// Fans detection events out to any number of in-process subscribers.
pub struct BroadcastFeedback {
    tx: broadcast::Sender<FeedbackEvent>,
}

impl BroadcastFeedback {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedbackEvent> {
        self.tx.subscribe()
    }
}

impl FeedbackSink for BroadcastFeedback {
    fn on_detection(&self, result: &DetectionResult, amenities: &AmenitySet) {
        // Err only means nobody is listening.
        let _ = self.tx.send(FeedbackEvent {
            result: result.clone(),
            amenities: amenities.clone(),
        });
    }
}
