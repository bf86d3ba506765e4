use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Amenity labels seen during one session. Members are unique and the set
/// only grows until the next session starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AmenitySet(BTreeSet<String>);

impl AmenitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Union `labels` into the set, returning how many were new.
    pub fn merge<I, S>(&mut self, labels: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = 0;
        for label in labels {
            if self.0.insert(label.into()) {
                added += 1;
            }
        }
        added
    }

    pub fn is_superset_of(&self, other: &AmenitySet) -> bool {
        self.0.is_superset(&other.0)
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }
}

impl<S: Into<String>> FromIterator<S> for AmenitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Per-session tick outcomes. Every tick counts once as attempted and once as
/// either succeeded or failed, so `attempted == succeeded + failed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Ticks that failed before a request could be sent. Included in `failed`.
    pub capture_failures: u64,
    pub consecutive_capture_failures: u32,
}

impl SessionStats {
    pub(crate) fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
        self.consecutive_capture_failures = 0;
    }

    pub(crate) fn record_request_failure(&mut self) {
        self.attempted += 1;
        self.failed += 1;
        self.consecutive_capture_failures = 0;
    }

    /// Returns the length of the current capture failure streak.
    pub(crate) fn record_capture_failure(&mut self) -> u32 {
        self.attempted += 1;
        self.failed += 1;
        self.capture_failures += 1;
        self.consecutive_capture_failures += 1;
        self.consecutive_capture_failures
    }

    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.succeeded as f64 * 100.0 / self.attempted as f64
        }
    }
}
