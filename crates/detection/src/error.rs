use thiserror::Error;

/// Failure of a single detection service operation, after retries.
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Request timed out")]
    Timeout,

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Rejected by detection service: {message}")]
    Rejected {
        status: Option<u16>,
        message: String,
    },

    #[error("Undecodable response: {0}")]
    Decode(String),
}

impl DetectionError {
    /// Transport-level failures that a later attempt may not hit. Rejections
    /// and undecodable bodies are the service's answer and are never retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DetectionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for DetectionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
