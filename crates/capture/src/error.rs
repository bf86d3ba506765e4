use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Every variant means "no frame this time": the controller skips the tick
/// and tries again on the next one.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No still images found in {0}")]
    NoImages(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Frame buffer size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Capture device not ready: {0}")]
    DeviceNotReady(String),

    #[error("Capture worker failed: {0}")]
    Worker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let err = CaptureError::NoImages(PathBuf::from("/tmp/scan"));
        assert_eq!(err.to_string(), "No still images found in /tmp/scan");

        let err = CaptureError::SizeMismatch {
            expected: 12,
            actual: 8,
        };
        assert_eq!(
            err.to_string(),
            "Frame buffer size mismatch: expected 12 bytes, got 8"
        );

        let err = CaptureError::DeviceNotReady("VIDIOC_DQBUF failed".into());
        assert_eq!(
            err.to_string(),
            "Capture device not ready: VIDIOC_DQBUF failed"
        );
    }

    #[test]
    fn test_io_error_keeps_source() {
        use std::error::Error as _;

        let err = CaptureError::Io {
            path: PathBuf::from("a.jpg"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(err.to_string(), "Failed to read a.jpg: gone");
        assert!(err.source().is_some());
    }
}
