use crate::encoder::FrameEncoder;
use crate::error::CaptureError;
use crate::source::{AttemptCounter, FrameSource};
use chrono::Utc;
use schema::CaptureFrame;
use std::path::{Path, PathBuf};

const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Replays still images from a directory in file-name order, wrapping around
/// at the end. Stands in for a camera on machines without one.
///
/// The directory is rescanned whenever the list is empty or a file vanished,
/// so images dropped in while a session runs are picked up.
pub struct StillImageSource {
    dir: PathBuf,
    images: Vec<PathBuf>,
    cursor: usize,
    encoder: FrameEncoder,
    counter: AttemptCounter,
}

impl StillImageSource {
    pub fn open(dir: impl Into<PathBuf>, encoder: FrameEncoder) -> Result<Self, CaptureError> {
        let dir = dir.into();
        let images = list_images(&dir)?;

        if images.is_empty() {
            tracing::warn!(dir = %dir.display(), "Image directory is empty, captures will fail until it is populated");
        } else {
            tracing::info!(
                dir = %dir.display(),
                images = images.len(),
                quality = encoder.quality(),
                "Still image source ready"
            );
        }

        Ok(Self {
            dir,
            images,
            cursor: 0,
            encoder,
            counter: AttemptCounter::default(),
        })
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    async fn next_path(&mut self) -> Result<PathBuf, CaptureError> {
        if self.images.is_empty() {
            let dir = self.dir.clone();
            self.images = tokio::task::spawn_blocking(move || list_images(&dir))
                .await
                .map_err(|e| CaptureError::Worker(e.to_string()))??;
            self.cursor = 0;
        }

        let path = self
            .images
            .get(self.cursor)
            .cloned()
            .ok_or_else(|| CaptureError::NoImages(self.dir.clone()))?;
        self.cursor = (self.cursor + 1) % self.images.len();
        Ok(path)
    }
}

impl FrameSource for StillImageSource {
    async fn capture(&mut self) -> Result<CaptureFrame, CaptureError> {
        let sequence = self.counter.next();
        let path = self.next_path().await?;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(source) => {
                self.images.clear();
                return Err(CaptureError::Io { path, source });
            }
        };

        let encoder = self.encoder;
        let (jpeg, width, height) = tokio::task::spawn_blocking(move || {
            let img = image::load_from_memory(&bytes)?;
            let jpeg = encoder.encode_image(&img)?;
            Ok::<_, CaptureError>((jpeg, img.width(), img.height()))
        })
        .await
        .map_err(|e| CaptureError::Worker(e.to_string()))??;

        tracing::debug!(
            sequence,
            file = %path.display(),
            width,
            height,
            bytes = jpeg.len(),
            "Still frame encoded"
        );

        Ok(CaptureFrame {
            sequence,
            captured_at: Utc::now(),
            width,
            height,
            jpeg,
        })
    }

    fn attempts(&self) -> u64 {
        self.counter.get()
    }

    fn reset_counter(&mut self) {
        self.counter.reset();
    }
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, CaptureError> {
    let entries = std::fs::read_dir(dir).map_err(|source| CaptureError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut images: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && has_supported_extension(path))
        .collect();
    images.sort();
    Ok(images)
}
