use crate::error::CaptureError;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, codecs::jpeg::JpegEncoder};

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Fixed-quality JPEG encoder. Quality is set once and never renegotiated.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    quality: u8,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameEncoder {
    /// `quality` is clamped to 1..=100.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode packed RGB8 pixels.
    pub fn encode_rgb(&self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CaptureError> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() < expected {
            return Err(CaptureError::SizeMismatch {
                expected,
                actual: rgb.len(),
            });
        }

        let mut jpeg = Vec::with_capacity(expected / 8);
        JpegEncoder::new_with_quality(&mut jpeg, self.quality).write_image(
            &rgb[..expected],
            width,
            height,
            ExtendedColorType::Rgb8,
        )?;
        Ok(jpeg)
    }

    /// Encode any decoded image; alpha is dropped since JPEG cannot carry it.
    pub fn encode_image(&self, img: &DynamicImage) -> Result<Vec<u8>, CaptureError> {
        let rgb = img.to_rgb8();
        self.encode_rgb(rgb.as_raw(), rgb.width(), rgb.height())
    }
}
