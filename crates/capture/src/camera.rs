use crate::decoder::{FrameDecoder, MjpegDecoder, YuyvDecoder};
use crate::device::{CameraDevice, PixelFormat};
use crate::encoder::FrameEncoder;
use crate::error::CaptureError;
use crate::source::{AttemptCounter, FrameSource};
use chrono::Utc;
use schema::CaptureFrame;
use std::sync::Arc;
use v4l::{
    buffer::Type,
    io::{mmap::Stream, traits::CaptureStream},
};

const BUFFER_COUNT: u32 = 4;

/// Frames queued in the driver between two captures are stale by the time
/// the next tick arrives; drain them before grabbing.
const FLUSH_FRAME_COUNT: usize = 4;

/// Single-shot capture from a V4L2 camera.
///
/// The stream is opened per capture rather than kept running, since frames
/// are wanted seconds apart and an idle stream only fills buffers.
pub struct V4lCameraSource {
    camera: Arc<CameraDevice>,
    encoder: FrameEncoder,
    counter: AttemptCounter,
}

impl V4lCameraSource {
    pub fn open(index: u32, encoder: FrameEncoder) -> Result<Self, CaptureError> {
        let camera = CameraDevice::open(index)?;
        Ok(Self {
            camera: Arc::new(camera),
            encoder,
            counter: AttemptCounter::default(),
        })
    }
}

/// Discard buffered frames so the next one is fresh.
fn flush_stale_frames(stream: &mut Stream) -> usize {
    let mut flushed = 0;
    for _ in 0..FLUSH_FRAME_COUNT {
        if stream.next().is_ok() {
            flushed += 1;
        } else {
            break;
        }
    }
    flushed
}

fn grab_frame(
    camera: &CameraDevice,
    encoder: FrameEncoder,
) -> Result<(Vec<u8>, u32, u32), CaptureError> {
    let mut stream = Stream::with_buffers(&camera.device, Type::VideoCapture, BUFFER_COUNT)
        .map_err(|e| CaptureError::DeviceNotReady(format!("create capture stream: {e}")))?;

    let flushed = flush_stale_frames(&mut stream);
    tracing::trace!(flushed, "Flushed stale frames");

    let (buf, meta) = stream
        .next()
        .map_err(|e| CaptureError::DeviceNotReady(format!("dequeue frame: {e}")))?;
    let used = (meta.bytesused as usize).min(buf.len());
    let raw = if used > 0 { &buf[..used] } else { buf };

    let mut decoder: Box<dyn FrameDecoder> = match camera.pixel_format {
        PixelFormat::Yuyv => Box::new(YuyvDecoder::new()),
        PixelFormat::Mjpeg => Box::new(MjpegDecoder::new()),
    };
    let (width, height, rgb) = decoder.decode(raw, camera.width, camera.height)?;
    let jpeg = encoder.encode_rgb(rgb, width, height)?;
    Ok((jpeg, width, height))
}

impl FrameSource for V4lCameraSource {
    async fn capture(&mut self) -> Result<CaptureFrame, CaptureError> {
        let sequence = self.counter.next();
        let camera = Arc::clone(&self.camera);
        let encoder = self.encoder;

        let (jpeg, width, height) =
            tokio::task::spawn_blocking(move || grab_frame(&camera, encoder))
                .await
                .map_err(|e| CaptureError::Worker(e.to_string()))??;

        tracing::debug!(sequence, width, height, bytes = jpeg.len(), "Camera frame encoded");

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
