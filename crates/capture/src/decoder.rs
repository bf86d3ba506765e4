use crate::error::CaptureError;

/// Turns a raw camera buffer into packed RGB8.
pub trait FrameDecoder: Send {
    /// Decode raw frame data to RGB (3 bytes per pixel).
    /// Returns the decoded width, height and a view into the decoder's buffer.
    fn decode(&mut self, raw: &[u8], width: u32, height: u32)
    -> Result<(u32, u32, &[u8]), CaptureError>;
}

/// YUYV (YUV 4:2:2) decoder.
///
/// YUYV packs 2 pixels in 4 bytes: [Y0, U, Y1, V]
#[derive(Default)]
pub struct YuyvDecoder {
    rgb_buffer: Vec<u8>,
}

impl YuyvDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecoder for YuyvDecoder {
    fn decode(
        &mut self,
        raw: &[u8],
        width: u32,
        height: u32,
    ) -> Result<(u32, u32, &[u8]), CaptureError> {
        let rgb_size = width as usize * height as usize * 3;
        let bytes_per_row = width as usize * 2;
        let rows = height as usize;

        if rows == 0 || raw.len() < bytes_per_row * rows {
            return Err(CaptureError::SizeMismatch {
                expected: bytes_per_row * rows,
                actual: raw.len(),
            });
        }

        if self.rgb_buffer.len() < rgb_size {
            self.rgb_buffer.resize(rgb_size, 0);
        }

        // Drivers may pad rows.
        let stride = raw.len() / rows;

        let mut out_idx = 0;
        for row in 0..rows {
            let row_start = row * stride;
            let row_data = &raw[row_start..row_start + bytes_per_row];

            for chunk in row_data.chunks_exact(4) {
                let y0 = chunk[0] as i32;
                let u = chunk[1] as i32 - 128;
                let y1 = chunk[2] as i32;
                let v = chunk[3] as i32 - 128;

                // BT.601 fixed-point coefficients (8-bit fraction)
                // R = Y + 1.402*V  -> Y + (359*V >> 8)
                // G = Y - 0.344*U - 0.714*V -> Y - ((88*U + 183*V) >> 8)
                // B = Y + 1.772*U -> Y + (454*U >> 8)
                let rv = (359 * v) >> 8;
                let gu = (88 * u + 183 * v) >> 8;
                let bu = (454 * u) >> 8;

                for y in [y0, y1] {
                    self.rgb_buffer[out_idx] = (y + rv).clamp(0, 255) as u8;
                    self.rgb_buffer[out_idx + 1] = (y - gu).clamp(0, 255) as u8;
                    self.rgb_buffer[out_idx + 2] = (y + bu).clamp(0, 255) as u8;
                    out_idx += 3;
                }
            }
        }

        Ok((width, height, &self.rgb_buffer[..rgb_size]))
    }
}

/// MJPEG decoder. Each camera frame is a standalone JPEG, so the reported
/// dimensions come from the JPEG header rather than the negotiated format.
#[derive(Default)]
pub struct MjpegDecoder {
    rgb_buffer: Vec<u8>,
}

impl MjpegDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecoder for MjpegDecoder {
    fn decode(
        &mut self,
        raw: &[u8],
        _width: u32,
        _height: u32,
    ) -> Result<(u32, u32, &[u8]), CaptureError> {
        let img = image::load_from_memory_with_format(raw, image::ImageFormat::Jpeg)?.to_rgb8();
        let (width, height) = img.dimensions();

        self.rgb_buffer.clear();
        self.rgb_buffer.extend_from_slice(img.as_raw());

        Ok((width, height, &self.rgb_buffer))
    }
}
