use crate::error::CaptureError;
use common::retry::retry_with_backoff;
use v4l::{
    Device, FourCC,
    control::{Control, Value},
    video::Capture,
};

// V4L2 control IDs (from videodev2.h)
const V4L2_CID_EXPOSURE_AUTO: u32 = 0x009a0901;
const V4L2_CID_EXPOSURE_ABSOLUTE: u32 = 0x009a0902;

// Aperture priority: auto-exposure bounded by EXPOSURE_ABSOLUTE
const V4L2_EXPOSURE_APERTURE_PRIORITY: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuyv,
    Mjpeg,
}

impl PixelFormat {
    /// Negotiation order: YUYV decodes cheaper than MJPEG.
    const PREFERENCE: [PixelFormat; 2] = [PixelFormat::Yuyv, PixelFormat::Mjpeg];

    fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Yuyv => FourCC::new(b"YUYV"),
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
        }
    }
}

fn device_error(context: &str, e: impl std::fmt::Display) -> CaptureError {
    CaptureError::DeviceNotReady(format!("{context}: {e}"))
}

fn find_usable_camera() -> Option<u32> {
    v4l::context::enum_devices()
        .into_iter()
        .find(|dev| {
            Device::with_path(dev.path())
                .and_then(|d| d.query_caps())
                .map(|caps| {
                    caps.capabilities
                        .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                })
                .unwrap_or(false)
        })
        .map(|dev| dev.index() as u32)
}

fn open_device(index: u32) -> Result<Device, CaptureError> {
    if let Ok(dev) = Device::new(index as usize)
        && dev.query_caps().is_ok()
    {
        return Ok(dev);
    }

    tracing::debug!(index, "Camera index busy or missing, scanning alternatives");

    let fallback = find_usable_camera()
        .ok_or_else(|| CaptureError::DeviceNotReady("no usable video devices found".into()))?;
    Device::new(fallback as usize).map_err(|e| device_error("open fallback camera", e))
}

fn select_format(device: &Device) -> Result<PixelFormat, CaptureError> {
    let offered: Vec<FourCC> = device
        .enum_formats()
        .map_err(|e| device_error("enumerate formats", e))?
        .into_iter()
        .map(|desc| desc.fourcc)
        .collect();
    tracing::debug!(?offered, "Camera formats");

    PixelFormat::PREFERENCE
        .into_iter()
        .find(|format| offered.contains(&format.fourcc()))
        .ok_or_else(|| {
            CaptureError::DeviceNotReady(format!(
                "camera offers neither YUYV nor MJPEG: {offered:?}"
            ))
        })
}

/// Bound exposure so handheld sweeps stay sharp. Best effort: cameras without
/// these controls keep their defaults.
fn limit_exposure(device: &Device) {
    let controls = match device.query_controls() {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to query camera controls");
            return;
        }
    };

    let has_exposure_auto = controls.iter().any(|c| c.id == V4L2_CID_EXPOSURE_AUTO);

    if has_exposure_auto
        && let Err(e) = device.set_control(Control {
            id: V4L2_CID_EXPOSURE_AUTO,
            value: Value::Integer(V4L2_EXPOSURE_APERTURE_PRIORITY),
        })
    {
        tracing::debug!(error = %e, "Aperture priority mode not supported");
    }

    if let Some(ctrl_desc) = controls.iter().find(|c| c.id == V4L2_CID_EXPOSURE_ABSOLUTE) {
        // ~20ms cap
        let exposure = 200i64.min(ctrl_desc.maximum);

        match device.set_control(Control {
            id: V4L2_CID_EXPOSURE_ABSOLUTE,
            value: Value::Integer(exposure),
        }) {
            Ok(()) => tracing::info!(exposure, "Exposure limit applied"),
            Err(e) => tracing::debug!(error = %e, "Failed to set exposure limit"),
        }
    } else if !has_exposure_auto {
        tracing::info!("Camera does not expose exposure controls");
    }
}

/// An opened and configured V4L2 capture device.
pub struct CameraDevice {
    pub device: Device,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

impl CameraDevice {
    pub fn open(index: u32) -> Result<Self, CaptureError> {
        let device = retry_with_backoff(|| open_device(index), 10, 200, "Camera init")?;

        let caps = device
            .query_caps()
            .map_err(|e| device_error("query capabilities", e))?;
        tracing::info!(card = %caps.card, driver = %caps.driver, "Camera opened");

        let pixel_format = select_format(&device)?;
        let mut format = device.format().map_err(|e| device_error("read format", e))?;
        format.fourcc = pixel_format.fourcc();
        let format = device
            .set_format(&format)
            .map_err(|e| device_error("set format", e))?;

        tracing::info!(
            width = format.width,
            height = format.height,
            format = ?pixel_format,
            "Capture format negotiated"
        );

        limit_exposure(&device);

        Ok(Self {
            device,
            width: format.width,
            height: format.height,
            pixel_format,
        })
    }
}
