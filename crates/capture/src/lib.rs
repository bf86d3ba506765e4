#[cfg(feature = "v4l")]
pub mod camera;
pub mod decoder;
#[cfg(feature = "v4l")]
pub mod device;
pub mod encoder;
pub mod error;
pub mod source;
pub mod still;

#[cfg(feature = "v4l")]
pub use camera::V4lCameraSource;
pub use decoder::{FrameDecoder, MjpegDecoder, YuyvDecoder};
#[cfg(feature = "v4l")]
pub use device::{CameraDevice, PixelFormat};
pub use encoder::{DEFAULT_JPEG_QUALITY, FrameEncoder};
pub use error::CaptureError;
pub use source::{AttemptCounter, FrameSource};
pub use still::StillImageSource;
