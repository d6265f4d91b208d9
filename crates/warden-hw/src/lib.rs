//! warden-hw — Camera capture and lock actuation.
//!
//! Provides V4L2-based grayscale capture, frame overlay/JPEG helpers, and
//! the GPIO character-device lock line with a simulated fallback.

pub mod camera;
pub mod frame;
pub mod gpio;

pub use camera::{Camera, CameraError, CaptureStream, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
pub use gpio::{GpioActuator, SimulatedActuator};
