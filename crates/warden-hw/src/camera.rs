//! V4L2 capture via the `v4l` crate.
//!
//! The camera is opened once at startup and streamed continuously; every
//! buffer is reduced to 8-bit grayscale before it leaves this module.

use crate::frame::{self, Frame};
use std::io;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::capability::Flags;
use v4l::io::traits::CaptureStream as _;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Mapped buffers queued to the driver per stream.
const STREAM_BUFFERS: u32 = 4;
/// `/dev/videoN` indices scanned by [`Camera::list_devices`].
const MAX_VIDEO_NODES: u32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no video device at {0}")]
    NotFound(String),
    #[error("{0} is in use by another process")]
    Busy(String),
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: io::Error },
    #[error("{0} is not a video capture device")]
    NotCapture(String),
    #[error("format negotiation failed: {0}")]
    Format(String),
    #[error("capture stream error: {0}")]
    Stream(#[source] io::Error),
    #[error("short {format:?} buffer: expected {expected} bytes, got {actual}")]
    ShortBuffer {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
}

/// A capture node found by [`Camera::list_devices`].
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Pixel layouts the camera may hand back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed; only luma is kept.
    Yuyv,
    /// 8-bit grayscale.
    Grey,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"GREY" => Some(Self::Grey),
            _ => None,
        }
    }

    /// Reduce one raw buffer of `width`x`height` pixels to grayscale.
    fn to_gray(self, buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CameraError> {
        let pixels = (width * height) as usize;
        let expected = match self {
            PixelFormat::Grey => pixels,
            PixelFormat::Yuyv => pixels * 2,
        };
        if buf.len() < expected {
            return Err(CameraError::ShortBuffer {
                format: self,
                expected,
                actual: buf.len(),
            });
        }

        Ok(match self {
            PixelFormat::Grey => buf[..pixels].to_vec(),
            PixelFormat::Yuyv => frame::yuyv_luma(&buf[..expected]),
        })
    }
}

/// An opened, format-negotiated capture device.
pub struct Camera {
    device: Device,
    pub device_path: String,
    pub width: u32,
    pub height: u32,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open `device_path` and ask for `width`x`height` YUYV. The driver may
    /// pick another size, and GREY is accepted in place of YUYV.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::NotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|source| {
            if source.raw_os_error() == Some(libc::EBUSY) {
                CameraError::Busy(device_path.to_string())
            } else {
                CameraError::Open {
                    path: device_path.to_string(),
                    source,
                }
            }
        })?;

        let caps = device.query_caps().map_err(|source| CameraError::Open {
            path: device_path.to_string(),
            source,
        })?;
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Err(CameraError::NotCapture(device_path.to_string()));
        }

        let mut requested = device
            .format()
            .map_err(|e| CameraError::Format(format!("reading current format: {e}")))?;
        requested.fourcc = FourCC::new(b"YUYV");
        requested.width = width;
        requested.height = height;
        let granted = device
            .set_format(&requested)
            .map_err(|e| CameraError::Format(format!("setting {width}x{height} YUYV: {e}")))?;

        let pixel_format = PixelFormat::from_fourcc(granted.fourcc).ok_or_else(|| {
            CameraError::Format(format!("driver chose {}, need YUYV or GREY", granted.fourcc))
        })?;

        tracing::info!(
            device = device_path,
            card = %caps.card,
            width = granted.width,
            height = granted.height,
            format = ?pixel_format,
            "camera ready"
        );

        Ok(Self {
            device,
            device_path: device_path.to_string(),
            width: granted.width,
            height: granted.height,
            pixel_format,
        })
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Start a memory-mapped stream on the device.
    pub fn stream(&self) -> Result<CaptureStream<'_>, CameraError> {
        let stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(CameraError::Stream)?;
        Ok(CaptureStream {
            camera: self,
            stream,
        })
    }

    /// Grab `count` consecutive frames on a short-lived stream.
    pub fn capture_frames(&self, count: usize) -> Result<Vec<Frame>, CameraError> {
        let mut stream = self.stream()?;
        (0..count).map(|_| stream.next_frame()).collect()
    }

    /// Capture-capable `/dev/videoN` nodes. Nodes that cannot be opened are
    /// left out.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..MAX_VIDEO_NODES)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities.contains(Flags::VIDEO_CAPTURE).then(|| DeviceInfo {
                    path,
                    name: caps.card,
                    driver: caps.driver,
                    bus: caps.bus,
                })
            })
            .collect()
    }
}

/// A running capture stream borrowed from its [`Camera`].
pub struct CaptureStream<'a> {
    camera: &'a Camera,
    stream: MmapStream<'a>,
}

impl CaptureStream<'_> {
    /// Block until the driver hands back the next buffer.
    pub fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let (buf, meta) = self.stream.next().map_err(CameraError::Stream)?;
        let camera = self.camera;
        let data = camera.pixel_format.to_gray(buf, camera.width, camera.height)?;

        Ok(Frame {
            data,
            width: camera.width,
            height: camera.height,
            timestamp: std::time::Instant::now(),
            sequence: meta.sequence,
        })
    }
}
