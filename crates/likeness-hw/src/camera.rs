//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use image::{ImageFormat, RgbImage};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;
const EBUSY: i32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Motion-JPEG, one JPEG per buffer.
    Mjpg,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
    /// 16-bit little-endian grayscale (2 bytes/pixel).
    Y16,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"MJPG" => Some(Self::Mjpg),
            b"GREY" => Some(Self::Grey),
            b"Y16 " | b"Y16\0" => Some(Self::Y16),
            _ => None,
        }
    }
}

/// V4L2 camera device handle.
///
/// The capture stream is started on the first [`capture_frame`](Self::capture_frame)
/// and kept for the lifetime of the handle.
pub struct Camera {
    stream: Option<MmapStream<'static>>,
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 capture device by path (e.g. "/dev/video0") and negotiate
    /// a 640x480 format.
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        let device = open_device(device_path)?;
        let (width, height, fourcc, pixel_format) = negotiate(&device)?;

        tracing::info!(device = device_path, width, height, ?pixel_format, "camera ready");

        Ok(Self {
            stream: None,
            device,
            width,
            height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
        })
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Capture the next frame, converted to RGB.
    pub fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        if self.stream.is_none() {
            let stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
                .map_err(|e| CameraError::CaptureFailed(format!("mmap stream: {e}")))?;
            tracing::debug!(device = %self.device_path, buffers = STREAM_BUFFERS, "capture stream started");
            self.stream = Some(stream);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(CameraError::CaptureFailed("capture stream unavailable".into()));
        };

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("dequeue: {e}")))?;
        let used = (meta.bytesused as usize).min(buf.len());
        let payload = if used > 0 { &buf[..used] } else { buf };
        let sequence = meta.sequence;

        let image = buf_to_rgb(self.pixel_format, payload, self.width, self.height)?;
        Ok(Frame::new(image, sequence))
    }

    /// Probe `/dev/video0` through `/dev/video15` for capture-capable devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..16)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                caps.capabilities
                    .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card,
                        driver: caps.driver,
                        bus: caps.bus,
                    })
            })
            .collect()
    }
}

fn open_device(device_path: &str) -> Result<Device, CameraError> {
    if !Path::new(device_path).exists() {
        return Err(CameraError::DeviceNotFound(device_path.to_string()));
    }

    let device = Device::with_path(device_path).map_err(|e| {
        if e.raw_os_error() == Some(EBUSY) || e.to_string().contains("busy") {
            CameraError::DeviceBusy
        } else {
            CameraError::DeviceNotFound(format!("{device_path}: {e}"))
        }
    })?;

    let caps = device
        .query_caps()
        .map_err(|e| CameraError::CaptureFailed(format!("query capabilities: {e}")))?;
    tracing::debug!(device = device_path, driver = %caps.driver, card = %caps.card, "device opened");

    if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
        return Err(CameraError::StreamingNotSupported);
    }
    Ok(device)
}

/// Request YUYV at the capture size and accept whatever supported format the
/// driver settles on.
fn negotiate(device: &Device) -> Result<(u32, u32, FourCC, PixelFormat), CameraError> {
    let mut fmt = device
        .format()
        .map_err(|e| CameraError::FormatNegotiationFailed(format!("get format: {e}")))?;
    fmt.fourcc = FourCC::new(b"YUYV");
    fmt.width = CAPTURE_WIDTH;
    fmt.height = CAPTURE_HEIGHT;

    let negotiated = device
        .set_format(&fmt)
        .map_err(|e| CameraError::FormatNegotiationFailed(format!("set format: {e}")))?;

    let pixel_format = PixelFormat::from_fourcc(negotiated.fourcc).ok_or_else(|| {
        CameraError::FormatNegotiationFailed(format!(
            "unsupported pixel format {:?}, need YUYV, MJPG, GREY or Y16",
            negotiated.fourcc
        ))
    })?;

    Ok((negotiated.width, negotiated.height, negotiated.fourcc, pixel_format))
}

/// Convert a raw buffer to RGB based on the negotiated format.
fn buf_to_rgb(
    format: PixelFormat,
    buf: &[u8],
    width: u32,
    height: u32,
) -> Result<RgbImage, CameraError> {
    let converted = match format {
        PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, width, height),
        PixelFormat::Grey => frame::grey_to_rgb(buf, width, height),
        PixelFormat::Y16 => frame::y16_to_rgb(buf, width, height),
        PixelFormat::Mjpg => {
            return image::load_from_memory_with_format(buf, ImageFormat::Jpeg)
                .map(|img| img.to_rgb8())
                .map_err(|e| CameraError::CaptureFailed(format!("MJPG decode failed: {e}")));
        }
    };
    converted.map_err(|e| CameraError::CaptureFailed(format!("{format:?} conversion failed: {e}")))
}
