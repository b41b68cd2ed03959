//! Frame type and raw pixel-format conversion to RGB.

use image::RgbImage;
use std::time::Instant;

/// A captured or decoded video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    /// Monotonic frame counter from the source.
    pub sequence: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u32) -> Self {
        Self {
            image,
            sequence,
            timestamp: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

fn check_len(buf: &[u8], expected: usize) -> Result<(), FrameError> {
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn pack(width: u32, height: u32, rgb: Vec<u8>) -> Result<RgbImage, FrameError> {
    let expected = rgb.len();
    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected: (width * height * 3) as usize,
        actual: expected,
    })
}

/// BT.601 limited-range YUV → RGB for one pixel.
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as f32 - 16.0;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let r = 1.164 * c + 1.596 * e;
    let g = 1.164 * c - 0.392 * d - 0.813 * e;
    let b = 1.164 * c + 2.017 * d;
    [
        r.round().clamp(0.0, 255.0) as u8,
        g.round().clamp(0.0, 255.0) as u8,
        b.round().clamp(0.0, 255.0) as u8,
    ]
}

/// Convert packed YUYV (4:2:2) to RGB.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share
/// the chroma pair.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let pixels = (width * height) as usize;
    check_len(yuyv, pixels * 2)?;

    let mut rgb = Vec::with_capacity(pixels * 3);
    for chunk in yuyv[..pixels * 2].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    pack(width, height, rgb)
}

/// Replicate 8-bit grayscale into all three channels.
pub fn grey_to_rgb(gray: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let pixels = (width * height) as usize;
    check_len(gray, pixels)?;
    let rgb = gray[..pixels].iter().flat_map(|&g| [g, g, g]).collect();
    pack(width, height, rgb)
}

/// 16-bit little-endian grayscale, keeping the high byte.
pub fn y16_to_rgb(buf: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let pixels = (width * height) as usize;
    check_len(buf, pixels * 2)?;
    let gray: Vec<u8> = buf[..pixels * 2].chunks_exact(2).map(|px| px[1]).collect();
    grey_to_rgb(&gray, width, height)
}
