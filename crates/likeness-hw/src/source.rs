//! Frame sources: live camera or a sequence of still images.

use crate::camera::{Camera, CameraError};
use crate::frame::Frame;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SEQUENCE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("no camera or image path at '{0}'")]
    DeviceNotFound(String),
}

impl SourceError {
    /// True when only the current frame is lost and the source can go on:
    /// an undecodable image file or a single failed capture.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            Self::Image { .. } | Self::Camera(CameraError::CaptureFailed(_))
        )
    }
}

/// Produces frames one at a time until the stream ends.
pub trait FrameSource {
    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Human-readable origin, for logs.
    fn describe(&self) -> String;
}

impl FrameSource for Camera {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        Ok(Some(self.capture_frame()?))
    }

    fn describe(&self) -> String {
        format!("camera {} ({}x{})", self.device_path, self.width, self.height)
    }
}

/// Plays a single image file, or every image in a directory sorted by name.
pub struct ImageSequence {
    origin: PathBuf,
    pending: VecDeque<PathBuf>,
    sequence: u32,
}

impl ImageSequence {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let pending: VecDeque<PathBuf> = if path.is_dir() {
            let mut files = Vec::new();
            for entry in std::fs::read_dir(path)? {
                let p = entry?.path();
                if p.is_file() && has_image_extension(&p) {
                    files.push(p);
                }
            }
            files.sort();
            files.into()
        } else if path.is_file() {
            VecDeque::from([path.to_path_buf()])
        } else {
            return Err(SourceError::DeviceNotFound(path.display().to_string()));
        };

        tracing::info!(path = %path.display(), frames = pending.len(), "image sequence opened");
        Ok(Self {
            origin: path.to_path_buf(),
            pending,
            sequence: 0,
        })
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };
        let image = image::open(&path)
            .map_err(|source| SourceError::Image {
                path: path.clone(),
                source,
            })?
            .to_rgb8();
        let frame = Frame::new(image, self.sequence);
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        format!("images {}", self.origin.display())
    }
}

/// Next frame from `source`, skipping frame-local errors with a warning.
///
/// Gives up with the last error once `max_skipped` frames in a row have
/// failed; any other error is returned immediately.
pub fn next_usable_frame(
    source: &mut dyn FrameSource,
    max_skipped: u32,
) -> Result<Option<Frame>, SourceError> {
    let mut skipped = 0;
    loop {
        match source.next_frame() {
            Err(e) if e.is_frame_local() && skipped < max_skipped => {
                skipped += 1;
                tracing::warn!(error = %e, skipped, "unusable frame, skipping");
            }
            other => return other,
        }
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|e| SEQUENCE_EXTENSIONS.contains(&e.as_str()))
}

/// Open `location` as a frame source.
///
/// Empty locations and `/dev/video*` paths open a camera (empty means
/// `/dev/video0`). Any other existing file or directory is played as an
/// image sequence.
pub fn open_source(location: &str) -> Result<Box<dyn FrameSource>, SourceError> {
    let location = location.trim();
    if location.is_empty() || location.starts_with("/dev/video") {
        let device = if location.is_empty() { "/dev/video0" } else { location };
        return Ok(Box::new(Camera::open(device)?));
    }

    let path = Path::new(location);
    if path.exists() {
        return Ok(Box::new(ImageSequence::open(path)?));
    }
    Err(SourceError::DeviceNotFound(location.to_string()))
}
