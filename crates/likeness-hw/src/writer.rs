use image::{ImageFormat, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("image: {0}")]
    Image(#[from] image::ImageError),
}

/// Writes frames as `frame_000000.png`, `frame_000001.png`, … into a directory.
pub struct FrameWriter {
    dir: PathBuf,
    next: u32,
}

impl FrameWriter {
    /// Create `dir` if needed.
    pub fn create(dir: &Path) -> Result<Self, WriterError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            next: 0,
        })
    }

    pub fn write(&mut self, frame: &RgbImage) -> Result<PathBuf, WriterError> {
        let path = self.dir.join(format!("frame_{:06}.png", self.next));
        frame.save_with_format(&path, ImageFormat::Png)?;
        self.next += 1;
        Ok(path)
    }

    pub fn written(&self) -> u32 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_writes_numbered_pngs() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("annotated");
        let mut writer = FrameWriter::create(&out).unwrap();

        let frame = RgbImage::from_pixel(5, 5, Rgb([1, 2, 3]));
        let first = writer.write(&frame).unwrap();
        let second = writer.write(&frame).unwrap();

        assert_eq!(first.file_name().unwrap(), "frame_000000.png");
        assert_eq!(second.file_name().unwrap(), "frame_000001.png");
        assert_eq!(writer.written(), 2);
        assert_eq!(image::open(&second).unwrap().to_rgb8(), frame);
    }
}
