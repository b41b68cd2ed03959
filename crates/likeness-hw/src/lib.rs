//! likeness-hw — Frame acquisition and output.
//!
//! V4L2 camera capture, still-image sequences behind a common
//! [`FrameSource`] trait, and a PNG writer for annotated frames.

pub mod camera;
pub mod frame;
pub mod source;
pub mod writer;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
pub use source::{next_usable_frame, open_source, FrameSource, ImageSequence, SourceError};
pub use writer::{FrameWriter, WriterError};
