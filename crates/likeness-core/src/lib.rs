//! likeness-core — Identity-resolution pipeline.
//!
//! Detects faces with SCRFD (ONNX Runtime), classifies them with a Local
//! Binary Patterns Histograms recognizer trained on a labeled photo catalog,
//! and annotates frames with the resolved names.

pub mod detector;
pub mod imaging;
pub mod processor;
pub mod recognizer;
pub mod resolver;
pub mod tracker;
pub mod trainer;
pub mod types;

pub use detector::{Detector, DetectorError, ScrfdDetector};
pub use processor::{FrameProcessor, ProcessError};
pub use recognizer::{LbphParams, LbphRecognizer, Recognizer, RecognizerError};
pub use resolver::{IdentityResolver, KnownNames, DEFAULT_CONFIDENCE_THRESHOLD, UNKNOWN_NAME};
pub use tracker::{TemplateTracker, Tracker};
pub use trainer::{MissPolicy, ModelSource, ModelTrainer, TrainerError};
pub use types::{DetectionBox, DetectionParams, Label, Prediction, RecognitionOutcome};
