//! Catalog preprocessing and train-or-load of the recognizer model.

use crate::detector::{Detector, DetectorError};
use crate::imaging;
use crate::recognizer::{LbphParams, Recognizer, RecognizerError};
use crate::types::{DetectionParams, Label};
use image::{GrayImage, RgbImage};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainerError {
    #[error("invalid training data: {0}")]
    TrainingData(String),
    #[error("no face detected: {0}")]
    DetectionMiss(String),
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// What to do with a catalog photo in which no face is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissPolicy {
    /// Fail the whole batch on the first miss.
    Abort,
    /// Drop the photo (and its label) and continue.
    #[default]
    Skip,
}

impl FromStr for MissPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown miss policy '{other}', expected 'skip' or 'abort'")),
        }
    }
}

/// How [`ModelTrainer::train_or_load`] obtained the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSource {
    Loaded,
    Trained,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelTrainer {
    miss_policy: MissPolicy,
    params: DetectionParams,
    min_face_side: u32,
}

impl Default for ModelTrainer {
    fn default() -> Self {
        Self::new(MissPolicy::default())
    }
}

impl ModelTrainer {
    pub fn new(miss_policy: MissPolicy) -> Self {
        Self {
            miss_policy,
            params: DetectionParams::CATALOG,
            min_face_side: LbphParams::default().min_side(),
        }
    }

    /// Face crops narrower or shorter than `side` count as misses. Defaults
    /// to the smallest crop the default LBPH recognizer accepts.
    pub fn with_min_face_side(mut self, side: u32) -> Self {
        self.min_face_side = side;
        self
    }

    pub fn miss_policy(&self) -> MissPolicy {
        self.miss_policy
    }

    /// Crop every sample to its first detected face.
    ///
    /// Each sample carries a caller tag (typically its label) so that dropped
    /// photos take their tag with them. Detection runs on the equalized
    /// grayscale image; the crop is taken from the colour original. A crop
    /// below the minimum face side is handled like a photo with no face.
    pub fn prepare<T>(
        &self,
        detector: &mut dyn Detector,
        samples: Vec<(T, RgbImage)>,
    ) -> Result<Vec<(T, RgbImage)>, TrainerError> {
        let total = samples.len();
        let mut prepared = Vec::with_capacity(total);

        for (index, (tag, image)) in samples.into_iter().enumerate() {
            let gray = imaging::prepare_for_detection(&image);
            let faces = detector.detect(&gray, &self.params)?;

            let min = self.min_face_side;
            let reason = match faces.first().and_then(|b| imaging::crop_rgb(&image, b)) {
                Some(face) if face.width() >= min && face.height() >= min => {
                    prepared.push((tag, face));
                    continue;
                }
                Some(face) => format!("face {}x{} is below {min}x{min}", face.width(), face.height()),
                None => "no face".to_string(),
            };

            match self.miss_policy {
                MissPolicy::Abort => {
                    return Err(TrainerError::DetectionMiss(format!(
                        "photo {index} of {total}: {reason}"
                    )));
                }
                MissPolicy::Skip => {
                    tracing::warn!(index, total, %reason, "unusable catalog photo, skipping");
                }
            }
        }

        if prepared.is_empty() {
            return Err(TrainerError::DetectionMiss(format!(
                "none of {total} photos contained a face"
            )));
        }

        tracing::info!(kept = prepared.len(), total, "catalog photos prepared");
        Ok(prepared)
    }

    /// Load the model at `model_path` if one exists, otherwise train on
    /// `images`/`labels` and save the result there.
    ///
    /// An existing artifact is trusted as-is; delete it to force retraining.
    pub fn train_or_load(
        &self,
        recognizer: &mut dyn Recognizer,
        images: &[RgbImage],
        labels: &[Label],
        model_path: &Path,
    ) -> Result<ModelSource, TrainerError> {
        if model_path.is_file() {
            recognizer.load(model_path)?;
            tracing::info!(path = %model_path.display(), "using existing recognizer model");
            return Ok(ModelSource::Loaded);
        }

        if images.is_empty() {
            return Err(TrainerError::TrainingData("no training images".into()));
        }
        if images.len() != labels.len() {
            return Err(TrainerError::TrainingData(format!(
                "{} images but {} labels",
                images.len(),
                labels.len()
            )));
        }

        let gray: Vec<GrayImage> = images.iter().map(imaging::to_grayscale).collect();
        recognizer.train(&gray, labels)?;

        if let Some(parent) = model_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        recognizer.save(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            samples = images.len(),
            "trained recognizer model"
        );
        Ok(ModelSource::Trained)
    }
}
