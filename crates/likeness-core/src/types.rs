use serde::{Deserialize, Serialize};

/// Integer identity key assigned to a person during catalog ingestion.
pub type Label = u32;

/// Axis-aligned face rectangle, in pixels of the image it was detected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DetectionBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl DetectionBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Multiply every coordinate and dimension by `factor`, rounding to the
    /// nearest pixel.
    pub fn scaled(&self, factor: f64) -> Self {
        let mul = |v: i32| (v as f64 * factor).round() as i32;
        Self {
            x: mul(self.x),
            y: mul(self.y),
            width: mul(self.width),
            height: mul(self.height),
        }
    }

    /// Map a box found on an image shrunk by `scale` back into the
    /// coordinate space of the unshrunk image.
    ///
    /// Inverse of [`scaled`](Self::scaled) up to rounding.
    pub fn rescale(&self, scale: f64) -> Self {
        let div = |v: i32| (v as f64 / scale).round() as i32;
        Self {
            x: div(self.x),
            y: div(self.y),
            width: div(self.width),
            height: div(self.height),
        }
    }

    /// Intersect with the image rectangle `[0, width) × [0, height)`.
    ///
    /// Returns `None` when nothing of the box lies inside the image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let x1 = self.x.max(0);
        let y1 = self.y.max(0);
        let x2 = self.x.saturating_add(self.width).min(width as i32);
        let y2 = self.y.saturating_add(self.height).min(height as i32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Self::new(x1, y1, x2 - x1, y2 - y1))
    }
}

/// Tuning knobs handed to the [`Detector`](crate::Detector) on every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    /// Minimum number of overlapping raw candidates backing an accepted face.
    pub min_neighbors: u32,
    /// Image-pyramid step for multi-scale detectors.
    pub scale_step: f32,
}

impl DetectionParams {
    /// Parameters for live frames.
    pub const FRAME: Self = Self {
        min_neighbors: 4,
        scale_step: 1.5,
    };

    /// Parameters for catalog photos, where recall matters more than speed.
    pub const CATALOG: Self = Self {
        min_neighbors: 3,
        scale_step: 1.1,
    };
}

/// Recognizer output for a single face crop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Label,
    /// Distance-like score: lower means more similar.
    pub confidence: f64,
}

/// A resolved face in the original frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionOutcome {
    pub name: String,
    /// Box in original frame coordinates.
    pub bbox: DetectionBox,
    pub prediction: Prediction,
}
