//! Face recognition capability and its Local Binary Patterns Histograms
//! (LBPH) implementation.
//!
//! Each training crop is turned into a grid of LBP histograms; prediction is
//! nearest neighbour under the chi-square distance, so the reported
//! confidence is a distance (lower = more similar).

use crate::types::{Label, Prediction};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

/// Default sampling radius in pixels.
const LBPH_RADIUS: u32 = 1;
/// Default number of circular sample points (one code bit each).
const LBPH_NEIGHBORS: u32 = 8;
/// Default histogram grid.
const LBPH_GRID: u32 = 8;
/// Tolerance for the "neighbour equals centre" comparison. Bilinear weights
/// only sum to one up to rounding, so this is single-precision epsilon.
const LBP_EPSILON: f64 = f32::EPSILON as f64;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognizer has not been trained or loaded")]
    NotTrained,
    #[error("invalid training input: {0}")]
    InvalidInput(String),
    #[error("image too small for LBPH: {width}x{height}, need at least {min}x{min}")]
    ImageTooSmall { width: u32, height: u32, min: u32 },
    #[error("invalid model artifact: {0}")]
    InvalidModel(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("model serialization: {0}")]
    Json(#[from] serde_json::Error),
}

/// Classifies grayscale face crops against labeled training crops.
pub trait Recognizer: Send {
    /// Replace any existing model with one trained on `images`/`labels`.
    fn train(&mut self, images: &[GrayImage], labels: &[Label]) -> Result<(), RecognizerError>;

    fn predict(&mut self, image: &GrayImage) -> Result<Prediction, RecognizerError>;

    fn save(&self, path: &Path) -> Result<(), RecognizerError>;

    fn load(&mut self, path: &Path) -> Result<(), RecognizerError>;
}

/// LBPH operator and grid configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LbphParams {
    pub radius: u32,
    /// Sample points on the circle, 1..=8.
    pub neighbors: u32,
    pub grid_x: u32,
    pub grid_y: u32,
}

impl Default for LbphParams {
    fn default() -> Self {
        Self {
            radius: LBPH_RADIUS,
            neighbors: LBPH_NEIGHBORS,
            grid_x: LBPH_GRID,
            grid_y: LBPH_GRID,
        }
    }
}

impl LbphParams {
    fn validate(&self) -> Result<(), RecognizerError> {
        if self.radius == 0 || self.grid_x == 0 || self.grid_y == 0 {
            return Err(RecognizerError::InvalidModel(format!(
                "radius and grid must be positive: {self:?}"
            )));
        }
        if !(1..=8).contains(&self.neighbors) {
            return Err(RecognizerError::InvalidModel(format!(
                "neighbors must be within 1..=8, got {}",
                self.neighbors
            )));
        }
        Ok(())
    }

    fn bins(&self) -> usize {
        1 << self.neighbors
    }

    fn histogram_len(&self) -> usize {
        (self.grid_x * self.grid_y) as usize * self.bins()
    }

    /// Smallest square crop that yields at least one LBP pixel per grid cell.
    pub fn min_side(&self) -> u32 {
        2 * self.radius + self.grid_x.max(self.grid_y)
    }
}

/// Persisted model: one spatial histogram per training crop.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LbphModel {
    params: LbphParams,
    histograms: Vec<Vec<f32>>,
    labels: Vec<Label>,
}

/// LBPH recognizer. Untrained until [`train`](Recognizer::train) or
/// [`load`](Recognizer::load) succeeds.
#[derive(Debug, Default)]
pub struct LbphRecognizer {
    params: LbphParams,
    model: Option<LbphModel>,
}

impl LbphRecognizer {
    pub fn new(params: LbphParams) -> Result<Self, RecognizerError> {
        params.validate()?;
        Ok(Self {
            params,
            model: None,
        })
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn params(&self) -> LbphParams {
        self.params
    }

    fn spatial_histogram(&self, image: &GrayImage) -> Result<Vec<f32>, RecognizerError> {
        let p = &self.params;
        let min = p.min_side();
        if image.width() < min || image.height() < min {
            return Err(RecognizerError::ImageTooSmall {
                width: image.width(),
                height: image.height(),
                min,
            });
        }

        let (codes, w, h) = lbp_codes(image, p.radius, p.neighbors);
        let cell_w = w / p.grid_x as usize;
        let cell_h = h / p.grid_y as usize;
        let bins = p.bins();
        let cell_pixels = (cell_w * cell_h) as f32;

        let mut hist = vec![0.0f32; p.histogram_len()];
        for gy in 0..p.grid_y as usize {
            for gx in 0..p.grid_x as usize {
                let cell = &mut hist[(gy * p.grid_x as usize + gx) * bins..][..bins];
                for y in gy * cell_h..(gy + 1) * cell_h {
                    for x in gx * cell_w..(gx + 1) * cell_w {
                        cell[codes[y * w + x] as usize] += 1.0;
                    }
                }
                for v in cell.iter_mut() {
                    *v /= cell_pixels;
                }
            }
        }

        Ok(hist)
    }
}

impl Recognizer for LbphRecognizer {
    fn train(&mut self, images: &[GrayImage], labels: &[Label]) -> Result<(), RecognizerError> {
        if images.is_empty() || images.len() != labels.len() {
            return Err(RecognizerError::InvalidInput(format!(
                "{} images, {} labels",
                images.len(),
                labels.len()
            )));
        }

        let histograms = images
            .iter()
            .map(|img| self.spatial_histogram(img))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(samples = histograms.len(), params = ?self.params, "LBPH trained");

        self.model = Some(LbphModel {
            params: self.params,
            histograms,
            labels: labels.to_vec(),
        });
        Ok(())
    }

    fn predict(&mut self, image: &GrayImage) -> Result<Prediction, RecognizerError> {
        let model = self.model.as_ref().ok_or(RecognizerError::NotTrained)?;
        let probe = self.spatial_histogram(image)?;

        let (idx, distance) = model
            .histograms
            .iter()
            .map(|h| chi_square(&probe, h))
            .enumerate()
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .ok_or(RecognizerError::NotTrained)?;

        Ok(Prediction {
            label: model.labels[idx],
            confidence: distance,
        })
    }

    fn save(&self, path: &Path) -> Result<(), RecognizerError> {
        let model = self.model.as_ref().ok_or(RecognizerError::NotTrained)?;
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, model)?;
        tracing::info!(path = %path.display(), samples = model.labels.len(), "saved LBPH model");
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<(), RecognizerError> {
        let reader = BufReader::new(File::open(path)?);
        let model: LbphModel = serde_json::from_reader(reader)?;
        model.params.validate()?;

        if model.histograms.is_empty() || model.histograms.len() != model.labels.len() {
            return Err(RecognizerError::InvalidModel(format!(
                "{} histograms, {} labels",
                model.histograms.len(),
                model.labels.len()
            )));
        }
        let expected = model.params.histogram_len();
        if let Some(bad) = model.histograms.iter().find(|h| h.len() != expected) {
            return Err(RecognizerError::InvalidModel(format!(
                "histogram length {}, expected {expected}",
                bad.len()
            )));
        }

        tracing::info!(path = %path.display(), samples = model.labels.len(), "loaded LBPH model");
        self.params = model.params;
        self.model = Some(model);
        Ok(())
    }
}

/// Extended (circular) LBP codes with bilinear sampling.
///
/// Returns the code image and its dimensions, which shrink by `radius` on
/// every side.
fn lbp_codes(image: &GrayImage, radius: u32, neighbors: u32) -> (Vec<u8>, usize, usize) {
    let r = radius as usize;
    let src_w = image.width() as usize;
    let w = src_w - 2 * r;
    let h = image.height() as usize - 2 * r;
    let raw = image.as_raw();
    let px = |x: usize, y: usize| raw[y * src_w + x] as f64;

    let mut codes = vec![0u8; w * h];
    for n in 0..neighbors {
        let angle = 2.0 * PI * n as f64 / neighbors as f64;
        let sx = radius as f64 * angle.cos();
        let sy = -(radius as f64) * angle.sin();

        let fx = sx.floor();
        let fy = sy.floor();
        let tx = sx - fx;
        let ty = sy - fy;
        let w1 = (1.0 - tx) * (1.0 - ty);
        let w2 = tx * (1.0 - ty);
        let w3 = (1.0 - tx) * ty;
        let w4 = tx * ty;

        // Far corner is ceil, not floor + 1: on integral offsets both corners
        // coincide (weight 0) and never step past `radius`.
        let (cx_off, cy_off) = (sx.ceil() as isize, sy.ceil() as isize);
        let (fx, fy) = (fx as isize, fy as isize);

        for y in r..r + h {
            for x in r..r + w {
                let at = |dx: isize, dy: isize| px((x as isize + dx) as usize, (y as isize + dy) as usize);
                let t = w1 * at(fx, fy) + w2 * at(cx_off, fy) + w3 * at(fx, cy_off) + w4 * at(cx_off, cy_off);
                let center = px(x, y);
                if t > center || (t - center).abs() < LBP_EPSILON {
                    codes[(y - r) * w + (x - r)] |= 1 << n;
                }
            }
        }
    }

    (codes, w, h)
}

/// Symmetric chi-square distance: `2 · Σ (a − b)² / (a + b)`.
fn chi_square(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&a, &b)| {
            let sum = (a + b) as f64;
            if sum > 0.0 {
                let diff = (a - b) as f64;
                2.0 * diff * diff / sum
            } else {
                0.0
            }
        })
        .sum()
}
