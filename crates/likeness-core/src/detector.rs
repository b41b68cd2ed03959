//! Face detection capability and its SCRFD implementation via ONNX Runtime.
//!
//! SCRFD (Sample and Computation Redistribution for Efficient Face Detection)
//! is decoded anchor-free over three strides and post-processed with NMS.

use crate::types::{DetectionBox, DetectionParams};
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} — download det_10g.onnx from insightface into the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Finds face rectangles in a grayscale, histogram-equalized image.
///
/// Returned boxes are in the coordinate space of `image`, ordered by the
/// implementation's own preference (most confident first for SCRFD).
pub trait Detector: Send {
    fn detect(
        &mut self,
        image: &GrayImage,
        params: &DetectionParams,
    ) -> Result<Vec<DetectionBox>, DetectorError>;
}

/// Metadata for coordinate de-mapping after letterbox resize.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Decoded detection before suppression, in source image coordinates.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

/// Output tensor indices for one stride: (score_idx, bbox_idx).
type StrideOutputIndices = (usize, usize);

/// SCRFD-based face detector.
///
/// The network is single-scale, so [`DetectionParams::scale_step`] has no
/// effect. [`DetectionParams::min_neighbors`] is the minimum number of raw
/// candidates (the survivor included) that NMS must fold into a face.
pub struct ScrfdDetector {
    session: Session,
    stride_indices: [StrideOutputIndices; 3],
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.is_file() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 6 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires at least 6 outputs (3 strides × score/bbox), got {}",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        tracing::debug!(?stride_indices, "SCRFD output tensor mapping");

        Ok(Self {
            session,
            stride_indices,
        })
    }
}

impl Detector for ScrfdDetector {
    fn detect(
        &mut self,
        image: &GrayImage,
        params: &DetectionParams,
    ) -> Result<Vec<DetectionBox>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        let (input, letterbox) = letterbox(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (stride_pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_indices[stride_pos];

            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            candidates.extend(decode_stride(scores, bboxes, stride, &letterbox));
        }

        let raw = candidates.len();
        let min_support = params.min_neighbors.max(1) as usize;
        let faces: Vec<DetectionBox> = suppress(candidates, SCRFD_NMS_THRESHOLD)
            .into_iter()
            .filter(|(_, support)| *support >= min_support)
            .filter_map(|(c, _)| c.to_box().clamp_to(image.width(), image.height()))
            .collect();

        tracing::trace!(raw, faces = faces.len(), min_support, "SCRFD detect");
        Ok(faces)
    }
}

impl Candidate {
    fn to_box(&self) -> DetectionBox {
        let x = self.x1.round() as i32;
        let y = self.y1.round() as i32;
        DetectionBox::new(x, y, self.x2.round() as i32 - x, self.y2.round() as i32 - y)
    }

    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

/// Letterbox a grayscale image into the SCRFD NCHW input tensor.
///
/// The image is fitted inside the square input with bilinear filtering,
/// centred, and padded with the mean value (which normalizes to 0.0).
fn letterbox(image: &GrayImage) -> (Array4<f32>, Letterbox) {
    let (width, height) = (image.width() as f32, image.height() as f32);
    let size = SCRFD_INPUT_SIZE as f32;
    let scale = (size / width).min(size / height);

    let new_w = ((width * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE as u32);
    let new_h = ((height * scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE as u32);
    let pad_x = (SCRFD_INPUT_SIZE as u32 - new_w) as f32 / 2.0;
    let pad_y = (SCRFD_INPUT_SIZE as u32 - new_h) as f32 / 2.0;

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let x0 = pad_x.floor() as usize;
    let y0 = pad_y.floor() as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, SCRFD_INPUT_SIZE, SCRFD_INPUT_SIZE));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let normalized = (pixel.0[0] as f32 - SCRFD_MEAN) / SCRFD_STD;
        let (tx, ty) = (x0 + x as usize, y0 + y as usize);
        // Grayscale → 3-channel: replicate Y → [R=Y, G=Y, B=Y]
        tensor[[0, 0, ty, tx]] = normalized;
        tensor[[0, 1, ty, tx]] = normalized;
        tensor[[0, 2, ty, tx]] = normalized;
    }

    (tensor, Letterbox { scale, pad_x, pad_y })
}

/// Discover output tensor ordering by name.
///
/// Exports may name tensors "score_8", "bbox_16", ... or use generic numeric
/// names. Named outputs are mapped to their stride slots; otherwise the
/// standard positional ordering applies:
///   [0-2] = scores (strides 8, 16, 32)
///   [3-5] = bboxes (strides 8, 16, 32)
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| -> Option<usize> {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| n == &target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?)))
        .collect();

    match named {
        Some(found) => {
            tracing::info!("SCRFD: using name-based output tensor mapping");
            [found[0], found[1], found[2]]
        }
        None => {
            tracing::info!(
                ?names,
                "SCRFD: output names not recognized, using positional mapping [0-2]=scores, [3-5]=bboxes"
            );
            [(0, 3), (1, 4), (2, 5)]
        }
    }
}

/// Decode candidates for a single stride level and map them back from
/// letterbox space into source image space.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    letterbox: &Letterbox,
) -> Vec<Candidate> {
    let grid_w = SCRFD_INPUT_SIZE / stride;
    let grid_h = SCRFD_INPUT_SIZE / stride;
    let num_anchors = grid_h * grid_w * SCRFD_ANCHORS_PER_CELL;
    let s = stride as f32;

    let unmap_x = |v: f32| (v - letterbox.pad_x) / letterbox.scale;
    let unmap_y = |v: f32| (v - letterbox.pad_y) / letterbox.scale;

    (0..num_anchors)
        .filter_map(|idx| {
            let score = scores.get(idx).copied().unwrap_or(0.0);
            if score <= SCRFD_CONFIDENCE_THRESHOLD {
                return None;
            }
            let off = idx * 4;
            let d = bboxes.get(off..off + 4)?;

            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let anchor_x = (cell % grid_w) as f32 * s;
            let anchor_y = (cell / grid_w) as f32 * s;

            Some(Candidate {
                x1: unmap_x(anchor_x - d[0] * s),
                y1: unmap_y(anchor_y - d[1] * s),
                x2: unmap_x(anchor_x + d[2] * s),
                y2: unmap_y(anchor_y + d[3] * s),
                score,
            })
        })
        .collect()
}

/// Non-Maximum Suppression that also counts, for every survivor, how many
/// candidates it absorbed (itself included). Survivors come out in
/// descending score order.
fn suppress(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<(Candidate, usize)> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep = Vec::new();
    let mut suppressed = vec![false; candidates.len()];

    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        let mut support = 1;
        for j in (i + 1)..candidates.len() {
            if !suppressed[j] && iou(&candidates[i], &candidates[j]) > iou_threshold {
                suppressed[j] = true;
                support += 1;
            }
        }
        keep.push((candidates[i].clone(), support));
    }

    keep
}

/// Intersection-over-Union between two candidates.
fn iou(a: &Candidate, b: &Candidate) -> f32 {
    let inter = Candidate {
        x1: a.x1.max(b.x1),
        y1: a.y1.max(b.y1),
        x2: a.x2.min(b.x2),
        y2: a.y2.min(b.y2),
        score: 0.0,
    }
    .area();
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
