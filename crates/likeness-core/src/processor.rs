//! Per-frame detect → recognize → resolve → annotate pipeline.

use crate::detector::{Detector, DetectorError};
use crate::imaging;
use crate::recognizer::{Recognizer, RecognizerError};
use crate::resolver::{IdentityResolver, KnownNames};
use crate::tracker::Tracker;
use crate::types::{DetectionBox, DetectionParams, RecognitionOutcome};
use image::{GrayImage, RgbImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("scale factor must be in (0, 1], got {0}")]
    InvalidScale(f64),
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Where the processor gets face boxes from on the next frame.
enum Tracking {
    /// Detect on every frame.
    Disabled,
    /// Detect until the first face, then arm the tracker.
    Waiting(Box<dyn Tracker>),
    Active(Box<dyn Tracker>),
    /// Tracker failed once; detect on every frame from now on.
    Lost,
}

impl Tracking {
    fn label(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Waiting(_) => "waiting",
            Self::Active(_) => "active",
            Self::Lost => "lost",
        }
    }
}

pub struct FrameProcessor {
    detector: Box<dyn Detector>,
    recognizer: Box<dyn Recognizer>,
    names: KnownNames,
    resolver: IdentityResolver,
    params: DetectionParams,
    scale: f64,
    tracking: Tracking,
    frames: u64,
}

impl FrameProcessor {
    /// `scale` shrinks each frame before detection and must lie in (0, 1].
    pub fn new(
        detector: Box<dyn Detector>,
        recognizer: Box<dyn Recognizer>,
        names: KnownNames,
        scale: f64,
    ) -> Result<Self, ProcessError> {
        if !(scale > 0.0 && scale <= 1.0) {
            return Err(ProcessError::InvalidScale(scale));
        }
        Ok(Self {
            detector,
            recognizer,
            names,
            resolver: IdentityResolver::default(),
            params: DetectionParams::FRAME,
            scale,
            tracking: Tracking::Disabled,
            frames: 0,
        })
    }

    /// Follow the first detected face with `tracker` instead of detecting on
    /// every frame.
    pub fn with_tracker(mut self, tracker: Box<dyn Tracker>) -> Self {
        self.tracking = Tracking::Waiting(tracker);
        self
    }

    pub fn with_resolver(mut self, resolver: IdentityResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_params(mut self, params: DetectionParams) -> Self {
        self.params = params;
        self
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn names(&self) -> &KnownNames {
        &self.names
    }

    /// Run the pipeline on `frame`, drawing every resolved face onto it.
    ///
    /// A frame with no faces is left untouched. A face the recognizer fails
    /// on is logged and left out of the result.
    pub fn process_frame(
        &mut self,
        frame: &mut RgbImage,
    ) -> Result<Vec<RecognitionOutcome>, ProcessError> {
        self.frames += 1;
        if frame.width() == 0 || frame.height() == 0 {
            tracing::warn!(frame = self.frames, "empty frame, skipping");
            return Ok(Vec::new());
        }

        let small = imaging::resize_by(frame, self.scale);
        let gray = imaging::prepare_for_detection(&small);
        let boxes = self.locate_faces(&gray)?;

        let mut outcomes = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let Some(roi) = imaging::crop_gray(&gray, &bbox) else {
                tracing::debug!(?bbox, "face box outside frame");
                continue;
            };
            let prediction = match self.recognizer.predict(&roi) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(frame = self.frames, ?bbox, error = %e, "recognition failed");
                    continue;
                }
            };
            let name = self
                .resolver
                .resolve(prediction.label, prediction.confidence, &self.names);
            outcomes.push(RecognitionOutcome {
                name,
                bbox: bbox.rescale(self.scale),
                prediction,
            });
        }

        for outcome in &outcomes {
            imaging::annotate(frame, &outcome.bbox, &outcome.name);
        }

        tracing::debug!(
            frame = self.frames,
            faces = outcomes.len(),
            tracking = self.tracking.label(),
            "frame processed"
        );
        Ok(outcomes)
    }

    fn locate_faces(&mut self, gray: &GrayImage) -> Result<Vec<DetectionBox>, ProcessError> {
        match std::mem::replace(&mut self.tracking, Tracking::Lost) {
            Tracking::Disabled => {
                self.tracking = Tracking::Disabled;
                self.detect(gray)
            }
            Tracking::Lost => self.detect(gray),
            Tracking::Waiting(mut tracker) => {
                let boxes = match self.detect(gray) {
                    Ok(b) => b,
                    Err(e) => {
                        self.tracking = Tracking::Waiting(tracker);
                        return Err(e);
                    }
                };
                self.tracking = match boxes.first() {
                    Some(&first) => {
                        tracker.init(gray, first);
                        tracing::info!(bbox = ?first, "tracker armed");
                        Tracking::Active(tracker)
                    }
                    None => Tracking::Waiting(tracker),
                };
                Ok(boxes)
            }
            Tracking::Active(mut tracker) => match tracker.update(gray) {
                Some(bbox) => {
                    self.tracking = Tracking::Active(tracker);
                    Ok(vec![bbox])
                }
                None => {
                    tracing::warn!(
                        frame = self.frames,
                        "tracker lost target, detecting on every frame"
                    );
                    self.detect(gray)
                }
            },
        }
    }

    fn detect(&mut self, gray: &GrayImage) -> Result<Vec<DetectionBox>, ProcessError> {
        Ok(self.detector.detect(gray, &self.params)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::ANNOTATION_COLOR;
    use crate::recognizer::LbphRecognizer;
    use crate::resolver::UNKNOWN_NAME;
    use crate::trainer::{ModelSource, ModelTrainer};
    use crate::types::{Label, Prediction};
    use image::Rgb;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedDetector {
        boxes: Vec<DetectionBox>,
        calls: Arc<AtomicUsize>,
    }

    impl FixedDetector {
        fn boxed(boxes: Vec<DetectionBox>) -> (Box<dyn Detector>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let det = Self {
                boxes,
                calls: calls.clone(),
            };
            (Box::new(det), calls)
        }
    }

    impl Detector for FixedDetector {
        fn detect(
            &mut self,
            _image: &GrayImage,
            params: &DetectionParams,
        ) -> Result<Vec<DetectionBox>, DetectorError> {
            assert_eq!(*params, DetectionParams::FRAME);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.boxes.clone())
        }
    }

    struct FixedRecognizer(Result<Prediction, ()>);

    impl FixedRecognizer {
        fn boxed(label: Label, confidence: f64) -> Box<dyn Recognizer> {
            Box::new(Self(Ok(Prediction { label, confidence })))
        }
    }

    impl Recognizer for FixedRecognizer {
        fn train(&mut self, _: &[GrayImage], _: &[Label]) -> Result<(), RecognizerError> {
            Ok(())
        }

        fn predict(&mut self, _image: &GrayImage) -> Result<Prediction, RecognizerError> {
            self.0.map_err(|_| RecognizerError::NotTrained)
        }

        fn save(&self, _: &Path) -> Result<(), RecognizerError> {
            Ok(())
        }

        fn load(&mut self, _: &Path) -> Result<(), RecognizerError> {
            Ok(())
        }
    }

    /// Returns its box for `hits` updates, then loses the target.
    struct ScriptedTracker {
        hits: usize,
        inits: Arc<AtomicUsize>,
        updates: Arc<AtomicUsize>,
        bbox: Option<DetectionBox>,
    }

    impl Tracker for ScriptedTracker {
        fn init(&mut self, _frame: &GrayImage, bbox: DetectionBox) {
            self.inits.fetch_add(1, Ordering::SeqCst);
            self.bbox = Some(bbox);
        }

        fn update(&mut self, _frame: &GrayImage) -> Option<DetectionBox> {
            let n = self.updates.fetch_add(1, Ordering::SeqCst);
            if n < self.hits {
                self.bbox
            } else {
                None
            }
        }
    }

    fn names() -> KnownNames {
        [(0, "Alice".to_string()), (1, "Bob".to_string())]
            .into_iter()
            .collect()
    }

    fn frame() -> RgbImage {
        RgbImage::from_pixel(100, 100, Rgb([90, 90, 90]))
    }

    #[test]
    fn test_zero_detections_leaves_frame_untouched() {
        let (det, _) = FixedDetector::boxed(Vec::new());
        let mut proc = FrameProcessor::new(det, FixedRecognizer::boxed(0, 1.0), names(), 0.5).unwrap();
        let mut f = frame();
        let outcomes = proc.process_frame(&mut f).unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(f, frame());
    }

    #[test]
    fn test_box_rescaled_and_drawn() {
        let (det, _) = FixedDetector::boxed(vec![DetectionBox::new(10, 10, 20, 20)]);
        let mut proc = FrameProcessor::new(det, FixedRecognizer::boxed(0, 42.0), names(), 0.5).unwrap();
        let mut f = frame();

        let outcomes = proc.process_frame(&mut f).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].name, "Alice");
        assert_eq!(outcomes[0].bbox, DetectionBox::new(20, 20, 40, 40));
        assert_eq!(*f.get_pixel(20, 20), ANNOTATION_COLOR);
        // Below the caption, inside the box.
        assert_eq!(*f.get_pixel(40, 55), Rgb([90, 90, 90]));
    }

    #[test]
    fn test_threshold_boundary() {
        let (det, _) = FixedDetector::boxed(vec![DetectionBox::new(10, 10, 20, 20)]);
        let mut proc =
            FrameProcessor::new(det, FixedRecognizer::boxed(1, 149.999), names(), 1.0).unwrap();
        assert_eq!(proc.process_frame(&mut frame()).unwrap()[0].name, "Bob");

        let (det, _) = FixedDetector::boxed(vec![DetectionBox::new(10, 10, 20, 20)]);
        let mut proc = FrameProcessor::new(det, FixedRecognizer::boxed(1, 150.0), names(), 1.0).unwrap();
        assert_eq!(proc.process_frame(&mut frame()).unwrap()[0].name, UNKNOWN_NAME);
    }

    #[test]
    fn test_unknown_label_resolves_to_unknown() {
        let (det, _) = FixedDetector::boxed(vec![DetectionBox::new(10, 10, 20, 20)]);
        let mut proc = FrameProcessor::new(det, FixedRecognizer::boxed(99, 3.0), names(), 1.0).unwrap();
        let outcomes = proc.process_frame(&mut frame()).unwrap();
        assert_eq!(outcomes[0].name, UNKNOWN_NAME);
        assert_eq!(outcomes[0].prediction.label, 99);
    }

    #[test]
    fn test_recognizer_failure_skips_face() {
        let (det, _) = FixedDetector::boxed(vec![
            DetectionBox::new(10, 10, 20, 20),
            DetectionBox::new(60, 60, 20, 20),
        ]);
        let rec: Box<dyn Recognizer> = Box::new(FixedRecognizer(Err(())));
        let mut proc = FrameProcessor::new(det, rec, names(), 1.0).unwrap();
        let mut f = frame();
        assert!(proc.process_frame(&mut f).unwrap().is_empty());
        assert_eq!(f, frame());
    }

    #[test]
    fn test_out_of_frame_box_skipped() {
        let (det, _) = FixedDetector::boxed(vec![DetectionBox::new(500, 500, 20, 20)]);
        let mut proc = FrameProcessor::new(det, FixedRecognizer::boxed(0, 1.0), names(), 1.0).unwrap();
        assert!(proc.process_frame(&mut frame()).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_scale() {
        for scale in [0.0, -0.5, 1.5, f64::NAN] {
            let (det, _) = FixedDetector::boxed(Vec::new());
            let res = FrameProcessor::new(det, FixedRecognizer::boxed(0, 1.0), names(), scale);
            assert!(matches!(res, Err(ProcessError::InvalidScale(_))), "{scale}");
        }
    }

    #[test]
    fn test_empty_frame() {
        let (det, calls) = FixedDetector::boxed(vec![DetectionBox::new(0, 0, 5, 5)]);
        let mut proc = FrameProcessor::new(det, FixedRecognizer::boxed(0, 1.0), names(), 0.5).unwrap();
        let mut f = RgbImage::new(0, 0);
        assert!(proc.process_frame(&mut f).unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_tracker_armed_once_and_never_rearmed() {
        let (det, det_calls) = FixedDetector::boxed(vec![DetectionBox::new(10, 10, 20, 20)]);
        let inits = Arc::new(AtomicUsize::new(0));
        let updates = Arc::new(AtomicUsize::new(0));
        let tracker = ScriptedTracker {
            hits: 2,
            inits: inits.clone(),
            updates: updates.clone(),
            bbox: None,
        };
        let mut proc = FrameProcessor::new(det, FixedRecognizer::boxed(0, 1.0), names(), 1.0)
            .unwrap()
            .with_tracker(Box::new(tracker));

        // Frame 1 detects and arms; frames 2-3 track; frame 4 loses the
        // target and detects; frames 5-6 detect only.
        for _ in 0..6 {
            let outcomes = proc.process_frame(&mut frame()).unwrap();
            assert_eq!(outcomes.len(), 1);
        }

        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert_eq!(updates.load(Ordering::SeqCst), 3);
        assert_eq!(det_calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_tracker_waits_for_first_face() {
        let (det, det_calls) = FixedDetector::boxed(Vec::new());
        let inits = Arc::new(AtomicUsize::new(0));
        let tracker = ScriptedTracker {
            hits: usize::MAX,
            inits: inits.clone(),
            updates: Arc::new(AtomicUsize::new(0)),
            bbox: None,
        };
        let mut proc = FrameProcessor::new(det, FixedRecognizer::boxed(0, 1.0), names(), 1.0)
            .unwrap()
            .with_tracker(Box::new(tracker));

        for _ in 0..3 {
            proc.process_frame(&mut frame()).unwrap();
        }
        assert_eq!(inits.load(Ordering::SeqCst), 0);
        assert_eq!(det_calls.load(Ordering::SeqCst), 3);
    }

    fn two_level(w: u32, h: u32, lit: impl Fn(u32, u32) -> bool) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| if lit(x, y) { Rgb([220, 220, 220]) } else { Rgb([30, 30, 30]) })
    }

    fn checker() -> RgbImage {
        two_level(48, 48, |x, y| (x / 2 + y / 2) % 2 == 0)
    }

    fn stripes() -> RgbImage {
        two_level(48, 48, |_, y| (y / 3) % 2 == 0)
    }

    /// Reports the box where each catalog photo's face was pasted.
    struct PastedFace;

    impl Detector for PastedFace {
        fn detect(
            &mut self,
            _image: &GrayImage,
            _params: &DetectionParams,
        ) -> Result<Vec<DetectionBox>, DetectorError> {
            Ok(vec![DetectionBox::new(16, 16, 48, 48)])
        }
    }

    #[test]
    fn test_lbph_model_names_faces_end_to_end() {
        let photo = |face: &RgbImage| {
            let mut img = RgbImage::from_pixel(80, 80, Rgb([90, 90, 90]));
            image::imageops::replace(&mut img, face, 16, 16);
            img
        };

        let trainer = ModelTrainer::default();
        let samples = vec![(0, photo(&checker())), (1, photo(&stripes()))];
        let (labels, crops): (Vec<Label>, Vec<RgbImage>) =
            trainer.prepare(&mut PastedFace, samples).unwrap().into_iter().unzip();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lbph.json");
        let mut rec = LbphRecognizer::default();
        assert_eq!(
            trainer.train_or_load(&mut rec, &crops, &labels, &path).unwrap(),
            ModelSource::Trained
        );

        let mut loaded = LbphRecognizer::default();
        assert_eq!(
            trainer.train_or_load(&mut loaded, &[], &[], &path).unwrap(),
            ModelSource::Loaded
        );

        // Faces swapped left/right relative to the label order.
        let mut f = RgbImage::from_pixel(200, 100, Rgb([90, 90, 90]));
        image::imageops::replace(&mut f, &stripes(), 10, 30);
        image::imageops::replace(&mut f, &checker(), 110, 30);
        let (det, _) = FixedDetector::boxed(vec![
            DetectionBox::new(10, 30, 48, 48),
            DetectionBox::new(110, 30, 48, 48),
        ]);
        let mut proc = FrameProcessor::new(det, Box::new(loaded), names(), 1.0).unwrap();

        let outcomes = proc.process_frame(&mut f).unwrap();
        let got: Vec<(&str, Label)> = outcomes
            .iter()
            .map(|o| (o.name.as_str(), o.prediction.label))
            .collect();
        assert_eq!(got, vec![("Bob", 1), ("Alice", 0)]);
        assert!(outcomes.iter().all(|o| o.prediction.confidence < 1.0));
    }
}
