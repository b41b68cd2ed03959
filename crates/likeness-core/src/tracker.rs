//! Single-target face tracking between detections.

use crate::types::DetectionBox;
use image::imageops;
use image::GrayImage;
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};

/// Follows one face box across consecutive grayscale frames.
pub trait Tracker: Send {
    /// Start tracking `bbox` on `frame`, replacing any previous target.
    fn init(&mut self, frame: &GrayImage, bbox: DetectionBox);

    /// Locate the target on `frame`. `None` means the target was lost.
    fn update(&mut self, frame: &GrayImage) -> Option<DetectionBox>;
}

/// Maximum root-mean-square difference (0..=255) accepted as a match.
const DEFAULT_MAX_DIFFERENCE: f64 = 40.0;
/// Search margin around the previous box, as a fraction of its size.
const SEARCH_MARGIN: f64 = 0.5;

/// Sum-of-squared-errors template matching in a window around the last
/// position.
///
/// The template is captured once at `init` and never refreshed, so drift
/// cannot accumulate.
#[derive(Debug)]
pub struct TemplateTracker {
    max_difference: f64,
    template: Option<GrayImage>,
    last: Option<DetectionBox>,
}

impl Default for TemplateTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIFFERENCE)
    }
}

impl TemplateTracker {
    pub fn new(max_difference: f64) -> Self {
        Self {
            max_difference,
            template: None,
            last: None,
        }
    }

    fn reset(&mut self) {
        self.template = None;
        self.last = None;
    }
}

impl Tracker for TemplateTracker {
    fn init(&mut self, frame: &GrayImage, bbox: DetectionBox) {
        self.reset();
        let Some(b) = bbox.clamp_to(frame.width(), frame.height()) else {
            tracing::debug!(?bbox, "tracker init box outside frame");
            return;
        };
        let template = imageops::crop_imm(frame, b.x as u32, b.y as u32, b.width as u32, b.height as u32)
            .to_image();
        self.template = Some(template);
        self.last = Some(b);
    }

    fn update(&mut self, frame: &GrayImage) -> Option<DetectionBox> {
        let template = self.template.as_ref()?;
        let last = self.last?;
        let (tw, th) = (template.width() as i32, template.height() as i32);
        let (fw, fh) = (frame.width() as i32, frame.height() as i32);

        if tw > fw || th > fh {
            tracing::debug!(fw, fh, tw, th, "frame smaller than template");
            self.reset();
            return None;
        }

        // Window of candidate top-left corners, then widened by the template.
        let mx = (last.width as f64 * SEARCH_MARGIN).ceil() as i32;
        let my = (last.height as f64 * SEARCH_MARGIN).ceil() as i32;
        let x0 = (last.x - mx).clamp(0, fw - tw);
        let y0 = (last.y - my).clamp(0, fh - th);
        let x1 = (last.x + mx).clamp(x0, fw - tw);
        let y1 = (last.y + my).clamp(y0, fh - th);
        let window = imageops::crop_imm(
            frame,
            x0 as u32,
            y0 as u32,
            (x1 - x0 + tw) as u32,
            (y1 - y0 + th) as u32,
        )
        .to_image();

        let scores = match_template(&window, template, MatchTemplateMethod::SumOfSquaredErrors);
        let best = find_extremes(&scores);
        let rms = (best.min_value.max(0.0) as f64 / (tw * th) as f64).sqrt();

        if rms <= self.max_difference {
            let (dx, dy) = best.min_value_location;
            let found = DetectionBox::new(x0 + dx as i32, y0 + dy as i32, tw, th);
            self.last = Some(found);
            Some(found)
        } else {
            tracing::debug!(rms, "tracker lost target");
            self.reset();
            None
        }
    }
}
