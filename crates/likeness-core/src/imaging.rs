//! Image helpers shared by the trainer and the frame processor:
//! grayscale conversion, histogram equalization, proportional resize,
//! cropping and box/caption drawing.

use crate::types::DetectionBox;
use ab_glyph::{FontRef, PxScale};
use image::imageops::{self, FilterType};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::contrast::equalize_histogram_mut;
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::sync::OnceLock;

/// Box and caption colour.
pub const ANNOTATION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
/// Rectangle stroke width in pixels.
pub const BOX_THICKNESS: u32 = 2;
/// Caption glyph height in pixels.
pub const CAPTION_SCALE: f32 = 20.0;
/// Gap between the top edge of a box and the bottom of its caption.
const CAPTION_OFFSET: i32 = 10;

static CAPTION_FONT_BYTES: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

fn caption_font() -> Option<&'static FontRef<'static>> {
    static FONT: OnceLock<Option<FontRef<'static>>> = OnceLock::new();
    FONT.get_or_init(|| match FontRef::try_from_slice(CAPTION_FONT_BYTES) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::error!(error = %e, "caption font unreadable, names will not be drawn");
            None
        }
    })
    .as_ref()
}

pub fn to_grayscale(image: &RgbImage) -> GrayImage {
    imageops::grayscale(image)
}

/// Grayscale conversion followed by histogram equalization.
pub fn prepare_for_detection(image: &RgbImage) -> GrayImage {
    let mut gray = to_grayscale(image);
    equalize_histogram_mut(&mut gray);
    gray
}

/// Dimensions of `width × height` shrunk by `scale`, truncated toward zero
/// and never below one pixel.
pub fn scaled_dimensions(width: u32, height: u32, scale: f64) -> (u32, u32) {
    let w = ((width as f64 * scale) as u32).max(1);
    let h = ((height as f64 * scale) as u32).max(1);
    (w, h)
}

/// Proportionally resize with bilinear filtering.
pub fn resize_by(image: &RgbImage, scale: f64) -> RgbImage {
    let (w, h) = scaled_dimensions(image.width(), image.height(), scale);
    if (w, h) == image.dimensions() {
        return image.clone();
    }
    imageops::resize(image, w, h, FilterType::Triangle)
}

pub fn crop_gray(image: &GrayImage, bbox: &DetectionBox) -> Option<GrayImage> {
    let b = bbox.clamp_to(image.width(), image.height())?;
    Some(imageops::crop_imm(image, b.x as u32, b.y as u32, b.width as u32, b.height as u32).to_image())
}

pub fn crop_rgb(image: &RgbImage, bbox: &DetectionBox) -> Option<RgbImage> {
    let b = bbox.clamp_to(image.width(), image.height())?;
    Some(imageops::crop_imm(image, b.x as u32, b.y as u32, b.width as u32, b.height as u32).to_image())
}

/// Outline `bbox` with a `thickness`-pixel stroke drawn inward from its edge.
/// Parts outside the frame are clipped.
pub fn draw_box(frame: &mut RgbImage, bbox: &DetectionBox, color: Rgb<u8>, thickness: u32) {
    for i in 0..thickness as i32 {
        let (w, h) = (bbox.width - 2 * i, bbox.height - 2 * i);
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(bbox.x + i, bbox.y + i).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(frame, rect, color);
    }
}

/// Draw a face box with its caption above it, or just inside the top edge
/// when the box touches the top of the frame.
pub fn annotate(frame: &mut RgbImage, bbox: &DetectionBox, caption: &str) {
    draw_box(frame, bbox, ANNOTATION_COLOR, BOX_THICKNESS);

    let Some(font) = caption_font() else {
        return;
    };
    let scale = PxScale::from(CAPTION_SCALE);
    let (_, text_h) = text_size(scale, font, caption);

    let above = bbox.y - CAPTION_OFFSET - text_h as i32;
    let text_y = if above >= 0 {
        above
    } else {
        bbox.y + BOX_THICKNESS as i32 + 2
    };
    draw_text_mut(frame, ANNOTATION_COLOR, bbox.x, text_y, scale, font, caption);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    fn stddev(img: &GrayImage) -> f32 {
        let n = (img.width() * img.height()) as f32;
        let mean = img.pixels().map(|p| p.0[0] as f32).sum::<f32>() / n;
        let var = img.pixels().map(|p| (p.0[0] as f32 - mean).powi(2)).sum::<f32>() / n;
        var.sqrt()
    }

    fn lit_in(frame: &RgbImage, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) -> bool {
        ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
            .any(|(x, y)| *frame.get_pixel(x, y) != BLACK)
    }

    #[test]
    fn test_prepare_stretches_low_contrast() {
        let rgb = RgbImage::from_fn(16, 16, |x, y| {
            let v = 100 + ((x + y) % 11) as u8;
            Rgb([v, v, v])
        });
        let before = to_grayscale(&rgb);
        let after = prepare_for_detection(&rgb);
        assert!(stddev(&after) > stddev(&before) * 4.0);
        assert_eq!(after.pixels().map(|p| p.0[0]).max(), Some(255));
    }

    #[test]
    fn test_prepare_preserves_order() {
        let rgb = RgbImage::from_fn(4, 1, |x, _| {
            let v = [10, 20, 20, 200][x as usize];
            Rgb([v, v, v])
        });
        let gray = prepare_for_detection(&rgb);
        let v: Vec<u8> = gray.pixels().map(|p| p.0[0]).collect();
        assert!(v[0] < v[1] && v[1] == v[2] && v[2] < v[3], "{v:?}");
    }

    #[test]
    fn test_scaled_dimensions_truncate() {
        assert_eq!(scaled_dimensions(641, 481, 0.5), (320, 240));
        assert_eq!(scaled_dimensions(640, 480, 1.0), (640, 480));
        assert_eq!(scaled_dimensions(1, 1, 0.1), (1, 1));
    }

    #[test]
    fn test_resize_by_half() {
        let img = RgbImage::new(100, 60);
        let out = resize_by(&img, 0.5);
        assert_eq!(out.dimensions(), (50, 30));
    }

    #[test]
    fn test_crop_gray_clamps() {
        let img = GrayImage::from_fn(10, 10, |x, y| Luma([(x + y * 10) as u8]));
        let roi = crop_gray(&img, &DetectionBox::new(8, 8, 5, 5)).unwrap();
        assert_eq!(roi.dimensions(), (2, 2));
        assert_eq!(roi.get_pixel(0, 0).0[0], 88);
        assert!(crop_gray(&img, &DetectionBox::new(20, 20, 5, 5)).is_none());
    }

    #[test]
    fn test_draw_box_outline_only() {
        let mut frame = RgbImage::new(20, 20);
        draw_box(&mut frame, &DetectionBox::new(2, 2, 10, 10), ANNOTATION_COLOR, 2);
        assert_eq!(*frame.get_pixel(2, 2), ANNOTATION_COLOR);
        assert_eq!(*frame.get_pixel(3, 3), ANNOTATION_COLOR);
        assert_eq!(*frame.get_pixel(11, 11), ANNOTATION_COLOR);
        assert_eq!(*frame.get_pixel(10, 10), ANNOTATION_COLOR);
        assert_eq!(*frame.get_pixel(6, 6), BLACK);
        assert_eq!(*frame.get_pixel(15, 15), BLACK);
    }

    #[test]
    fn test_draw_box_clips_at_edges() {
        let mut frame = RgbImage::new(10, 10);
        draw_box(&mut frame, &DetectionBox::new(-5, -5, 30, 30), ANNOTATION_COLOR, 2);
        // Entire outline lies outside the frame.
        assert!(frame.pixels().all(|p| *p == BLACK));
    }

    #[test]
    fn test_draw_box_degenerate() {
        let mut frame = RgbImage::new(10, 10);
        draw_box(&mut frame, &DetectionBox::new(2, 2, 0, 5), ANNOTATION_COLOR, 2);
        assert!(frame.pixels().all(|p| *p == BLACK));
    }

    #[test]
    fn test_annotate_caption_above_box() {
        let mut frame = RgbImage::new(120, 120);
        annotate(&mut frame, &DetectionBox::new(10, 60, 60, 40), "Ada");
        assert!(lit_in(&frame, 10..70, 0..58));
    }

    #[test]
    fn test_annotate_caption_inside_when_no_room_above() {
        let mut frame = RgbImage::new(100, 100);
        annotate(&mut frame, &DetectionBox::new(10, 0, 60, 60), "A");
        // Between the stroke rows/columns, so only the caption can light it.
        assert!(lit_in(&frame, 12..40, 4..30));
    }

    #[test]
    fn test_annotate_renders_non_ascii_names_distinctly() {
        let render = |name: &str| {
            let mut frame = RgbImage::new(160, 80);
            annotate(&mut frame, &DetectionBox::new(5, 50, 100, 25), name);
            frame
        };
        let lukasz = render("Łukasz");
        assert_ne!(lukasz, render("Żukasz"));
        assert_ne!(lukasz, render("?ukasz"));
        assert_ne!(render("Zoë"), render("Zo?"));
    }
}
