/// Classical fallback detector: Canny edges → external contours → bounding
/// rectangles. Used whenever the trained detector yields nothing.
use image::RgbImage;
use imageproc::contours::{find_contours, BorderType};

use crate::perception::classifier::{CANNY_HIGH, CANNY_LOW};
use crate::perception::types::RawDetection;

/// Rectangles narrower or shorter than this are noise.
pub const MIN_SIDE: u32 = 20;
/// Survivors kept, in discovery order.
pub const MAX_CONTOURS: usize = 50;
/// Reported for every contour box; there is no model score.
pub const CONTOUR_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone, Copy, Default)]
pub struct ContourDetector;

impl ContourDetector {
    pub fn new() -> Self {
        Self
    }

    /// Bounding rectangles of outermost edge contours, filtered and capped.
    pub fn detect(&self, image: &RgbImage) -> Vec<RawDetection> {
        let gray = image::imageops::grayscale(image);
        let edges = imageproc::edges::canny(&gray, CANNY_LOW, CANNY_HIGH);
        let contours = find_contours::<u32>(&edges);

        let detections: Vec<RawDetection> = contours
            .iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .filter_map(|c| {
                let (x, y, w, h) = bounding_rect(&c.points)?;
                if w < MIN_SIDE || h < MIN_SIDE {
                    return None;
                }
                Some(RawDetection {
                    bbox: [x as f32, y as f32, (x + w) as f32, (y + h) as f32],
                    confidence: CONTOUR_CONFIDENCE,
                    class_id: 0,
                })
            })
            .take(MAX_CONTOURS)
            .collect();

        tracing::debug!(
            contours = contours.len(),
            kept = detections.len(),
            "contour fallback detections"
        );
        detections
    }
}

/// Inclusive pixel extent as (x, y, width, height).
fn bounding_rect(points: &[imageproc::point::Point<u32>]) -> Option<(u32, u32, u32, u32)> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some((min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::point::Point;

    fn canvas() -> RgbImage {
        RgbImage::from_pixel(800, 600, Rgb([255, 255, 255]))
    }

    fn fill(img: &mut RgbImage, x1: u32, y1: u32, x2: u32, y2: u32) {
        for y in y1..y2 {
            for x in x1..x2 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
    }

    #[test]
    fn blank_image_has_no_contours() {
        assert!(ContourDetector::new().detect(&canvas()).is_empty());
    }

    #[test]
    fn filled_rectangle_yields_its_outline_box() {
        let mut img = canvas();
        fill(&mut img, 100, 100, 300, 150);
        let dets = ContourDetector::new().detect(&img);
        assert_eq!(dets.len(), 1);
        let [x1, y1, x2, y2] = dets[0].bbox;
        assert!((x1 - 100.0).abs() <= 3.0 && (x2 - 300.0).abs() <= 3.0);
        assert!((y1 - 100.0).abs() <= 3.0 && (y2 - 150.0).abs() <= 3.0);
        assert_eq!(dets[0].confidence, CONTOUR_CONFIDENCE);
    }

    #[test]
    fn small_shapes_are_discarded() {
        let mut img = canvas();
        fill(&mut img, 100, 100, 110, 110);
        fill(&mut img, 200, 100, 400, 108);
        assert!(ContourDetector::new().detect(&img).is_empty());
    }

    #[test]
    fn survivors_are_capped() {
        let mut img = RgbImage::from_pixel(1000, 800, Rgb([255, 255, 255]));
        // 8 × 7 grid of 40 px squares
        for row in 0..7 {
            for col in 0..8 {
                let x = 20 + col * 120;
                let y = 20 + row * 110;
                fill(&mut img, x, y, x + 40, y + 40);
            }
        }
        let dets = ContourDetector::new().detect(&img);
        assert_eq!(dets.len(), MAX_CONTOURS);
    }

    #[test]
    fn bounding_rect_is_inclusive() {
        let pts = [Point::new(3u32, 4u32), Point::new(7, 4), Point::new(5, 9)];
        assert_eq!(bounding_rect(&pts), Some((3, 4, 5, 6)));
        assert_eq!(bounding_rect(&[]), None);
    }
}
