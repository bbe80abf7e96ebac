/// Geometry-and-texture heuristics that type a detected box.
///
/// The thresholds are fixed policy: boxes under [`ICON_MAX_AREA`] are icons,
/// wide boxes are buttons, tall boxes are sidebars, and the remainder is
/// split on Canny edge density.
use image::RgbImage;

use crate::perception::types::ElementType;

/// Strict upper bound on icon area (px²).
pub const ICON_MAX_AREA: i64 = 2500;
/// Width/height above which a box is a button.
pub const BUTTON_MIN_ASPECT: f64 = 2.5;
/// Width/height below which a box is a sidebar.
pub const SIDEBAR_MAX_ASPECT: f64 = 0.5;
/// Mean Canny response (0/255 per pixel) above which a crop reads as text.
pub const TEXT_MIN_EDGE_DENSITY: f64 = 30.0;

pub const CANNY_LOW: f32 = 50.0;
pub const CANNY_HIGH: f32 = 150.0;

/// Type a detection from its crop and box. `_class_id` is the detector's
/// class and does not influence the heuristic.
pub fn classify_element(crop: &RgbImage, bbox: [i32; 4], _class_id: usize) -> ElementType {
    if crop.width() == 0 || crop.height() == 0 {
        return ElementType::Unknown;
    }

    let (area, aspect_ratio) = geometry(bbox);

    if area < ICON_MAX_AREA {
        ElementType::Icon
    } else if aspect_ratio > BUTTON_MIN_ASPECT {
        ElementType::Button
    } else if aspect_ratio < SIDEBAR_MAX_ASPECT {
        ElementType::Sidebar
    } else if edge_density(crop) > TEXT_MIN_EDGE_DENSITY {
        ElementType::Text
    } else {
        ElementType::Button
    }
}

/// Three-way split used by the contour fallback; never inspects texture.
pub fn classify_contour(width: u32, height: u32) -> ElementType {
    let area = width as i64 * height as i64;
    let aspect_ratio = if height > 0 {
        width as f64 / height as f64
    } else {
        1.0
    };

    if area < ICON_MAX_AREA {
        ElementType::Icon
    } else if aspect_ratio > BUTTON_MIN_ASPECT {
        ElementType::Button
    } else {
        ElementType::Text
    }
}

/// Sum of the Canny edge map divided by the pixel count.
pub fn edge_density(crop: &RgbImage) -> f64 {
    let pixels = crop.width() as u64 * crop.height() as u64;
    if pixels == 0 {
        return 0.0;
    }
    let gray = image::imageops::grayscale(crop);
    let edges = imageproc::edges::canny(&gray, CANNY_LOW, CANNY_HIGH);
    let sum: u64 = edges.pixels().map(|p| p[0] as u64).sum();
    sum as f64 / pixels as f64
}

fn geometry(bbox: [i32; 4]) -> (i64, f64) {
    let [x1, y1, x2, y2] = bbox;
    let w = (x2 - x1) as i64;
    let h = (y2 - y1) as i64;
    let aspect_ratio = if h > 0 { w as f64 / h as f64 } else { 1.0 };
    (w * h, aspect_ratio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([240, 240, 240]))
    }

    /// Vertical black/white stripes, 4 px wide.
    fn striped(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, _| {
            if (x / 4) % 2 == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    fn classify_box(w: i32, h: i32, crop: &RgbImage) -> ElementType {
        classify_element(crop, [10, 10, 10 + w, 10 + h], 0)
    }

    #[test]
    fn empty_crop_is_unknown() {
        let crop = RgbImage::new(0, 0);
        assert_eq!(classify_element(&crop, [5, 5, 5, 5], 0), ElementType::Unknown);
    }

    #[test]
    fn small_area_is_icon_regardless_of_aspect() {
        let crop = solid(10, 10);
        assert_eq!(classify_box(49, 51, &crop), ElementType::Icon); // 2499
        assert_eq!(classify_box(200, 12, &crop), ElementType::Icon); // wide, 2400
        assert_eq!(classify_box(10, 240, &crop), ElementType::Icon); // tall, 2400
    }

    #[test]
    fn area_exactly_at_icon_bound_is_not_icon() {
        let crop = solid(50, 50);
        assert_eq!(classify_box(50, 50, &crop), ElementType::Button);
    }

    #[test]
    fn wide_box_is_button() {
        let crop = solid(200, 50);
        assert_eq!(classify_box(200, 50, &crop), ElementType::Button);
        assert_eq!(classify_box(251, 100, &crop), ElementType::Button);
    }

    #[test]
    fn aspect_exactly_at_button_bound_falls_through_to_texture() {
        assert_eq!(classify_box(250, 100, &solid(250, 100)), ElementType::Button);
        assert_eq!(classify_box(250, 100, &striped(250, 100)), ElementType::Text);
    }

    #[test]
    fn tall_box_is_sidebar() {
        let crop = striped(60, 400);
        assert_eq!(classify_box(60, 400, &crop), ElementType::Sidebar);
        assert_eq!(classify_box(99, 200, &crop), ElementType::Sidebar);
    }

    #[test]
    fn aspect_exactly_at_sidebar_bound_falls_through_to_texture() {
        assert_eq!(classify_box(100, 200, &solid(100, 200)), ElementType::Button);
    }

    #[test]
    fn textured_square_is_text_and_flat_square_is_button() {
        assert_eq!(classify_box(100, 100, &striped(100, 100)), ElementType::Text);
        assert_eq!(classify_box(100, 100, &solid(100, 100)), ElementType::Button);
    }

    #[test]
    fn edge_density_of_flat_crop_is_zero() {
        assert_eq!(edge_density(&solid(64, 64)), 0.0);
        assert!(edge_density(&striped(64, 64)) > TEXT_MIN_EDGE_DENSITY);
    }

    #[test]
    fn degenerate_height_uses_unit_aspect() {
        assert_eq!(geometry([0, 0, 80, 0]), (0, 1.0));
    }

    #[test]
    fn contour_split_is_three_way() {
        assert_eq!(classify_contour(49, 51), ElementType::Icon);
        assert_eq!(classify_contour(50, 50), ElementType::Text);
        assert_eq!(classify_contour(201, 51), ElementType::Button);
        // no sidebar in the fallback
        assert_eq!(classify_contour(30, 300), ElementType::Text);
    }

    #[test]
    fn policy_constants_are_pinned() {
        assert_eq!(ICON_MAX_AREA, 2500);
        assert_eq!(BUTTON_MIN_ASPECT, 2.5);
        assert_eq!(SIDEBAR_MAX_ASPECT, 0.5);
        assert_eq!(TEXT_MIN_EDGE_DENSITY, 30.0);
    }
}
