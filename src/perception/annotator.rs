/// Draw detected elements onto a copy of the screenshot.
///
/// Each element gets a colour-coded rectangle, an `"{id}: {label}"` tag
/// above it and its confidence below it.
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

use crate::errors::{ParserError, ParserResult};
use crate::perception::types::{DetectionSet, ElementType};

const LABEL_MAX_CHARS: usize = 20;

/// Colour per element type.
fn element_colour(et: ElementType) -> [u8; 3] {
    match et {
        ElementType::Icon => [0xFF, 0x6B, 0x6B],
        ElementType::Button => [0x4E, 0xCD, 0xC4],
        ElementType::Text => [0x45, 0xB7, 0xD1],
        ElementType::Sidebar | ElementType::Unknown => [0x95, 0xA5, 0xA6],
    }
}

/// `shots/login.png` → `shots/login_annotated.png`.
pub fn annotated_path(image_path: &Path) -> PathBuf {
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match image_path.extension() {
        Some(ext) => format!("{stem}_annotated.{}", ext.to_string_lossy()),
        None => format!("{stem}_annotated.png"),
    };
    image_path.with_file_name(name)
}

/// Return an annotated copy of `image`.
pub fn annotate(image: &RgbImage, detections: &DetectionSet) -> RgbImage {
    let mut canvas = image.clone();
    let (w, _) = canvas.dimensions();

    // 2× text on high-res screens (> 1600 px wide)
    let scale: u32 = if w > 1600 { 2 } else { 1 };
    let thickness: i32 = 2;
    let text_h = (5 * scale + 4 * scale) as i32;

    for elem in detections.all_elements() {
        let [x1, y1, x2, y2] = elem.bbox;
        let col = element_colour(elem.element_type);

        draw_rect(&mut canvas, x1, y1, x2, y2, col, thickness);

        let short: String = elem.label.chars().take(LABEL_MAX_CHARS).collect();
        let tag = format!("{}: {}", elem.id, short);
        draw_tag(&mut canvas, x1, (y1 - text_h).max(0), &tag, col, scale);

        let conf = format!("{:.2}", elem.confidence);
        draw_text(&mut canvas, x1, y2 + 5, &conf, col, scale);
    }
    canvas
}

/// Annotate and save next to `image_path`; returns the written path. The
/// file outlives the request and is never removed here.
pub fn save_annotated(
    image: &RgbImage,
    detections: &DetectionSet,
    image_path: &Path,
) -> ParserResult<PathBuf> {
    let out_path = annotated_path(image_path);
    annotate(image, detections)
        .save(&out_path)
        .map_err(|e| ParserError::Perception(format!("save {}: {e}", out_path.display())))?;
    tracing::debug!(path = %out_path.display(), "visualization written");
    Ok(out_path)
}

// ── Drawing primitives ──────────────────────────────────────────────────────

fn draw_rect(canvas: &mut RgbImage, x1: i32, y1: i32, x2: i32, y2: i32, col: [u8; 3], thickness: i32) {
    for t in 0..thickness {
        for x in x1..=x2 {
            put(canvas, x, y1 + t, col);
            put(canvas, x, y2 - t, col);
        }
        for y in y1..=y2 {
            put(canvas, x1 + t, y, col);
            put(canvas, x2 - t, y, col);
        }
    }
}

/// Filled tag in the element colour with white text.
fn draw_tag(canvas: &mut RgbImage, x: i32, y: i32, text: &str, col: [u8; 3], scale: u32) {
    let pad = 2 * scale as i32;
    let step = (5 * scale + scale) as i32;
    let tag_w = text.chars().count() as i32 * step + pad * 2;
    let tag_h = 5 * scale as i32 + pad * 2;
    for dy in 0..tag_h {
        for dx in 0..tag_w {
            put(canvas, x + dx, y + dy, col);
        }
    }
    draw_text(canvas, x + pad, y + pad, text, [255, 255, 255], scale);
}

fn draw_text(canvas: &mut RgbImage, x: i32, y: i32, text: &str, col: [u8; 3], scale: u32) {
    let step = (5 * scale + scale) as i32;
    for (i, c) in text.to_uppercase().chars().enumerate() {
        draw_glyph(canvas, c, x + i as i32 * step, y, col, scale);
    }
}

fn draw_glyph(canvas: &mut RgbImage, c: char, px: i32, py: i32, col: [u8; 3], scale: u32) {
    let Some(glyph) = glyph_for(c) else { return };
    let s = scale as i32;
    for (row, bits) in glyph.iter().enumerate() {
        for bit in 0..5i32 {
            if (bits >> (4 - bit)) & 1 == 0 {
                continue;
            }
            for sy in 0..s {
                for sx in 0..s {
                    put(canvas, px + bit * s + sx, py + row as i32 * s + sy, col);
                }
            }
        }
    }
}

/// Bounds-checked pixel write.
fn put(canvas: &mut RgbImage, x: i32, y: i32, col: [u8; 3]) {
    let (w, h) = canvas.dimensions();
    if x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h {
        canvas.put_pixel(x as u32, y as u32, Rgb(col));
    }
}

fn glyph_for(c: char) -> Option<[u8; 5]> {
    match c {
        '0'..='9' => Some(MINI_FONT[(c as u8 - b'0') as usize]),
        'A'..='Z' => Some(MINI_FONT[10 + (c as u8 - b'A') as usize]),
        ':' => Some([0b00000, 0b00100, 0b00000, 0b00100, 0b00000]),
        '_' => Some([0b00000, 0b00000, 0b00000, 0b00000, 0b11111]),
        '.' => Some([0b00000, 0b00000, 0b00000, 0b00000, 0b00100]),
        '-' => Some([0b00000, 0b00000, 0b01110, 0b00000, 0b00000]),
        _ => None,
    }
}

/// 5×5 bitmap font: digits 0-9, letters A-Z.
const MINI_FONT: [[u8; 5]; 36] = [
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110], // 0
    [0b00100, 0b01100, 0b00100, 0b00100, 0b01110], // 1
    [0b01110, 0b10001, 0b00110, 0b01000, 0b11111], // 2
    [0b11110, 0b00001, 0b00110, 0b00001, 0b11110], // 3
    [0b00110, 0b01010, 0b10010, 0b11111, 0b00010], // 4
    [0b11111, 0b10000, 0b11110, 0b00001, 0b11110], // 5
    [0b01110, 0b10000, 0b11110, 0b10001, 0b01110], // 6
    [0b11111, 0b00001, 0b00010, 0b00100, 0b00100], // 7
    [0b01110, 0b10001, 0b01110, 0b10001, 0b01110], // 8
    [0b01110, 0b10001, 0b01111, 0b00001, 0b01110], // 9
    [0b01110, 0b10001, 0b11111, 0b10001, 0b10001], // A
    [0b11110, 0b10001, 0b11110, 0b10001, 0b11110], // B
    [0b01110, 0b10000, 0b10000, 0b10000, 0b01110], // C
    [0b11100, 0b10010, 0b10001, 0b10010, 0b11100], // D
    [0b11111, 0b10000, 0b11110, 0b10000, 0b11111], // E
    [0b11111, 0b10000, 0b11110, 0b10000, 0b10000], // F
    [0b01110, 0b10000, 0b10011, 0b10001, 0b01110], // G
    [0b10001, 0b10001, 0b11111, 0b10001, 0b10001], // H
    [0b01110, 0b00100, 0b00100, 0b00100, 0b01110], // I
    [0b00111, 0b00010, 0b00010, 0b10010, 0b01100], // J
    [0b10001, 0b10010, 0b11100, 0b10010, 0b10001], // K
    [0b10000, 0b10000, 0b10000, 0b10000, 0b11111], // L
    [0b10001, 0b11011, 0b10101, 0b10001, 0b10001], // M
    [0b10001, 0b11001, 0b10101, 0b10011, 0b10001], // N
    [0b01110, 0b10001, 0b10001, 0b10001, 0b01110], // O
    [0b11110, 0b10001, 0b11110, 0b10000, 0b10000], // P
    [0b01110, 0b10001, 0b10101, 0b10010, 0b01101], // Q
    [0b11110, 0b10001, 0b11110, 0b10010, 0b10001], // R
    [0b01111, 0b10000, 0b01110, 0b00001, 0b11110], // S
    [0b11111, 0b00100, 0b00100, 0b00100, 0b00100], // T
    [0b10001, 0b10001, 0b10001, 0b10001, 0b01110], // U
    [0b10001, 0b10001, 0b10001, 0b01010, 0b00100], // V
    [0b10001, 0b10001, 0b10101, 0b11011, 0b10001], // W
    [0b10001, 0b01010, 0b00100, 0b01010, 0b10001], // X
    [0b10001, 0b01010, 0b00100, 0b00100, 0b00100], // Y
    [0b11111, 0b00010, 0b00100, 0b01000, 0b11111], // Z
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::assembler::ElementAssembler;
    use crate::perception::types::RawDetection;

    fn detections(img: &RgbImage) -> DetectionSet {
        ElementAssembler::new(img).assemble(&[
            RawDetection {
                bbox: [100.0, 100.0, 300.0, 150.0],
                confidence: 0.87,
                class_id: 0,
            },
            RawDetection {
                bbox: [400.0, 400.0, 430.0, 430.0],
                confidence: 0.5,
                class_id: 0,
            },
        ])
    }

    #[test]
    fn annotated_path_keeps_directory_and_extension() {
        assert_eq!(
            annotated_path(Path::new("/tmp/shots/login.jpg")),
            PathBuf::from("/tmp/shots/login_annotated.jpg")
        );
        assert_eq!(
            annotated_path(Path::new("capture")),
            PathBuf::from("capture_annotated.png")
        );
    }

    #[test]
    fn boxes_are_drawn_in_type_colour() {
        let img = RgbImage::from_pixel(800, 600, Rgb([0, 0, 0]));
        let set = detections(&img);
        let out = annotate(&img, &set);
        // button outline, left edge midway down
        assert_eq!(out.get_pixel(100, 125).0, element_colour(ElementType::Button));
        // icon outline
        assert_eq!(out.get_pixel(415, 430).0, element_colour(ElementType::Icon));
        // interior untouched
        assert_eq!(out.get_pixel(200, 130).0, [0, 0, 0]);
        // source untouched
        assert_eq!(img.get_pixel(100, 125).0, [0, 0, 0]);
    }

    #[test]
    fn drawing_near_edges_does_not_panic() {
        let img = RgbImage::from_pixel(40, 30, Rgb([0, 0, 0]));
        let set = ElementAssembler::new(&img).assemble(&[RawDetection {
            bbox: [0.0, 0.0, 40.0, 30.0],
            confidence: 0.9,
            class_id: 0,
        }]);
        let out = annotate(&img, &set);
        assert_eq!(out.dimensions(), (40, 30));
    }

    #[test]
    fn save_writes_sibling_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("screen.png");
        let img = RgbImage::from_pixel(800, 600, Rgb([255, 255, 255]));
        img.save(&src).unwrap();

        let out = save_annotated(&img, &detections(&img), &src).unwrap();
        assert_eq!(out, dir.path().join("screen_annotated.png"));
        let reloaded = image::open(&out).unwrap().to_rgb8();
        assert_eq!(reloaded.dimensions(), (800, 600));
    }
}
