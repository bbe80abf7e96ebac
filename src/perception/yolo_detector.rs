/// ONNX YOLOv8 inference for UI element detection.
///
/// Loads the icon-detection export and returns pixel-space boxes sorted by
/// descending confidence. Absent or unloadable weights leave the detector
/// disabled; the pipeline then falls back to contour detection.
use crate::config::Device;
use crate::errors::{ParserError, ParserResult};
use crate::perception::traits::ElementDetector;
use crate::perception::types::RawDetection;

use image::RgbImage;
use ndarray::Array4;
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

/// Letterbox parameters needed to map boxes back to the source image.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    pad_x: f32,
    pad_y: f32,
    scale: f32,
}

pub struct YoloDetector {
    session: Session,
    input_size: u32,
    max_detections: usize,
}

impl YoloDetector {
    /// `None` when the weights are missing or fail to load.
    pub fn try_new(
        model_path: &Path,
        device: Device,
        input_size: u32,
        max_detections: usize,
    ) -> Option<Self> {
        if !model_path.exists() {
            tracing::warn!(path = %model_path.display(), "YOLO model not found, detection disabled");
            return None;
        }
        match Self::build(model_path, device, input_size, max_detections) {
            Ok(det) => {
                tracing::info!(path = %model_path.display(), ?device, "YOLO detector loaded");
                Some(det)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load YOLO model");
                None
            }
        }
    }

    fn build(
        model_path: &Path,
        device: Device,
        input_size: u32,
        max_detections: usize,
    ) -> ParserResult<Self> {
        let mut builder = Session::builder()
            .map_err(|e| ParserError::Perception(format!("ort session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ParserError::Perception(format!("ort opt-level: {e}")))?;
        if device == Device::Cuda {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .map_err(|e| ParserError::Perception(format!("ort cuda provider: {e}")))?;
        }
        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| ParserError::Perception(format!("ort load model: {e}")))?;

        Ok(Self {
            session,
            input_size,
            max_detections,
        })
    }
}

impl ElementDetector for YoloDetector {
    fn detect(
        &mut self,
        image: &RgbImage,
        confidence_threshold: f32,
        iou_threshold: f32,
    ) -> ParserResult<Vec<RawDetection>> {
        let (orig_w, orig_h) = image.dimensions();
        if orig_w == 0 || orig_h == 0 {
            return Err(ParserError::InvalidInput("image has zero size".into()));
        }

        let (input_tensor, letterbox) = letterbox_tensor(image, self.input_size);

        let input_value = Tensor::from_array(input_tensor)
            .map_err(|e| ParserError::Perception(format!("ort tensor: {e}")))?;

        let output_owned = {
            let outputs = self
                .session
                .run(ort::inputs![input_value])
                .map_err(|e| ParserError::Perception(format!("ort run: {e}")))?;

            outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| ParserError::Perception(format!("extract tensor: {e}")))?
                .to_owned()
        };

        let candidates = decode_predictions(
            &output_owned.view(),
            (orig_w, orig_h),
            letterbox,
            confidence_threshold,
        )?;
        let mut kept = nms(candidates, iou_threshold);
        kept.truncate(self.max_detections);
        tracing::debug!(count = kept.len(), "YOLO detections");
        Ok(kept)
    }
}

fn letterbox_tensor(img: &RgbImage, size: u32) -> (Array4<f32>, Letterbox) {
    let side = size as f32;
    let scale = (side / img.width() as f32).min(side / img.height() as f32);
    let fit = |v: u32| ((v as f32 * scale).round() as u32).clamp(1, size);
    let (fit_w, fit_h) = (fit(img.width()), fit(img.height()));
    let lb = Letterbox {
        pad_x: (size - fit_w) as f32 / 2.0,
        pad_y: (size - fit_h) as f32 / 2.0,
        scale,
    };

    let resized = image::imageops::resize(img, fit_w, fit_h, image::imageops::FilterType::CatmullRom);
    let mut padded = RgbImage::from_pixel(size, size, image::Rgb([114, 114, 114]));
    image::imageops::overlay(
        &mut padded,
        &resized,
        lb.pad_x.round() as i64,
        lb.pad_y.round() as i64,
    );

    // NCHW, 0..1
    let n = size as usize;
    let tensor = Array4::from_shape_fn((1, 3, n, n), |(_, c, y, x)| {
        padded.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    });
    (tensor, lb)
}

impl Letterbox {
    /// Model-space centre box back to clamped source pixels.
    fn to_source(&self, [cx, cy, w, h]: [f32; 4], (src_w, src_h): (u32, u32)) -> [f32; 4] {
        let unmap = |v: f32, pad: f32, limit: u32| ((v - pad) / self.scale).clamp(0.0, limit as f32);
        [
            unmap(cx - w / 2.0, self.pad_x, src_w),
            unmap(cy - h / 2.0, self.pad_y, src_h),
            unmap(cx + w / 2.0, self.pad_x, src_w),
            unmap(cy + h / 2.0, self.pad_y, src_h),
        ]
    }
}

/// YOLOv8 head layout `[1, 4 + classes, proposals]`; rows 0..4 are the
/// centre box in letterboxed input space, the rest per-class scores.
fn decode_predictions(
    output: &ndarray::ArrayViewD<f32>,
    source_size: (u32, u32),
    lb: Letterbox,
    conf_threshold: f32,
) -> ParserResult<Vec<RawDetection>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] < 1 || shape[1] < 5 {
        return Err(ParserError::Perception(format!(
            "YOLO head has shape {shape:?}, expected [1, 4 + classes, proposals]"
        )));
    }
    let (rows, proposals) = (shape[1], shape[2]);
    let at = |row: usize, p: usize| output[[0, row, p]];

    let detections = (0..proposals)
        .filter_map(|p| {
            let (class_id, score) = (4..rows)
                .map(|row| (row - 4, at(row, p)))
                .fold((0, f32::MIN), |best, cand| if cand.1 > best.1 { cand } else { best });
            (score >= conf_threshold).then(|| RawDetection {
                bbox: lb.to_source([at(0, p), at(1, p), at(2, p), at(3, p)], source_size),
                confidence: score,
                class_id,
            })
        })
        .collect();
    Ok(detections)
}

/// Greedy per-class suppression; survivors in descending confidence.
fn nms(mut candidates: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::with_capacity(candidates.len());
    for cand in candidates {
        let overlaps = kept
            .iter()
            .any(|k| k.class_id == cand.class_id && iou(&k.bbox, &cand.bbox) > iou_threshold);
        if !overlaps {
            kept.push(cand);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let overlap_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let overlap_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = overlap_w * overlap_h;
    let union = area(a) + area(b) - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
