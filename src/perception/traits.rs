use image::RgbImage;

use crate::errors::ParserResult;
use crate::perception::types::RawDetection;

/// Trained object detector producing pixel-space boxes.
/// Implemented by the ONNX YOLO detector; tests substitute fakes.
pub trait ElementDetector: Send {
    fn detect(
        &mut self,
        image: &RgbImage,
        confidence_threshold: f32,
        iou_threshold: f32,
    ) -> ParserResult<Vec<RawDetection>>;
}

/// Short natural-language label for an element crop.
pub trait Captioner: Send {
    fn caption(&mut self, crop: &RgbImage) -> ParserResult<String>;
}
