/// Element captioning via an encoder–decoder vision-language model exported
/// to ONNX, plus the adapter that keeps captioning failures local.
///
/// The model directory holds `model.onnx` (inputs `pixel_values`,
/// `input_ids`, `attention_mask`; output `logits`) and `tokenizer.json`.
use std::path::Path;

use image::RgbImage;
use ndarray::{Array2, Array4};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use crate::config::Device;
use crate::errors::{ParserError, ParserResult};
use crate::perception::traits::Captioner;

pub const CAPTION_PROMPT: &str = "<CAPTION>";
/// Label used when captioning fails.
pub const FAILED_CAPTION: &str = "element";
/// Label used when the model produces no text.
pub const EMPTY_CAPTION: &str = "UI element";

#[derive(Debug, Clone)]
pub struct CaptionConfig {
    /// Square model input side.
    pub input_size: u32,
    pub max_new_tokens: usize,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            input_size: 768,
            max_new_tokens: 20,
        }
    }
}

pub struct OnnxCaptioner {
    session: Session,
    tokenizer: Tokenizer,
    config: CaptionConfig,
    bos_token_id: u32,
    eos_token_id: u32,
}

impl OnnxCaptioner {
    /// Load from a model directory. Returns `None` (captioning disabled) if
    /// the files are missing or fail to load.
    pub fn try_new(model_dir: &Path, device: Device, config: CaptionConfig) -> Option<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");
        if !model_path.exists() || !tokenizer_path.exists() {
            warn!(dir = %model_dir.display(), "caption model not found, caption generation disabled");
            return None;
        }
        match Self::build(&model_path, &tokenizer_path, device, config) {
            Ok(c) => {
                info!(dir = %model_dir.display(), ?device, "caption model loaded");
                Some(c)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load caption model");
                None
            }
        }
    }

    fn build(
        model_path: &Path,
        tokenizer_path: &Path,
        device: Device,
        config: CaptionConfig,
    ) -> ParserResult<Self> {
        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| ParserError::Caption(format!("load tokenizer: {e}")))?;

        let mut builder = Session::builder()
            .map_err(|e| ParserError::Caption(format!("ort session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ParserError::Caption(format!("ort opt-level: {e}")))?;
        if device == Device::Cuda {
            builder = builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .map_err(|e| ParserError::Caption(format!("ort cuda provider: {e}")))?;
        }
        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| ParserError::Caption(format!("ort load model: {e}")))?;

        // BART-style vocabulary
        let bos_token_id = tokenizer.token_to_id("<s>").unwrap_or(0);
        let eos_token_id = tokenizer.token_to_id("</s>").unwrap_or(2);
        debug!(bos = bos_token_id, eos = eos_token_id, "caption special tokens");

        Ok(Self {
            session,
            tokenizer,
            config,
            bos_token_id,
            eos_token_id,
        })
    }

    /// Resize to the model input and apply ImageNet normalisation (NCHW).
    fn preprocess(&self, crop: &RgbImage) -> Array4<f32> {
        const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
        const STD: [f32; 3] = [0.229, 0.224, 0.225];

        let size = self.config.input_size;
        let resized =
            image::imageops::resize(crop, size, size, image::imageops::FilterType::Triangle);

        let mut array = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, p) in resized.enumerate_pixels() {
            for c in 0..3 {
                array[[0, c, y as usize, x as usize]] =
                    (p[c] as f32 / 255.0 - MEAN[c]) / STD[c];
            }
        }
        array
    }

    /// Greedy autoregressive decoding seeded with the task prompt.
    fn generate(&mut self, pixel_values: Array4<f32>) -> ParserResult<String> {
        let prompt = self
            .tokenizer
            .encode(CAPTION_PROMPT, false)
            .map_err(|e| ParserError::Caption(format!("encode prompt: {e}")))?;
        let mut input_ids: Vec<i64> = std::iter::once(self.bos_token_id)
            .chain(prompt.get_ids().iter().copied())
            .map(i64::from)
            .collect();
        let prefix_len = input_ids.len();

        for _ in 0..self.config.max_new_tokens {
            let seq_len = input_ids.len();
            let ids = Array2::from_shape_vec((1, seq_len), input_ids.clone())
                .map_err(|e| ParserError::Caption(format!("input_ids shape: {e}")))?;
            let mask = Array2::<i64>::ones((1, seq_len));

            let pixel_tensor = Tensor::from_array(pixel_values.clone())
                .map_err(|e| ParserError::Caption(format!("pixel tensor: {e}")))?;
            let ids_tensor = Tensor::from_array(ids)
                .map_err(|e| ParserError::Caption(format!("input_ids tensor: {e}")))?;
            let mask_tensor = Tensor::from_array(mask)
                .map_err(|e| ParserError::Caption(format!("attention_mask tensor: {e}")))?;

            let next = {
                let outputs = self
                    .session
                    .run(ort::inputs![
                        "pixel_values" => pixel_tensor,
                        "input_ids" => ids_tensor,
                        "attention_mask" => mask_tensor,
                    ])
                    .map_err(|e| ParserError::Caption(format!("ort run: {e}")))?;

                let (shape, logits) = outputs["logits"]
                    .try_extract_tensor::<f32>()
                    .map_err(|e| ParserError::Caption(format!("extract logits: {e}")))?;
                if shape.len() != 3 {
                    return Err(ParserError::Caption(format!(
                        "unexpected logits shape: {:?}",
                        shape
                    )));
                }
                let vocab = shape[2] as usize;
                let offset = (seq_len - 1) * vocab;
                let last = logits.get(offset..offset + vocab).ok_or_else(|| {
                    ParserError::Caption("logits shorter than sequence".into())
                })?;
                argmax(last)
                    .ok_or_else(|| ParserError::Caption("empty logits".into()))?
            };

            if next == self.eos_token_id as usize {
                break;
            }
            input_ids.push(next as i64);
        }

        let generated: Vec<u32> = input_ids[prefix_len..].iter().map(|&id| id as u32).collect();
        self.tokenizer
            .decode(&generated, true)
            .map_err(|e| ParserError::Caption(format!("decode: {e}")))
    }
}

impl Captioner for OnnxCaptioner {
    fn caption(&mut self, crop: &RgbImage) -> ParserResult<String> {
        let pixel_values = self.preprocess(crop);
        let text = self.generate(pixel_values)?;
        Ok(clean_caption(&text))
    }
}

fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}

/// Strip the echoed task prompt; blank output becomes [`EMPTY_CAPTION`].
pub fn clean_caption(raw: &str) -> String {
    let text = raw.replace(CAPTION_PROMPT, "");
    let text = text.trim();
    if text.is_empty() {
        EMPTY_CAPTION.to_string()
    } else {
        text.to_string()
    }
}

/// Pixel crop of `bbox`, clamped to the image.
pub fn crop_region(image: &RgbImage, bbox: [i32; 4]) -> RgbImage {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let [x1, y1, x2, y2] = bbox;
    let (cx1, cy1) = (x1.clamp(0, w), y1.clamp(0, h));
    let (cx2, cy2) = (x2.clamp(0, w), y2.clamp(0, h));
    if cx2 <= cx1 || cy2 <= cy1 {
        return RgbImage::new(0, 0);
    }
    image::imageops::crop_imm(
        image,
        cx1 as u32,
        cy1 as u32,
        (cx2 - cx1) as u32,
        (cy2 - cy1) as u32,
    )
    .to_image()
}

/// Caption one element. Never fails: a bad crop or model error is logged and
/// replaced by [`FAILED_CAPTION`].
pub fn caption_or_fallback<C: Captioner + ?Sized>(
    captioner: &mut C,
    image: &RgbImage,
    bbox: [i32; 4],
) -> String {
    let crop = crop_region(image, bbox);
    if crop.width() == 0 || crop.height() == 0 {
        warn!(?bbox, "empty crop, caption skipped");
        return FAILED_CAPTION.to_string();
    }
    match captioner.caption(&crop) {
        Ok(text) if text.trim().is_empty() => EMPTY_CAPTION.to_string(),
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, ?bbox, "Caption generation error");
            FAILED_CAPTION.to_string()
        }
    }
}
