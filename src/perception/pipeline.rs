/// Screen parsing pipeline: detector or contour fallback, then classification,
/// captioning, bucketing and layout analysis behind one service context.
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use image::RgbImage;

use crate::config::ModelConfig;
use crate::errors::{ParserError, ParserResult};
use crate::perception::annotator;
use crate::perception::assembler::{ClassificationPolicy, ElementAssembler};
use crate::perception::captioner::{CaptionConfig, OnnxCaptioner};
use crate::perception::contour::ContourDetector;
use crate::perception::layout::analyze_layout;
use crate::perception::traits::{Captioner, ElementDetector};
use crate::perception::types::{DetectionSet, ParseResult, RawDetection};
use crate::perception::yolo_detector::YoloDetector;

/// Outcome of the trained-detector stage.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorResult {
    Detected(Vec<RawDetection>),
    /// No detector, or nothing above the confidence threshold. Triggers the
    /// contour fallback, even when the detector itself is healthy.
    Empty,
}

/// Long-lived model handles plus inference settings. One per process,
/// shared by reference; each model is serialised behind its own lock.
pub struct ScreenParser {
    config: ModelConfig,
    detector: Mutex<Option<Box<dyn ElementDetector>>>,
    captioner: Mutex<Option<Box<dyn Captioner>>>,
    contour: ContourDetector,
    // Mirrors of the handle state, readable while a request holds a lock.
    detector_present: AtomicBool,
    captioner_present: AtomicBool,
}

impl ScreenParser {
    /// Load both models once. Either may come up absent; the parser then
    /// runs degraded rather than failing.
    pub fn init(config: ModelConfig) -> Self {
        tracing::info!(device = ?config.device, "initializing screen parser");
        let c = &config.configs;
        let detector = YoloDetector::try_new(
            &config.yolo_onnx_path(),
            config.device,
            c.input_size,
            c.max_detections,
        )
        .map(|d| Box::new(d) as Box<dyn ElementDetector>);
        let captioner = OnnxCaptioner::try_new(
            Path::new(&config.florence_model),
            config.device,
            CaptionConfig::default(),
        )
        .map(|c| Box::new(c) as Box<dyn Captioner>);
        Self::with_components(config, detector, captioner)
    }

    /// Assemble from already-constructed components.
    pub fn with_components(
        config: ModelConfig,
        detector: Option<Box<dyn ElementDetector>>,
        captioner: Option<Box<dyn Captioner>>,
    ) -> Self {
        tracing::info!(
            detector = detector.is_some(),
            captioner = captioner.is_some(),
            "screen parser ready"
        );
        Self {
            config,
            detector_present: AtomicBool::new(detector.is_some()),
            captioner_present: AtomicBool::new(captioner.is_some()),
            detector: Mutex::new(detector),
            captioner: Mutex::new(captioner),
            contour: ContourDetector::new(),
        }
    }

    /// Release model handles. Later calls run degraded.
    pub fn teardown(&self) {
        self.detector_present.store(false, Ordering::SeqCst);
        self.captioner_present.store(false, Ordering::SeqCst);
        recover(&self.detector, &self.detector_present, "detector").take();
        recover(&self.captioner, &self.captioner_present, "captioner").take();
        tracing::info!("screen parser models released");
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn detector_loaded(&self) -> bool {
        self.detector_present.load(Ordering::SeqCst)
    }

    pub fn captioner_loaded(&self) -> bool {
        self.captioner_present.load(Ordering::SeqCst)
    }

    /// Trained detector stage, confidence-filtered.
    pub fn run_detector(&self, image: &RgbImage) -> ParserResult<DetectorResult> {
        let conf = self.config.configs.confidence_threshold;
        let iou = self.config.configs.iou_threshold;

        let raw = {
            let mut guard = recover(&self.detector, &self.detector_present, "detector");
            match guard.as_mut() {
                Some(detector) => detector.detect(image, conf, iou)?,
                None => return Ok(DetectorResult::Empty),
            }
        };

        let kept: Vec<RawDetection> = raw.into_iter().filter(|d| d.confidence >= conf).collect();
        if kept.is_empty() {
            Ok(DetectorResult::Empty)
        } else {
            Ok(DetectorResult::Detected(kept))
        }
    }

    /// Detect, classify, caption and bucket the elements of `image`.
    pub fn detect_elements(&self, image: &RgbImage) -> ParserResult<DetectionSet> {
        match self.run_detector(image)? {
            DetectorResult::Detected(raws) => {
                let mut guard = recover(&self.captioner, &self.captioner_present, "captioner");
                let set = ElementAssembler::new(image)
                    .with_captioner(guard.as_deref_mut())
                    .assemble(&raws);
                tracing::debug!(count = set.len(), "detector elements assembled");
                Ok(set)
            }
            DetectorResult::Empty => {
                tracing::info!("no detector elements, falling back to contour detection");
                let raws = self.contour.detect(image);
                Ok(ElementAssembler::new(image)
                    .with_policy(ClassificationPolicy::ContourGeometry)
                    .assemble(&raws))
            }
        }
    }

    /// [`detect_elements`](Self::detect_elements) on an image file.
    pub fn detect_file(&self, image_path: &Path) -> ParserResult<DetectionSet> {
        let image = load_rgb(image_path)?;
        self.detect_elements(&image)
    }

    /// Full parse: elements, summary counts, layout and, if requested, an
    /// annotated image written next to the input.
    pub fn parse_screen(&self, image_path: &Path, visualize: bool) -> ParserResult<ParseResult> {
        let image = load_rgb(image_path)?;
        let elements = self.detect_elements(&image)?;
        let summary = elements.summary();
        let layout = analyze_layout(elements.all_elements());

        let visualization = if visualize {
            let out = annotator::save_annotated(&image, &elements, image_path)?;
            Some(out.to_string_lossy().into_owned())
        } else {
            None
        };

        tracing::info!(
            path = %image_path.display(),
            total = summary.total_elements,
            layout = ?layout.layout_type,
            "screen parsed"
        );

        Ok(ParseResult {
            image_path: image_path.to_string_lossy().into_owned(),
            summary,
            elements,
            layout,
            visualization,
        })
    }
}

fn load_rgb(path: &Path) -> ParserResult<RgbImage> {
    let img = image::open(path)?;
    if img.width() == 0 || img.height() == 0 {
        return Err(ParserError::InvalidInput(format!(
            "{} has zero size",
            path.display()
        )));
    }
    Ok(img.to_rgb8())
}

/// Lock a model slot. A slot poisoned by a panicking model is emptied, so
/// later requests run degraded instead of failing on the lock.
fn recover<'a, T: ?Sized>(
    slot: &'a Mutex<Option<Box<T>>>,
    present: &AtomicBool,
    what: &str,
) -> MutexGuard<'a, Option<Box<T>>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(model = what, "model panicked in an earlier request, disabling it");
            slot.clear_poison();
            let mut guard = poisoned.into_inner();
            *guard = None;
            present.store(false, Ordering::SeqCst);
            guard
        }
    }
}
