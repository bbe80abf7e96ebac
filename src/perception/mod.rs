pub mod annotator;
pub mod assembler;
pub mod captioner;
pub mod classifier;
pub mod contour;
pub mod layout;
pub mod pipeline;
pub mod traits;
pub mod types;
pub mod yolo_detector;

pub use pipeline::{DetectorResult, ScreenParser};
