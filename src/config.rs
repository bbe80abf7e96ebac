use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{ParserError, ParserResult};

/// Model provisioning document (`models/model_config.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub device: Device,
    #[serde(default = "default_yolo_model")]
    pub yolo_model: String,
    #[serde(default = "default_florence_model")]
    pub florence_model: String,
    #[serde(default)]
    pub configs: InferenceConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cuda,
    #[default]
    Cpu,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    /// Upper bound on detections kept after NMS.
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,
    /// Square detector input side in pixels.
    #[serde(default = "default_input_size")]
    pub input_size: u32,
}

fn default_yolo_model() -> String {
    "models/omniparser/icon_detect/model.onnx".to_string()
}

fn default_florence_model() -> String {
    "models/florence".to_string()
}

fn default_confidence_threshold() -> f32 {
    0.3
}

fn default_iou_threshold() -> f32 {
    0.45
}

fn default_max_detections() -> usize {
    100
}

fn default_input_size() -> u32 {
    640
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
            input_size: default_input_size(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            device: Device::default(),
            yolo_model: default_yolo_model(),
            florence_model: default_florence_model(),
            configs: InferenceConfig::default(),
        }
    }
}

impl ModelConfig {
    /// Detector weights as an ONNX export. A `.pt` path (as written by the
    /// setup script) resolves to the sibling `.onnx` file.
    pub fn yolo_onnx_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.yolo_model);
        match path.extension().and_then(|e| e.to_str()) {
            Some("pt") => path.with_extension("onnx"),
            _ => path,
        }
    }

    fn validate(&self) -> ParserResult<()> {
        let c = &self.configs;
        if !(0.0..=1.0).contains(&c.confidence_threshold) {
            return Err(ParserError::Config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                c.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&c.iou_threshold) {
            return Err(ParserError::Config(format!(
                "iou_threshold must be within [0, 1], got {}",
                c.iou_threshold
            )));
        }
        if c.input_size == 0 || c.input_size % 32 != 0 {
            return Err(ParserError::Config(format!(
                "input_size must be a positive multiple of 32, got {}",
                c.input_size
            )));
        }
        Ok(())
    }
}

pub fn parse_model_config(content: &str) -> ParserResult<ModelConfig> {
    let config: ModelConfig = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
}

pub fn load_model_config(path: &Path) -> ParserResult<ModelConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ParserError::Config(format!("cannot read {}: {e}", path.display()))
    })?;
    let config = parse_model_config(&content)?;
    tracing::info!(
        path = %path.display(),
        device = ?config.device,
        yolo = %config.yolo_model,
        "model config loaded"
    );
    Ok(config)
}

/// HTTP server settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub model_config_path: PathBuf,
    /// Staging area for uploads and annotated images.
    pub output_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5001".to_string(),
            model_config_path: PathBuf::from("models/model_config.json"),
            output_dir: PathBuf::from("outputs"),
            max_upload_bytes: 32 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> ParserResult<Self> {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("SCREENPARSE_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(path) = std::env::var("SCREENPARSE_MODEL_CONFIG") {
            config.model_config_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("SCREENPARSE_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = std::env::var("SCREENPARSE_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = raw.parse().map_err(|_| {
                ParserError::Config(format!("SCREENPARSE_MAX_UPLOAD_BYTES is not a number: {raw}"))
            })?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_setup_script_document() {
        let json = r#"{
            "yolo_model": "models/omniparser/icon_detect/model.pt",
            "florence_model": "models/florence",
            "device": "cuda",
            "configs": {
                "confidence_threshold": 0.3,
                "iou_threshold": 0.45,
                "max_detections": 100,
                "input_size": 640
            }
        }"#;
        let config = parse_model_config(json).unwrap();
        assert_eq!(config.device, Device::Cuda);
        assert_eq!(config.configs.max_detections, 100);
        assert_eq!(
            config.yolo_onnx_path(),
            PathBuf::from("models/omniparser/icon_detect/model.onnx")
        );
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config = parse_model_config("{}").unwrap();
        assert_eq!(config.device, Device::Cpu);
        assert_eq!(config.configs.confidence_threshold, 0.3);
        assert_eq!(config.configs.iou_threshold, 0.45);
        assert_eq!(config.configs.input_size, 640);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err = parse_model_config(r#"{"configs": {"confidence_threshold": 1.5}}"#)
            .unwrap_err();
        assert!(matches!(err, ParserError::Config(_)));
    }

    #[test]
    fn rejects_unknown_device() {
        assert!(parse_model_config(r#"{"device": "tpu"}"#).is_err());
    }
}
