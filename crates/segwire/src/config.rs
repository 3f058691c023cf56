//! Pipeline configuration
//!
//! Built once when a model is loaded and immutable afterwards. Loadable from
//! JSON so host runtimes can pass a single string across the FFI boundary.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tensor names of the three raw outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputNames {
    /// Class ids, shape `[1, N]`
    pub labels: String,
    /// Boxes + confidence, shape `[1, N, 5]`
    pub boxes: String,
    /// Masks, shape `[1, N, H, W]` or `[1, H, W]`
    pub masks: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            labels: "labels".to_string(),
            boxes: "dets".to_string(),
            masks: "masks".to_string(),
        }
    }
}

/// Configuration for a detection pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Confidence threshold for detections (0.0-1.0), inclusive
    pub confidence_threshold: f32,
    /// IoU threshold for NMS (0.0-1.0)
    pub iou_threshold: f32,
    /// Run class-wise NMS; disable for models with built-in suppression
    pub suppression_enabled: bool,
    /// Side length of the square model input
    pub model_side: u32,
    /// Decode masks into contours and centroids
    pub masks_enabled: bool,
    /// Upper bound on detections kept per frame
    pub max_detections: Option<usize>,
    /// Binarization level used by the default contour extractor
    pub mask_threshold: f32,
    /// Output tensor names
    pub outputs: OutputNames,
    /// Class labels, indexed by class id
    #[serde(deserialize_with = "deserialize_labels")]
    pub labels: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
            suppression_enabled: true,
            model_side: 640,
            masks_enabled: true,
            max_detections: None,
            mask_threshold: 0.5,
            outputs: OutputNames::default(),
            labels: default_coco_labels(),
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON config; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::ConfidenceOutOfRange(self.confidence_threshold));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(ConfigError::IouOutOfRange(self.iou_threshold));
        }
        if !(0.0..=1.0).contains(&self.mask_threshold) {
            return Err(ConfigError::MaskThresholdOutOfRange(self.mask_threshold));
        }
        if self.model_side == 0 {
            return Err(ConfigError::InvalidModelSide(0));
        }
        Ok(())
    }

    /// Get label for a class ID
    pub fn label(&self, class_id: i64) -> Option<&str> {
        usize::try_from(class_id)
            .ok()
            .and_then(|idx| self.labels.get(idx))
            .map(String::as_str)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelsField {
    List(Vec<String>),
    Text(String),
}

fn deserialize_labels<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match LabelsField::deserialize(deserializer)? {
        LabelsField::List(labels) => labels,
        LabelsField::Text(text) => parse_labels(&text),
    })
}

/// Parse labels from string (newline-separated or JSON array)
pub fn parse_labels(labels_str: &str) -> Vec<String> {
    let trimmed = labels_str.trim();

    if trimmed.starts_with('[') {
        if let Ok(labels) = serde_json::from_str::<Vec<String>>(trimmed) {
            return labels;
        }
    }

    trimmed
        .lines()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Default COCO class labels
pub fn default_coco_labels() -> Vec<String> {
    [
        "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
        "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
        "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
        "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
        "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
        "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
        "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
        "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
        "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
        "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
        "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
        "toothbrush",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
