//! Error types for the detection pipeline.

use thiserror::Error;

use crate::raw::ElementType;

/// Result type alias using [`PipelineError`].
pub type Result<T> = std::result::Result<T, PipelineError>;

/// A raw model output could not be interpreted. Fatal for the frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Required output is absent from the output set
    #[error("missing model output '{0}'")]
    MissingOutput(String),

    /// Output element type differs from what the stage reads
    #[error("output '{name}' has element type {found:?}, expected {expected}")]
    UnexpectedType {
        name: String,
        expected: &'static str,
        found: ElementType,
    },

    /// Buffer holds fewer bytes than its declared shape implies
    #[error("output '{name}' buffer is {actual} bytes, shape requires {expected}")]
    BufferTooShort {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Shape has fewer dimensions than required
    #[error("output '{name}' has rank {found}, expected at least {min}")]
    RankTooLow {
        name: String,
        min: usize,
        found: usize,
    },

    /// Shape is inconsistent with the other outputs
    #[error("output '{name}' has an unusable shape: {reason}")]
    ShapeMismatch { name: String, reason: String },
}

/// Invalid pipeline or per-call configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("confidence_threshold must be between 0.0 and 1.0, got {0}")]
    ConfidenceOutOfRange(f32),

    #[error("iou_threshold must be between 0.0 and 1.0, got {0}")]
    IouOutOfRange(f32),

    #[error("model_side must be positive, got {0}")]
    InvalidModelSide(i64),

    #[error("mask_threshold must be between 0.0 and 1.0, got {0}")]
    MaskThresholdOutOfRange(f32),

    #[error("image size must be at least 1x1, got {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },

    #[error("scale_{axis} must be finite and positive, got {value}")]
    InvalidScale { axis: char, value: f32 },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire buffer does not follow the flat layout.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("array '{name}' has {actual} values, expected {expected}")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("contour indices malformed at position {position}: {reason}")]
    MalformedIndices { position: usize, reason: &'static str },
}

/// Top-level error for a pipeline invocation.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Inference backend failure
    #[error("inference failed: {0}")]
    Backend(String),

    /// Frame rejected by a full queue under a dropping policy
    #[error("frame queue is full")]
    QueueFull,

    /// Worker is gone; no further frames can run
    #[error("frame worker has stopped")]
    WorkerStopped,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
