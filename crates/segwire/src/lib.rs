//! segwire: detection post-processing for segmentation models.
//!
//! Turns the raw numeric outputs of an instance-segmentation model into an
//! ordered set of detections in the caller's image space, and packs them into
//! a flat wire buffer a host runtime consumes through a plain-data callback.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────┐   ┌──────────┐   ┌────────┐   ┌─────────┐
//! │ RawOutputs │──▶│ Decoder │──▶│ Suppress │──▶│ Mapper │──▶│ Encoder │──▶ callback
//! │ (bytes)    │   │ (+masks)│   │ (NMS)    │   │ (clamp)│   │ (wire)  │
//! └────────────┘   └─────────┘   └──────────┘   └────────┘   └─────────┘
//! ```
//!
//! ## Memory Ownership
//!
//! - `segwire_engine_new()` allocates on Rust heap, caller owns pointer
//! - `segwire_engine_free()` must be called to deallocate
//! - The `WireBufferC` passed to the callback borrows Rust memory and is
//!   valid only until the callback returns; copy anything you keep
//! - Error strings in `SegwireStatusC` are freed with `segwire_status_free()`

pub mod backend;
pub mod config;
pub mod decode;
pub mod error;
pub mod extract;
pub mod ffi;
pub mod logging;
pub mod mapper;
pub mod pipeline;
pub mod raw;
pub mod suppress;
pub mod types;
pub mod wire;
pub mod worker;

// Re-export main types
pub use backend::{InferenceBackend, ModelInput};
pub use config::{OutputNames, PipelineConfig};
pub use error::{ConfigError, DecodeError, PipelineError, Result, WireError};
pub use extract::{ContourExtractor, ImageprocExtractor, MaskGeometry};
pub use pipeline::{FrameOutput, Pipeline};
pub use raw::{ElementType, MaskLayout, RawOutputSet, RawOutputs, RawTensor};
pub use types::{
    BoundingBox, Contour, Detection, FrameStats, MappedDetection, PixelBox, PixelPoint, Point,
    ScalingContext,
};
pub use wire::WireBuffer;
pub use worker::{FrameRequest, FrameTicket, FrameWorker, QueuePolicy};

// Re-export FFI types for C consumers
pub use ffi::{FrameStatsC, RawTensorC, SegwireStatusC, WireBufferC};
