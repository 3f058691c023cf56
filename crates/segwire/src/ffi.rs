//! C-compatible FFI interface for the detection pipeline
//!
//! A host runtime feeds raw model output tensors in and receives the encoded
//! frame through a plain-data callback.
//!
//! # Memory Ownership Rules
//!
//! - `segwire_engine_new()` allocates on Rust heap, caller owns pointer
//! - `segwire_engine_free()` must be called to deallocate
//! - Tensor buffers passed to `segwire_process_outputs()` are borrowed for
//!   the duration of the call and never retained
//! - The `WireBufferC` handed to the callback borrows Rust memory; its
//!   pointers are valid only until the callback returns
//! - `SegwireStatusC.error_msg` is owned by the caller and released with
//!   `segwire_status_free()`
//! - Strings from `segwire_label()` are owned by the caller and released
//!   with `segwire_string_free()`
//!
//! # Thread Safety
//!
//! Calls on one engine are serialized by an internal lock. Separate engines
//! run independently.
//!
//! # Safety
//!
//! All public FFI functions handle null pointer checks internally.
//! The caller is responsible for passing valid pointers as documented.

use std::os::raw::{c_char, c_void};
use std::ptr;

use parking_lot::Mutex;
use tracing::{error, warn};

use segwire_ffi_common::{
    cstr_to_str, cstring_new_or_fallback, free_cstring, slice_from_raw, slice_ptr, FfiResult,
};

use crate::config::PipelineConfig;
use crate::pipeline::Pipeline;
use crate::raw::{ElementType, RawOutputs, RawTensor};
use crate::types::{FrameStats, ScalingContext};
use crate::wire::WireBuffer;

// Safety limits on caller-described tensors
const MAX_TENSOR_COUNT: usize = 16;
const MAX_TENSOR_RANK: usize = 8;
const MAX_TENSOR_BYTES: usize = 1 << 30; // 1GB per output
const MAX_CONFIG_LEN: usize = 1_000_000;

/// C-compatible description of one raw model output
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawTensorC {
    /// Output name (null-terminated), or NULL for positional lookup
    pub name: *const c_char,
    /// Element type code (0=f32, 1=i64, 2=i32)
    pub element_type: i32,
    /// Dimensions, `rank` entries
    pub shape: *const i64,
    pub rank: usize,
    /// Raw native-endian element bytes
    pub data: *const u8,
    pub data_len: usize,
}

/// C-compatible view of an encoded frame
///
/// Lengths count elements, not bytes. Empty arrays have NULL pointers.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct WireBufferC {
    pub class_indices: *const i32,
    pub class_indices_len: usize,
    pub scores: *const f32,
    pub scores_len: usize,
    pub boxes: *const i32,
    pub boxes_len: usize,
    pub contour_points: *const i32,
    pub contour_points_len: usize,
    pub contour_indices: *const i32,
    pub contour_indices_len: usize,
    pub centroids: *const i32,
    pub centroids_len: usize,
    pub detection_count: usize,
    pub contour_count: usize,
    pub timestamp_ms: i64,
}

impl WireBufferC {
    /// Borrow `wire`; the view must not outlive it
    fn borrow(wire: &WireBuffer) -> Self {
        Self {
            class_indices: slice_ptr(&wire.class_indices),
            class_indices_len: wire.class_indices.len(),
            scores: slice_ptr(&wire.scores),
            scores_len: wire.scores.len(),
            boxes: slice_ptr(&wire.boxes),
            boxes_len: wire.boxes.len(),
            contour_points: slice_ptr(&wire.contour_points),
            contour_points_len: wire.contour_points.len(),
            contour_indices: slice_ptr(&wire.contour_indices),
            contour_indices_len: wire.contour_indices.len(),
            centroids: slice_ptr(&wire.centroids),
            centroids_len: wire.centroids.len(),
            detection_count: wire.detection_count(),
            contour_count: wire.contour_count,
            timestamp_ms: wire.timestamp_ms,
        }
    }
}

/// C-compatible processing statistics
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStatsC {
    /// Model inference time (microseconds), 0 when outputs come from the caller
    pub inference_us: u64,
    /// Decode and mask extraction time (microseconds)
    pub decode_us: u64,
    /// Suppression time (microseconds)
    pub suppress_us: u64,
    /// Coordinate mapping time (microseconds)
    pub map_us: u64,
    /// Wire encoding time (microseconds)
    pub encode_us: u64,
    /// Total processing time (microseconds)
    pub total_us: u64,
    /// Rows in the model output
    pub detections_raw: u32,
    /// Rows passing the confidence threshold
    pub candidates: u32,
    /// Detections encoded
    pub detections_final: u32,
}

impl From<FrameStats> for FrameStatsC {
    fn from(s: FrameStats) -> Self {
        Self {
            inference_us: s.inference_us,
            decode_us: s.decode_us,
            suppress_us: s.suppress_us,
            map_us: s.map_us,
            encode_us: s.encode_us,
            total_us: s.total_us,
            detections_raw: s.detections_raw,
            candidates: s.candidates,
            detections_final: s.detections_final,
        }
    }
}

/// C-compatible status for `segwire_process_outputs`
#[repr(C)]
pub struct SegwireStatusC {
    /// True if the frame was processed and the callback invoked
    pub success: bool,
    /// Error message if success is false (owned, must be freed)
    pub error_msg: *mut c_char,
    /// Processing statistics
    pub stats: FrameStatsC,
}

impl SegwireStatusC {
    fn success(stats: FrameStatsC) -> Self {
        Self {
            success: true,
            error_msg: ptr::null_mut(),
            stats,
        }
    }
}

impl FfiResult for SegwireStatusC {
    const ERROR_FALLBACK: &'static str = "unknown error";

    fn error_fields(error_msg: *mut c_char) -> Self {
        Self {
            success: false,
            error_msg,
            stats: FrameStatsC::default(),
        }
    }
}

/// Receives each encoded frame. `user_data` is passed through untouched.
pub type SegwireCallback = Option<extern "C" fn(wire: *const WireBufferC, user_data: *mut c_void)>;

/// Opaque engine handle
pub struct SegwireEngine {
    pipeline: Pipeline,
    inflight: Mutex<()>,
}

// ============================================================================
// Engine Lifecycle
// ============================================================================

/// Create an engine from a JSON configuration.
///
/// # Arguments
/// - `config_json`: `PipelineConfig` as JSON (null-terminated), or NULL for defaults
///
/// # Returns
/// Pointer to SegwireEngine, or NULL on invalid configuration.
/// Caller owns the pointer and must call `segwire_engine_free` to deallocate.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn segwire_engine_new(config_json: *const c_char) -> *mut SegwireEngine {
    let config = if config_json.is_null() {
        PipelineConfig::default()
    } else {
        let json = match unsafe { cstr_to_str(config_json) } {
            Ok(s) if s.len() <= MAX_CONFIG_LEN => s,
            Ok(_) => {
                error!("config JSON exceeds maximum length");
                return ptr::null_mut();
            }
            Err(e) => {
                error!(error = e, "invalid config string");
                return ptr::null_mut();
            }
        };
        match PipelineConfig::from_json_str(json) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "failed to parse config");
                return ptr::null_mut();
            }
        }
    };

    match Pipeline::new(config) {
        Ok(pipeline) => Box::into_raw(Box::new(SegwireEngine {
            pipeline,
            inflight: Mutex::new(()),
        })),
        Err(e) => {
            error!(error = %e, "failed to create engine");
            ptr::null_mut()
        }
    }
}

segwire_ffi_common::define_engine_free!(segwire_engine_free, SegwireEngine);

// ============================================================================
// Frame Processing
// ============================================================================

/// Build a borrowed tensor view over caller memory.
///
/// # Safety
/// Pointers in `t` must be valid for their stated lengths for `'a`.
unsafe fn tensor_from_c<'a>(t: &RawTensorC) -> Result<RawTensor<'a>, String> {
    let name = if t.name.is_null() {
        String::new()
    } else {
        unsafe { cstr_to_str(t.name) }
            .map_err(|e| format!("tensor name: {}", e))?
            .to_string()
    };
    let element_type = ElementType::from_code(t.element_type)
        .ok_or_else(|| format!("tensor '{}': unknown element type {}", name, t.element_type))?;
    if t.data_len > MAX_TENSOR_BYTES {
        return Err(format!("tensor '{}': {} bytes exceeds maximum", name, t.data_len));
    }
    if t.rank > MAX_TENSOR_RANK {
        return Err(format!("tensor '{}': rank {} exceeds maximum", name, t.rank));
    }

    let dims = unsafe { slice_from_raw(t.shape, t.rank) };
    if dims.len() != t.rank {
        return Err(format!("tensor '{}': null shape pointer", name));
    }
    let shape = dims
        .iter()
        .map(|&d| usize::try_from(d).map_err(|_| format!("tensor '{}': negative dimension {}", name, d)))
        .collect::<Result<Vec<_>, _>>()?;

    let data = unsafe { slice_from_raw(t.data, t.data_len) };
    Ok(RawTensor::borrowed(name, element_type, shape, data))
}

/// Run the pipeline on one frame of raw outputs and hand the encoded frame
/// to `callback`.
///
/// # Arguments
/// - `engine`: Valid SegwireEngine pointer
/// - `tensors`: Array of `count` output descriptors
/// - `width`, `height`: Original image size in pixels
/// - `scale_x`, `scale_y`: Auxiliary per-axis scale (1.0 for none)
/// - `timestamp_ms`: Frame timestamp, or 0 to stamp with the current time
/// - `callback`: Invoked once on success, before this function returns
/// - `user_data`: Opaque pointer passed to `callback`
///
/// # Returns
/// SegwireStatusC. Caller must call `segwire_status_free`.
/// On failure the callback is not invoked and the frame is dropped.
///
/// # Safety
/// - `engine` must be valid
/// - every descriptor's pointers must be valid for their stated lengths
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref, clippy::too_many_arguments)]
pub extern "C" fn segwire_process_outputs(
    engine: *const SegwireEngine,
    tensors: *const RawTensorC,
    count: usize,
    width: u32,
    height: u32,
    scale_x: f32,
    scale_y: f32,
    timestamp_ms: i64,
    callback: SegwireCallback,
    user_data: *mut c_void,
) -> SegwireStatusC {
    if engine.is_null() {
        return SegwireStatusC::error("null engine pointer");
    }
    if tensors.is_null() || count == 0 {
        return SegwireStatusC::error("no output tensors");
    }
    if count > MAX_TENSOR_COUNT {
        return SegwireStatusC::error("tensor count exceeds maximum");
    }
    let Some(callback) = callback else {
        return SegwireStatusC::error("null callback");
    };

    let engine = unsafe { &*engine };
    let descriptors = unsafe { slice_from_raw(tensors, count) };

    let mut outputs = RawOutputs::default();
    for desc in descriptors {
        match unsafe { tensor_from_c(desc) } {
            Ok(tensor) => outputs.push(tensor),
            Err(msg) => return SegwireStatusC::error(&msg),
        }
    }

    let ctx = ScalingContext::new(width, height).with_scale(scale_x, scale_y);
    let timestamp = (timestamp_ms != 0).then_some(timestamp_ms);

    let _guard = engine.inflight.lock();
    match engine.pipeline.process(&outputs, &ctx, timestamp) {
        Ok(frame) => {
            let view = WireBufferC::borrow(&frame.wire);
            callback(&view, user_data);
            SegwireStatusC::success(frame.stats.into())
        }
        Err(e) => {
            warn!(error = %e, "frame dropped");
            SegwireStatusC::error(&e.to_string())
        }
    }
}

/// Free the error string inside a status.
///
/// # Safety
/// - `status` must be from `segwire_process_outputs`
/// - `status` must not be used after this call
#[no_mangle]
pub extern "C" fn segwire_status_free(status: SegwireStatusC) {
    unsafe { free_cstring(status.error_msg) };
}

// ============================================================================
// Utilities
// ============================================================================

/// Install the tracing subscriber. Safe to call more than once.
#[no_mangle]
pub extern "C" fn segwire_init_logging() {
    crate::logging::init();
}

/// Look up the configured label for a class id.
///
/// # Returns
/// Owned label string, or NULL for a null engine or unknown class id.
/// Caller must free a non-null result with `segwire_string_free`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn segwire_label(engine: *const SegwireEngine, class_id: i32) -> *mut c_char {
    if engine.is_null() {
        return ptr::null_mut();
    }
    let engine = unsafe { &*engine };
    match engine.pipeline.config().label(i64::from(class_id)) {
        Some(label) => cstring_new_or_fallback(label, ""),
        None => ptr::null_mut(),
    }
}

segwire_ffi_common::define_string_free!(segwire_string_free);

segwire_ffi_common::define_version_fn!(segwire_version);
