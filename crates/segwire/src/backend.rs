//! Inference backend seam
//!
//! The model runtime is an external collaborator: it receives a
//! preprocessed NCHW tensor and returns the raw outputs the pipeline decodes.

use crate::error::Result;
use crate::raw::RawOutputs;

/// Preprocessed model input, NCHW `f32`
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    pub shape: [usize; 4],
    pub data: Vec<f32>,
}

impl ModelInput {
    /// A zeroed `[1, 3, side, side]` input
    pub fn zeros(side: usize) -> Self {
        Self {
            shape: [1, 3, side, side],
            data: vec![0.0; 3 * side * side],
        }
    }
}

/// Runs the detection model for one frame
pub trait InferenceBackend: Send {
    fn infer(&mut self, input: &ModelInput) -> Result<RawOutputs<'static>>;
}

#[cfg(feature = "onnx")]
pub use self::onnx::{OrtBackend, OrtBackendConfig};

#[cfg(feature = "onnx")]
mod onnx {
    use ndarray::Array4;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::Tensor;
    use tracing::{debug, info};
    use zerocopy::IntoBytes;

    use super::{InferenceBackend, ModelInput};
    use crate::error::{PipelineError, Result};
    use crate::raw::{ElementType, RawOutputs, RawTensor};

    fn backend_err(e: impl std::fmt::Display) -> PipelineError {
        PipelineError::Backend(e.to_string())
    }

    /// Configuration for the ONNX Runtime backend
    #[derive(Debug, Clone, Default)]
    pub struct OrtBackendConfig {
        /// Path to ONNX model file
        pub model_path: String,
        /// Number of inference threads (0 for auto)
        pub num_threads: usize,
    }

    /// ONNX Runtime session producing raw output tensors
    pub struct OrtBackend {
        session: Session,
    }

    impl OrtBackend {
        pub fn new(config: &OrtBackendConfig) -> Result<Self> {
            info!(model = %config.model_path, "loading ONNX model");

            let mut builder = Session::builder()
                .map_err(backend_err)?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(backend_err)?;
            if config.num_threads > 0 {
                builder = builder
                    .with_intra_threads(config.num_threads)
                    .map_err(backend_err)?;
            }
            let session = builder
                .commit_from_file(&config.model_path)
                .map_err(backend_err)?;

            Ok(Self { session })
        }
    }

    impl InferenceBackend for OrtBackend {
        fn infer(&mut self, input: &ModelInput) -> Result<RawOutputs<'static>> {
            let [n, c, h, w] = input.shape;
            let array = Array4::from_shape_vec((n, c, h, w), input.data.clone())
                .map_err(backend_err)?;
            let tensor = Tensor::from_array(array).map_err(backend_err)?;

            let outputs = self
                .session
                .run(ort::inputs![tensor])
                .map_err(backend_err)?;

            let names: Vec<String> = outputs.keys().map(|k| k.to_string()).collect();
            let mut raw = RawOutputs::default();
            for name in names {
                let value = &outputs[name.as_str()];
                let tensor = if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
                    RawTensor::owned(&name, ElementType::F32, dims(shape), data.as_bytes().to_vec())
                } else if let Ok((shape, data)) = value.try_extract_tensor::<i64>() {
                    RawTensor::owned(&name, ElementType::I64, dims(shape), data.as_bytes().to_vec())
                } else if let Ok((shape, data)) = value.try_extract_tensor::<i32>() {
                    RawTensor::owned(&name, ElementType::I32, dims(shape), data.as_bytes().to_vec())
                } else {
                    return Err(backend_err(format!("output {} has unsupported type", name)));
                };
                debug!(output = %name, shape = ?tensor.shape(), "extracted output");
                raw.push(tensor);
            }
            Ok(raw)
        }
    }

    fn dims(shape: &[i64]) -> Vec<usize> {
        shape.iter().map(|&d| d.max(0) as usize).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::RawTensor;

    struct FixedBackend;

    impl InferenceBackend for FixedBackend {
        fn infer(&mut self, input: &ModelInput) -> Result<RawOutputs<'static>> {
            let side = input.shape[2] as f32;
            Ok(RawOutputs::new(vec![
                RawTensor::from_i64("labels", vec![1, 1], &[0]),
                RawTensor::from_f32("dets", vec![1, 1, 5], &[0.0, 0.0, side, side, 1.0]),
            ]))
        }
    }

    #[test]
    fn test_backend_trait_object() {
        let mut backend: Box<dyn InferenceBackend> = Box::new(FixedBackend);
        let outputs = backend.infer(&ModelInput::zeros(32)).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs.get("dets").unwrap().shape(), &[1, 1, 5]);
    }
}
