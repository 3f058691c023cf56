//! Detection pipeline
//!
//! One `Pipeline` per loaded model. It holds immutable configuration and is
//! safe to share; every call owns its intermediate buffers, so independent
//! pipelines can run side by side.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, info_span};

use crate::config::PipelineConfig;
use crate::decode::Decoder;
use crate::error::{ConfigError, Result};
use crate::extract::{ContourExtractor, ImageprocExtractor};
use crate::mapper::CoordinateMapper;
use crate::raw::{RawOutputSet, RawOutputs};
use crate::suppress::suppress;
use crate::types::{Detection, FrameStats, MappedDetection, ScalingContext};
use crate::wire::WireBuffer;

/// Encoded frame plus timings
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutput {
    pub wire: WireBuffer,
    pub stats: FrameStats,
}

pub struct Pipeline {
    config: PipelineConfig,
    extractor: Arc<dyn ContourExtractor>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn micros(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_micros()).unwrap_or(u64::MAX)
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

impl Pipeline {
    /// Create a pipeline using the imageproc contour extractor.
    ///
    /// # Returns
    /// * `Err(ConfigError)` - thresholds outside [0, 1] or a zero model side
    pub fn new(config: PipelineConfig) -> std::result::Result<Self, ConfigError> {
        let extractor = Arc::new(ImageprocExtractor::new(config.mask_threshold));
        Self::with_extractor(config, extractor)
    }

    pub fn with_extractor(
        config: PipelineConfig,
        extractor: Arc<dyn ContourExtractor>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        info!(
            confidence = config.confidence_threshold,
            iou = config.iou_threshold,
            suppression = config.suppression_enabled,
            masks = config.masks_enabled,
            model_side = config.model_side,
            "pipeline ready"
        );
        Ok(Self { config, extractor })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Decode, filter and suppress; detections stay in model space
    pub fn detect(&self, outputs: &RawOutputs<'_>) -> Result<Vec<Detection>> {
        let mut stats = FrameStats::default();
        self.detect_with_stats(outputs, &mut stats)
    }

    fn detect_with_stats(
        &self,
        outputs: &RawOutputs<'_>,
        stats: &mut FrameStats,
    ) -> Result<Vec<Detection>> {
        let start = Instant::now();
        let set = RawOutputSet::from_outputs(outputs, &self.config.outputs, self.config.masks_enabled)?;

        let mut decoder = Decoder::new(self.config.confidence_threshold, self.config.model_side);
        if self.config.masks_enabled {
            decoder = decoder.with_extractor(self.extractor.as_ref());
        }
        let candidates = decoder.decode(&set);
        stats.decode_us = micros(start);
        stats.detections_raw = count_u32(set.detection_count());
        stats.candidates = count_u32(candidates.len());

        let start = Instant::now();
        let detections = if self.config.suppression_enabled {
            suppress(
                candidates,
                self.config.iou_threshold,
                self.config.max_detections,
            )
        } else {
            let mut passthrough = candidates;
            if let Some(max) = self.config.max_detections {
                passthrough.truncate(max);
            }
            passthrough
        };
        stats.suppress_us = micros(start);
        stats.detections_final = count_u32(detections.len());

        Ok(detections)
    }

    /// Map detections into the caller's image
    pub fn map(&self, detections: &[Detection], ctx: &ScalingContext) -> Vec<MappedDetection> {
        let mapper = CoordinateMapper::new(ctx, self.config.model_side);
        detections.iter().map(|d| mapper.map_detection(d)).collect()
    }

    /// Run the full pipeline for one frame.
    ///
    /// `timestamp_ms` of `None` stamps the frame with the current time.
    pub fn process(
        &self,
        outputs: &RawOutputs<'_>,
        ctx: &ScalingContext,
        timestamp_ms: Option<i64>,
    ) -> Result<FrameOutput> {
        let span = info_span!("frame", width = ctx.width, height = ctx.height);
        let _guard = span.enter();

        ctx.validate()?;
        let total_start = Instant::now();
        let mut stats = FrameStats::default();

        let detections = self.detect_with_stats(outputs, &mut stats)?;

        let start = Instant::now();
        let mapped = self.map(&detections, ctx);
        drop(detections);
        stats.map_us = micros(start);

        let start = Instant::now();
        let timestamp_ms = timestamp_ms.unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        let wire = WireBuffer::encode(&mapped, self.config.masks_enabled, timestamp_ms);
        stats.encode_us = micros(start);
        stats.total_us = micros(total_start);

        debug!(
            raw = stats.detections_raw,
            candidates = stats.candidates,
            kept = stats.detections_final,
            points = wire.point_count(),
            total_us = stats.total_us,
            "frame encoded"
        );

        Ok(FrameOutput { wire, stats })
    }
}
