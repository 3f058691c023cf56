//! Detection decoder
//!
//! Walks the raw outputs in tensor order, keeps rows whose confidence meets
//! the threshold, and attaches mask geometry when an extractor is supplied.

use tracing::debug;

use crate::extract::{ContourExtractor, MaskGeometry};
use crate::raw::RawOutputSet;
use crate::types::{Contour, Detection, Point};

/// Decoder settings for one pipeline instance
#[derive(Clone, Copy)]
pub struct Decoder<'e> {
    confidence_threshold: f32,
    model_side: u32,
    extractor: Option<&'e dyn ContourExtractor>,
}

impl<'e> Decoder<'e> {
    pub fn new(confidence_threshold: f32, model_side: u32) -> Self {
        Self {
            confidence_threshold,
            model_side,
            extractor: None,
        }
    }

    /// Request mask geometry for every kept detection
    pub fn with_extractor(mut self, extractor: &'e dyn ContourExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Decode candidates in ascending tensor index order.
    ///
    /// Keeps a row iff `confidence >= threshold`.
    pub fn decode(&self, set: &RawOutputSet<'_>) -> Vec<Detection> {
        let mut detections = Vec::new();
        let mut failures = 0usize;

        for i in 0..set.detection_count() {
            let confidence = set.score(i);
            if confidence.is_nan() || confidence < self.confidence_threshold {
                continue;
            }

            let mut detection = Detection::new(set.class_id(i), confidence, set.bbox(i));

            if let (Some(extractor), Some(masks)) = (self.extractor, set.masks()) {
                let offset = masks.offset_for(i);
                detection.mask_offset = offset;

                let side = masks.side();
                let geometry = offset.and_then(|o| extractor.extract(masks.slice_at(o), side));
                let geometry = match geometry {
                    Some(g) => self.to_model_space(g, side),
                    None => {
                        failures += 1;
                        MaskGeometry::default()
                    }
                };
                detection.contours = geometry.contours;
                detection.centroid = Some(geometry.centroid);
            }

            detections.push(detection);
        }

        if failures > 0 {
            debug!(failures, "masks produced no contours");
        }
        debug!(
            raw = set.detection_count(),
            kept = detections.len(),
            threshold = self.confidence_threshold,
            "decoded detections"
        );
        detections
    }

    /// Rescale mask-pixel geometry when the mask grid differs from the model input
    fn to_model_space(&self, geometry: MaskGeometry, side: usize) -> MaskGeometry {
        if u32::try_from(side).ok() == Some(self.model_side) {
            return geometry;
        }
        let factor = self.model_side as f32 / side as f32;
        let scale = |p: Point| Point::new(p.x * factor, p.y * factor);
        MaskGeometry {
            contours: geometry
                .contours
                .into_iter()
                .map(|c| c.into_iter().map(scale).collect::<Contour>())
                .collect(),
            centroid: scale(geometry.centroid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputNames;
    use crate::raw::{RawOutputs, RawTensor};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn outputs(scores: &[f32], masks: Option<RawTensor<'static>>) -> RawOutputs<'static> {
        let n = scores.len();
        let ids: Vec<i64> = (0..n as i64).collect();
        let dets: Vec<f32> = scores
            .iter()
            .flat_map(|&s| [0.0, 0.0, 10.0, 10.0, s])
            .collect();
        let mut out = RawOutputs::new(vec![
            RawTensor::from_i64("labels", vec![1, n], &ids),
            RawTensor::from_f32("dets", vec![1, n, 5], &dets),
        ]);
        if let Some(m) = masks {
            out.push(m);
        }
        out
    }

    #[test]
    fn test_threshold_inclusive_and_tensor_order() {
        let out = outputs(&[0.3, 0.5, 0.9, 0.49999], None);
        let set = RawOutputSet::from_outputs(&out, &OutputNames::default(), false).unwrap();
        let dets = Decoder::new(0.5, 640).decode(&set);

        let ids: Vec<i64> = dets.iter().map(|d| d.class_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(dets.iter().all(|d| d.contours.is_empty() && d.centroid.is_none()));
    }

    #[test]
    fn test_nan_confidence_is_dropped() {
        let out = outputs(&[f32::NAN, 0.8], None);
        let set = RawOutputSet::from_outputs(&out, &OutputNames::default(), false).unwrap();
        let dets = Decoder::new(0.0, 640).decode(&set);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
    }

    #[test]
    fn test_extraction_failure_keeps_detection() {
        let out = outputs(
            &[0.9],
            Some(RawTensor::from_f32("masks", vec![1, 1, 4, 4], &[0.0; 16])),
        );
        let set = RawOutputSet::from_outputs(&out, &OutputNames::default(), true).unwrap();
        let nothing = |_: &[f32], _: usize| -> Option<MaskGeometry> { None };
        let dets = Decoder::new(0.5, 4).with_extractor(&nothing).decode(&set);

        assert_eq!(dets.len(), 1);
        assert!(dets[0].contours.is_empty());
        assert_eq!(dets[0].centroid, Some(Point::new(0.0, 0.0)));
    }

    #[test]
    fn test_extractor_called_only_for_kept() {
        let calls = AtomicUsize::new(0);
        let counting = |_: &[f32], _: usize| -> Option<MaskGeometry> {
            calls.fetch_add(1, Ordering::SeqCst);
            Some(MaskGeometry::default())
        };
        let out = outputs(
            &[0.9, 0.1, 0.7],
            Some(RawTensor::from_f32("masks", vec![1, 3, 2, 2], &[0.0; 12])),
        );
        let set = RawOutputSet::from_outputs(&out, &OutputNames::default(), true).unwrap();
        let dets = Decoder::new(0.5, 2).with_extractor(&counting).decode(&set);

        assert_eq!(dets.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(dets[0].mask_offset, Some(0));
        assert_eq!(dets[1].mask_offset, Some(8));
    }

    #[test]
    fn test_mask_geometry_rescaled_to_model_space() {
        let out = outputs(
            &[0.9],
            Some(RawTensor::from_f32("masks", vec![1, 4, 4], &[0.0; 16])),
        );
        let set = RawOutputSet::from_outputs(&out, &OutputNames::default(), true).unwrap();
        let fixed = |_: &[f32], _: usize| -> Option<MaskGeometry> {
            Some(MaskGeometry {
                contours: vec![vec![Point::new(1.0, 2.0), Point::new(3.0, 3.0)]],
                centroid: Point::new(2.0, 2.5),
            })
        };
        let dets = Decoder::new(0.5, 16).with_extractor(&fixed).decode(&set);

        assert_eq!(
            dets[0].contours[0],
            vec![Point::new(4.0, 8.0), Point::new(12.0, 12.0)]
        );
        assert_eq!(dets[0].centroid, Some(Point::new(8.0, 10.0)));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_wide_mask_side_is_not_mistaken_for_model_side() {
        let geometry = MaskGeometry {
            contours: Vec::new(),
            centroid: Point::new(8.0, 8.0),
        };
        // Truncated to u32 this side would equal the model side
        let side = (1usize << 32) + 16;
        let scaled = Decoder::new(0.5, 16).to_model_space(geometry.clone(), side);
        assert_ne!(scaled.centroid, geometry.centroid);
        assert_eq!(Decoder::new(0.5, 16).to_model_space(geometry.clone(), 16), geometry);
    }
}
