//! Wire encoding for the callback boundary
//!
//! Layout, for `K` detections and `P` contour points in total:
//!
//! | array             | type  | length   |
//! |-------------------|-------|----------|
//! | `class_indices`   | i32   | K        |
//! | `scores`          | f32   | K        |
//! | `boxes`           | i32   | 4K       |
//! | `contour_points`  | i32   | 2P       |
//! | `contour_indices` | i32   | variable |
//! | `centroids`       | i32   | 2K       |
//!
//! `contour_indices` holds, per detection: the running point cursor, one
//! cumulative end index per contour, then `-1`. Two detections with contours
//! of 10 + 5 and 8 points encode as `[0, 10, 15, -1, 15, 23, -1]`. With
//! masks disabled the contour arrays are empty.

use crate::error::WireError;
use crate::types::{MappedDetection, PixelBox, PixelPoint};

/// Terminates one detection's run in `contour_indices`
pub const DETECTION_SEPARATOR: i32 = -1;

/// Flattened detection list handed to the host runtime
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WireBuffer {
    pub class_indices: Vec<i32>,
    pub scores: Vec<f32>,
    pub boxes: Vec<i32>,
    pub contour_points: Vec<i32>,
    pub contour_indices: Vec<i32>,
    pub centroids: Vec<i32>,
    /// Number of contours across all detections
    pub contour_count: usize,
    /// Frame timestamp in milliseconds, passed through unchanged
    pub timestamp_ms: i64,
}

fn cursor_value(points: usize) -> i32 {
    i32::try_from(points).unwrap_or(i32::MAX)
}

impl WireBuffer {
    /// Encode detections in order. `with_contours` is false for mask-less models.
    pub fn encode(detections: &[MappedDetection], with_contours: bool, timestamp_ms: i64) -> Self {
        let k = detections.len();
        let mut wire = WireBuffer {
            class_indices: Vec::with_capacity(k),
            scores: Vec::with_capacity(k),
            boxes: Vec::with_capacity(4 * k),
            centroids: Vec::with_capacity(2 * k),
            timestamp_ms,
            ..Default::default()
        };

        let mut cursor = 0usize;
        for det in detections {
            wire.class_indices.push(det.class_id);
            wire.scores.push(det.score);
            wire.boxes
                .extend_from_slice(&[det.bbox.x1, det.bbox.y1, det.bbox.x2, det.bbox.y2]);
            wire.centroids
                .extend_from_slice(&[det.centroid.x, det.centroid.y]);

            if !with_contours {
                continue;
            }
            wire.contour_indices.push(cursor_value(cursor));
            for contour in &det.contours {
                for p in contour {
                    wire.contour_points.extend_from_slice(&[p.x, p.y]);
                }
                cursor += contour.len();
                wire.contour_indices.push(cursor_value(cursor));
            }
            wire.contour_indices.push(DETECTION_SEPARATOR);
            wire.contour_count += det.contours.len();
        }

        wire
    }

    pub fn detection_count(&self) -> usize {
        self.class_indices.len()
    }

    pub fn point_count(&self) -> usize {
        self.contour_points.len() / 2
    }

    /// Rebuild the ordered detection list from the flat arrays
    pub fn decode(&self) -> Result<Vec<MappedDetection>, WireError> {
        let k = self.detection_count();
        check_len("scores", k, self.scores.len())?;
        check_len("boxes", 4 * k, self.boxes.len())?;
        check_len("centroids", 2 * k, self.centroids.len())?;
        if self.contour_points.len() % 2 != 0 {
            return Err(WireError::LengthMismatch {
                name: "contour_points",
                expected: self.contour_points.len() + 1,
                actual: self.contour_points.len(),
            });
        }

        let contours = if self.contour_indices.is_empty() {
            vec![Vec::new(); k]
        } else {
            self.decode_contours(k)?
        };

        Ok(contours
            .into_iter()
            .enumerate()
            .map(|(i, contours)| MappedDetection {
                class_id: self.class_indices[i],
                score: self.scores[i],
                bbox: PixelBox {
                    x1: self.boxes[4 * i],
                    y1: self.boxes[4 * i + 1],
                    x2: self.boxes[4 * i + 2],
                    y2: self.boxes[4 * i + 3],
                },
                contours,
                centroid: PixelPoint {
                    x: self.centroids[2 * i],
                    y: self.centroids[2 * i + 1],
                },
            })
            .collect())
    }

    fn decode_contours(&self, k: usize) -> Result<Vec<Vec<Vec<PixelPoint>>>, WireError> {
        let indices = &self.contour_indices;
        let total = self.point_count();
        let mut result = Vec::with_capacity(k);
        let mut cursor = 0usize;
        let mut pos = 0usize;

        for _ in 0..k {
            let start = *indices.get(pos).ok_or(WireError::MalformedIndices {
                position: pos,
                reason: "missing start index",
            })?;
            if usize::try_from(start).ok() != Some(cursor) {
                return Err(WireError::MalformedIndices {
                    position: pos,
                    reason: "start index does not match point cursor",
                });
            }
            pos += 1;

            let mut contours = Vec::new();
            loop {
                let value = *indices.get(pos).ok_or(WireError::MalformedIndices {
                    position: pos,
                    reason: "missing separator",
                })?;
                pos += 1;
                if value == DETECTION_SEPARATOR {
                    break;
                }
                let end = usize::try_from(value)
                    .ok()
                    .filter(|&end| end >= cursor && end <= total)
                    .ok_or(WireError::MalformedIndices {
                        position: pos - 1,
                        reason: "end index out of range",
                    })?;
                contours.push(
                    (cursor..end)
                        .map(|p| PixelPoint {
                            x: self.contour_points[2 * p],
                            y: self.contour_points[2 * p + 1],
                        })
                        .collect(),
                );
                cursor = end;
            }
            result.push(contours);
        }

        if pos != indices.len() {
            return Err(WireError::MalformedIndices {
                position: pos,
                reason: "trailing values",
            });
        }
        Ok(result)
    }
}

fn check_len(name: &'static str, expected: usize, actual: usize) -> Result<(), WireError> {
    if expected != actual {
        return Err(WireError::LengthMismatch {
            name,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mapped(class_id: i32, contour_lens: &[usize]) -> MappedDetection {
        MappedDetection {
            class_id,
            score: 0.5,
            bbox: PixelBox {
                x1: 1,
                y1: 2,
                x2: 3,
                y2: 4,
            },
            contours: contour_lens
                .iter()
                .map(|&n| {
                    (0..n as i32)
                        .map(|i| PixelPoint { x: i, y: class_id })
                        .collect()
                })
                .collect(),
            centroid: PixelPoint { x: 7, y: 8 },
        }
    }

    #[test]
    fn test_contour_indices_layout() {
        let wire = WireBuffer::encode(&[mapped(0, &[10, 5]), mapped(1, &[8])], true, 42);
        assert_eq!(wire.contour_indices, vec![0, 10, 15, -1, 15, 23, -1]);
        assert_eq!(wire.contour_points.len(), 2 * 23);
        assert_eq!(wire.contour_count, 3);
        assert_eq!(wire.timestamp_ms, 42);
    }

    #[test]
    fn test_zero_contours_emit_start_and_separator() {
        let wire = WireBuffer::encode(&[mapped(0, &[3]), mapped(1, &[]), mapped(2, &[2])], true, 0);
        assert_eq!(wire.contour_indices, vec![0, 3, -1, 3, -1, 3, 5, -1]);
    }

    #[test]
    fn test_masks_disabled_leaves_contour_arrays_empty() {
        let wire = WireBuffer::encode(&[mapped(4, &[]), mapped(5, &[])], false, 0);
        assert!(wire.contour_indices.is_empty());
        assert!(wire.contour_points.is_empty());
        assert_eq!(wire.contour_count, 0);
        assert_eq!(wire.class_indices, vec![4, 5]);
        assert_eq!(wire.boxes, vec![1, 2, 3, 4, 1, 2, 3, 4]);
        assert_eq!(wire.centroids, vec![7, 8, 7, 8]);
    }

    #[test]
    fn test_decode_restores_detections() {
        let dets = vec![mapped(0, &[10, 5]), mapped(1, &[]), mapped(2, &[8])];
        let wire = WireBuffer::encode(&dets, true, 0);
        assert_eq!(wire.decode().unwrap(), dets);
    }

    #[test]
    fn test_decode_rejects_bad_indices() {
        let mut wire = WireBuffer::encode(&[mapped(0, &[2])], true, 0);
        wire.contour_indices = vec![0, 5, -1];
        assert!(wire.decode().is_err());

        wire.contour_indices = vec![1, 2, -1];
        assert!(wire.decode().is_err());

        wire.contour_indices = vec![0, 2];
        assert!(wire.decode().is_err());
    }

    #[test]
    fn test_empty_frame() {
        let wire = WireBuffer::encode(&[], true, 9);
        assert_eq!(wire.detection_count(), 0);
        assert!(wire.contour_indices.is_empty());
        assert_eq!(wire.decode().unwrap(), Vec::new());
    }
}
