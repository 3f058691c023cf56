//! Class-wise greedy non-max suppression

use tracing::debug;

use crate::types::Detection;

/// Indices sorted by confidence descending, ties by original index
pub fn confidence_order(detections: &[Detection]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..detections.len()).collect();
    // Stable sort keeps ascending index order among equal confidences
    order.sort_by(|&a, &b| {
        detections[b]
            .confidence
            .total_cmp(&detections[a].confidence)
    });
    order
}

/// Greedy NMS returning kept indices in confidence-descending order.
///
/// A detection suppresses a lower-ranked one of the same class when their
/// IoU is strictly greater than `iou_threshold`. `max_kept` stops the scan
/// early once that many detections are kept.
pub fn non_max_suppression(
    detections: &[Detection],
    iou_threshold: f32,
    max_kept: Option<usize>,
) -> Vec<usize> {
    let n = detections.len();
    let limit = max_kept.unwrap_or(n);
    if n == 0 || limit == 0 {
        return Vec::new();
    }

    let areas: Vec<f32> = detections.iter().map(|d| d.bbox.area()).collect();
    let order = confidence_order(detections);

    let mut keep = Vec::with_capacity(limit.min(n));
    let mut active = vec![true; n];
    let mut remaining = n;

    for (pos, &i) in order.iter().enumerate() {
        if !active[i] {
            continue;
        }
        keep.push(i);
        active[i] = false;
        remaining -= 1;
        if keep.len() >= limit || remaining == 0 {
            break;
        }

        let current = &detections[i];
        for &j in &order[pos + 1..] {
            if !active[j] || detections[j].class_id != current.class_id {
                continue;
            }
            let intersection = current.bbox.intersection(&detections[j].bbox);
            let union = areas[i] + areas[j] - intersection;
            let iou = if union > 0.0 { intersection / union } else { 0.0 };
            if iou > iou_threshold {
                active[j] = false;
                remaining -= 1;
            }
        }
        if remaining == 0 {
            break;
        }
    }

    keep
}

/// Suppression stage: consumes decoder output, returns the final ordering
pub fn suppress(
    detections: Vec<Detection>,
    iou_threshold: f32,
    max_kept: Option<usize>,
) -> Vec<Detection> {
    let before = detections.len();
    let keep = non_max_suppression(&detections, iou_threshold, max_kept);

    let mut slots: Vec<Option<Detection>> = detections.into_iter().map(Some).collect();
    let kept: Vec<Detection> = keep.into_iter().filter_map(|i| slots[i].take()).collect();

    debug!(before, after = kept.len(), iou_threshold, "suppressed detections");
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn det(class_id: i64, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new(class_id, confidence, BoundingBox::new(x1, y1, x2, y2))
    }

    #[test]
    fn test_empty_input() {
        assert!(non_max_suppression(&[], 0.5, None).is_empty());
    }

    #[test]
    fn test_overlapping_same_class_suppressed() {
        let dets = vec![
            det(0, 0.8, 0.0, 0.0, 100.0, 100.0),
            det(0, 0.9, 5.0, 5.0, 105.0, 105.0),
            det(0, 0.7, 300.0, 300.0, 400.0, 400.0),
        ];
        assert_eq!(non_max_suppression(&dets, 0.5, None), vec![1, 2]);
    }

    #[test]
    fn test_cross_class_never_suppressed() {
        let dets = vec![
            det(0, 0.9, 0.0, 0.0, 100.0, 100.0),
            det(1, 0.8, 0.0, 0.0, 100.0, 100.0),
        ];
        assert_eq!(non_max_suppression(&dets, 0.1, None), vec![0, 1]);
    }

    #[test]
    fn test_iou_equal_to_threshold_is_kept() {
        // Overlap of exactly the threshold is not strictly greater
        let a = det(0, 0.9, 0.0, 0.0, 10.0, 10.0);
        let b = det(0, 0.8, 5.0, 0.0, 15.0, 10.0);
        let iou = a.bbox.iou(&b.bbox);
        assert_eq!(non_max_suppression(&[a, b], iou, None), vec![0, 1]);
    }

    #[test]
    fn test_ties_broken_by_index() {
        let dets = vec![
            det(0, 0.5, 0.0, 0.0, 10.0, 10.0),
            det(0, 0.5, 0.0, 0.0, 10.0, 10.0),
            det(0, 0.5, 0.0, 0.0, 10.0, 10.0),
        ];
        assert_eq!(non_max_suppression(&dets, 0.5, None), vec![0]);
        assert_eq!(confidence_order(&dets), vec![0, 1, 2]);
    }

    #[test]
    fn test_max_kept_prefix_of_unbounded() {
        let dets: Vec<Detection> = (0..10)
            .map(|i| {
                let x = i as f32 * 20.0;
                det(i % 3, 1.0 - i as f32 * 0.05, x, 0.0, x + 15.0, 15.0)
            })
            .collect();
        let unbounded = non_max_suppression(&dets, 0.5, None);
        let capped = non_max_suppression(&dets, 0.5, Some(4));
        assert_eq!(capped, unbounded[..4].to_vec());
        assert!(non_max_suppression(&dets, 0.5, Some(0)).is_empty());
    }

    #[test]
    fn test_zero_area_boxes_do_not_suppress() {
        let dets = vec![
            det(0, 0.9, 5.0, 5.0, 5.0, 5.0),
            det(0, 0.8, 5.0, 5.0, 5.0, 5.0),
        ];
        assert_eq!(non_max_suppression(&dets, 0.0, None), vec![0, 1]);
    }

    #[test]
    fn test_suppress_returns_detections_in_confidence_order() {
        let dets = vec![
            det(2, 0.6, 0.0, 0.0, 10.0, 10.0),
            det(1, 0.9, 50.0, 50.0, 60.0, 60.0),
        ];
        let kept = suppress(dets, 0.5, None);
        let confidences: Vec<f32> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.6]);
    }
}
