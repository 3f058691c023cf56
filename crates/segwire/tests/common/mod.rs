//! Shared builders for integration tests

#![allow(dead_code)]

use segwire::{BoundingBox, Detection, RawOutputs, RawTensor};

/// One decoder row: class id, box corners, confidence
#[derive(Debug, Clone, Copy)]
pub struct Row {
    pub class_id: i64,
    pub bbox: [f32; 4],
    pub score: f32,
}

pub fn row(class_id: i64, bbox: [f32; 4], score: f32) -> Row {
    Row {
        class_id,
        bbox,
        score,
    }
}

/// `labels` [1, N] i64 and `dets` [1, N, 5] f32
pub fn box_outputs(rows: &[Row]) -> RawOutputs<'static> {
    let n = rows.len();
    let labels: Vec<i64> = rows.iter().map(|r| r.class_id).collect();
    let dets: Vec<f32> = rows
        .iter()
        .flat_map(|r| [r.bbox[0], r.bbox[1], r.bbox[2], r.bbox[3], r.score])
        .collect();
    RawOutputs::new(vec![
        RawTensor::from_i64("labels", vec![1, n], &labels),
        RawTensor::from_f32("dets", vec![1, n, 5], &dets),
    ])
}

/// Box outputs plus a `masks` [1, count, side, side] tensor
pub fn mask_outputs(rows: &[Row], masks: &[Vec<f32>], side: usize) -> RawOutputs<'static> {
    let mut outputs = box_outputs(rows);
    let data: Vec<f32> = masks.iter().flatten().copied().collect();
    outputs.push(RawTensor::from_f32(
        "masks",
        vec![1, masks.len(), side, side],
        &data,
    ));
    outputs
}

/// A `side * side` mask with a filled axis-aligned rectangle
pub fn rect_mask(side: usize, x0: usize, y0: usize, x1: usize, y1: usize) -> Vec<f32> {
    let mut mask = vec![0.0; side * side];
    for y in y0..y1 {
        for x in x0..x1 {
            mask[y * side + x] = 1.0;
        }
    }
    mask
}

/// Deterministic pseudo-random detections with heavy overlap
pub fn scattered_detections(count: usize, classes: i64, seed: u64) -> Vec<Detection> {
    let mut state = seed;
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 33) as f32) / (u32::MAX >> 1) as f32
    };

    (0..count)
        .map(|_| {
            let x = next() * 200.0;
            let y = next() * 200.0;
            let w = 10.0 + next() * 60.0;
            let h = 10.0 + next() * 60.0;
            let class_id = (next() * classes as f32) as i64 % classes;
            Detection::new(class_id, next(), BoundingBox::new(x, y, x + w, y + h))
        })
        .collect()
}
