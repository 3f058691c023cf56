//! Model-space to image-space coordinate mapping
//!
//! Each coordinate is scaled by its axis factor, truncated toward zero and
//! clamped into the image independently of every other coordinate.

use crate::types::{
    BoundingBox, Detection, MappedDetection, PixelBox, PixelPoint, Point, ScalingContext,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    scale_x: f32,
    scale_y: f32,
    max_x: i32,
    max_y: i32,
}

impl CoordinateMapper {
    /// `scale = (original / model_side) * aux_scale` per axis
    pub fn new(ctx: &ScalingContext, model_side: u32) -> Self {
        let side = model_side.max(1) as f32;
        Self {
            scale_x: (ctx.width as f32 / side) * ctx.scale_x,
            scale_y: (ctx.height as f32 / side) * ctx.scale_y,
            max_x: clamp_dim(ctx.width),
            max_y: clamp_dim(ctx.height),
        }
    }

    pub fn map_x(&self, x: f32) -> i32 {
        ((x * self.scale_x) as i32).clamp(0, self.max_x)
    }

    pub fn map_y(&self, y: f32) -> i32 {
        ((y * self.scale_y) as i32).clamp(0, self.max_y)
    }

    pub fn map_point(&self, p: Point) -> PixelPoint {
        PixelPoint {
            x: self.map_x(p.x),
            y: self.map_y(p.y),
        }
    }

    pub fn map_box(&self, b: &BoundingBox) -> PixelBox {
        PixelBox {
            x1: self.map_x(b.x1),
            y1: self.map_y(b.y1),
            x2: self.map_x(b.x2),
            y2: self.map_y(b.y2),
        }
    }

    pub fn map_detection(&self, detection: &Detection) -> MappedDetection {
        MappedDetection {
            class_id: saturate_class_id(detection.class_id),
            score: detection.confidence,
            bbox: self.map_box(&detection.bbox),
            contours: detection
                .contours
                .iter()
                .map(|c| c.iter().map(|&p| self.map_point(p)).collect())
                .collect(),
            centroid: self.map_point(detection.centroid.unwrap_or_default()),
        }
    }
}

/// Largest valid pixel index along an axis
fn clamp_dim(len: u32) -> i32 {
    i32::try_from(len.saturating_sub(1)).unwrap_or(i32::MAX)
}

fn saturate_class_id(class_id: i64) -> i32 {
    class_id.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}
