//! Core types for detection post-processing
//!
//! Model-space types carry `f32` coordinates in the square frame the model
//! ran on. Pixel-space types carry the truncated, clamped `i32` coordinates
//! of the caller's original image and are what the wire encoder consumes.

use crate::error::ConfigError;

/// Axis-aligned box given by two corners
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Width, zero for inverted boxes
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    /// Height, zero for inverted boxes
    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Area of the axis-aligned overlap with another box
    pub fn intersection(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0)
    }

    /// Calculate intersection over union with another box
    ///
    /// Returns 0.0 when the union is empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let intersection = self.intersection(other);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// A point in model space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Closed polygon, last point connects back to the first
pub type Contour = Vec<Point>;

/// A single decoded detection in model space
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Class id, 0-based index into the label vocabulary
    pub class_id: i64,
    /// Confidence score 0.0-1.0
    pub confidence: f32,
    /// Box in model space
    pub bbox: BoundingBox,
    /// Element offset of this detection's mask in the frame's mask buffer
    pub mask_offset: Option<usize>,
    /// Outer contours of the mask, in model space
    pub contours: Vec<Contour>,
    /// Mask centroid in model space
    pub centroid: Option<Point>,
}

impl Detection {
    pub fn new(class_id: i64, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
            mask_offset: None,
            contours: Vec::new(),
            centroid: None,
        }
    }

    pub fn with_contours(mut self, contours: Vec<Contour>, centroid: Point) -> Self {
        self.contours = contours;
        self.centroid = Some(centroid);
        self
    }

    /// Total number of contour points across all contours
    pub fn point_count(&self) -> usize {
        self.contours.iter().map(Vec::len).sum()
    }
}

/// Integer pixel coordinate in the original image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

/// Integer pixel box in the original image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// A detection after coordinate mapping, ready for encoding
#[derive(Debug, Clone, PartialEq)]
pub struct MappedDetection {
    pub class_id: i32,
    pub score: f32,
    pub bbox: PixelBox,
    pub contours: Vec<Vec<PixelPoint>>,
    pub centroid: PixelPoint,
}

/// Per-call image geometry supplied by the caller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingContext {
    /// Original image width in pixels
    pub width: u32,
    /// Original image height in pixels
    pub height: u32,
    /// Auxiliary horizontal scale factor
    pub scale_x: f32,
    /// Auxiliary vertical scale factor
    pub scale_y: f32,
}

impl ScalingContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    pub fn with_scale(mut self, scale_x: f32, scale_y: f32) -> Self {
        self.scale_x = scale_x;
        self.scale_y = scale_y;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidImageSize {
                width: self.width,
                height: self.height,
            });
        }
        for (axis, value) in [('x', self.scale_x), ('y', self.scale_y)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidScale { axis, value });
            }
        }
        Ok(())
    }
}

/// Processing statistics for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Model inference time, zero when outputs came from the caller (microseconds)
    pub inference_us: u64,
    /// Raw view + decoder time (microseconds)
    pub decode_us: u64,
    /// Non-max suppression time (microseconds)
    pub suppress_us: u64,
    /// Coordinate mapping time (microseconds)
    pub map_us: u64,
    /// Wire encoding time (microseconds)
    pub encode_us: u64,
    /// Total processing time (microseconds)
    pub total_us: u64,
    /// Detections in the raw outputs
    pub detections_raw: u32,
    /// Detections surviving the confidence threshold
    pub candidates: u32,
    /// Detections after suppression
    pub detections_final: u32,
}
