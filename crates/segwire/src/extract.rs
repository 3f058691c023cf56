//! Mask contour and centroid extraction
//!
//! The decoder hands one square mask at a time to a [`ContourExtractor`].
//! Returning `None` is a non-fatal extraction failure: the detection is kept
//! with no contours and a zero centroid.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};

use crate::types::{Contour, Point};

/// Polygons and centroid recovered from one mask, in mask pixel coordinates
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MaskGeometry {
    pub contours: Vec<Contour>,
    pub centroid: Point,
}

/// Converts one mask buffer into polygons and a centroid.
///
/// `mask` holds `side * side` values in row-major order.
pub trait ContourExtractor: Send + Sync {
    fn extract(&self, mask: &[f32], side: usize) -> Option<MaskGeometry>;
}

impl<F> ContourExtractor for F
where
    F: Fn(&[f32], usize) -> Option<MaskGeometry> + Send + Sync,
{
    fn extract(&self, mask: &[f32], side: usize) -> Option<MaskGeometry> {
        self(mask, side)
    }
}

/// Imageproc-based extractor: binarize, trace outer borders, take moments
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageprocExtractor {
    threshold: f32,
}

impl Default for ImageprocExtractor {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl ImageprocExtractor {
    /// Pixels strictly above `threshold` count as foreground
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    fn binarize(&self, mask: &[f32], side: u32) -> GrayImage {
        GrayImage::from_fn(side, side, |x, y| {
            let value = mask[(y * side + x) as usize];
            Luma([if value > self.threshold { 255 } else { 0 }])
        })
    }
}

impl ContourExtractor for ImageprocExtractor {
    fn extract(&self, mask: &[f32], side: usize) -> Option<MaskGeometry> {
        if side == 0 || mask.len() < side * side {
            return None;
        }
        let side_px = u32::try_from(side).ok()?;
        let binary = self.binarize(mask, side_px);

        // Zeroth and first order moments of the foreground
        let (mut m00, mut m10, mut m01) = (0f64, 0f64, 0f64);
        for (x, y, pixel) in binary.enumerate_pixels() {
            if pixel[0] > 0 {
                m00 += 1.0;
                m10 += f64::from(x);
                m01 += f64::from(y);
            }
        }
        if m00 == 0.0 {
            return None;
        }

        let contours: Vec<Contour> = find_contours::<i32>(&binary)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer)
            .map(|c| {
                c.points
                    .iter()
                    .map(|p| Point::new(p.x as f32, p.y as f32))
                    .collect()
            })
            .collect();

        Some(MaskGeometry {
            contours,
            centroid: Point::new((m10 / m00) as f32, (m01 / m00) as f32),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_mask(side: usize, from: usize, to: usize) -> Vec<f32> {
        let mut mask = vec![0.0; side * side];
        for y in from..to {
            for x in from..to {
                mask[y * side + x] = 0.9;
            }
        }
        mask
    }

    #[test]
    fn test_empty_mask_yields_nothing() {
        let extractor = ImageprocExtractor::default();
        assert!(extractor.extract(&[0.0; 64], 8).is_none());
    }

    #[test]
    fn test_short_buffer_yields_nothing() {
        let extractor = ImageprocExtractor::default();
        assert!(extractor.extract(&[1.0; 10], 8).is_none());
    }

    #[test]
    fn test_square_blob() {
        let extractor = ImageprocExtractor::default();
        let geometry = extractor.extract(&square_mask(16, 4, 8), 16).unwrap();

        assert_eq!(geometry.contours.len(), 1);
        assert!(!geometry.contours[0].is_empty());
        for p in &geometry.contours[0] {
            assert!((4.0..=7.0).contains(&p.x));
            assert!((4.0..=7.0).contains(&p.y));
        }
        assert!((geometry.centroid.x - 5.5).abs() < 1e-5);
        assert!((geometry.centroid.y - 5.5).abs() < 1e-5);
    }

    #[test]
    fn test_threshold_is_strict() {
        let extractor = ImageprocExtractor::new(0.9);
        assert!(extractor.extract(&square_mask(8, 2, 4), 8).is_none());
    }

    #[test]
    fn test_closure_extractor() {
        let extractor = |_: &[f32], side: usize| {
            Some(MaskGeometry {
                contours: Vec::new(),
                centroid: Point::new(side as f32, 0.0),
            })
        };
        let geometry = extractor.extract(&[], 3).unwrap();
        assert_eq!(geometry.centroid, Point::new(3.0, 0.0));
    }
}
