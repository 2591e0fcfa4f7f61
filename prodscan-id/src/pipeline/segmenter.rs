//! Region segmentation
//!
//! Converts object-localization hints into pixel crop regions. Detector boxes
//! tend to clip the edges of packaging, so each box is grown by a margin
//! proportional to its own size before clamping to the image.

use crate::types::{ImageDimensions, LocalizedObjectAnnotation, Region};

/// Margin added on each side, as a fraction of the box's width/height
pub const MARGIN_RATIO: f64 = 0.1;

/// Maps localized objects to crop regions
#[derive(Debug, Clone)]
pub struct RegionSegmenter {
    margin_ratio: f64,
}

impl Default for RegionSegmenter {
    fn default() -> Self {
        Self::new(MARGIN_RATIO)
    }
}

impl RegionSegmenter {
    pub fn new(margin_ratio: f64) -> Self {
        Self {
            margin_ratio: margin_ratio.max(0.0),
        }
    }

    /// Produce one region per detected object, in detection order
    ///
    /// With no detections the whole image is a single region, so there is
    /// always at least one region to analyze.
    pub fn segment(
        &self,
        dimensions: ImageDimensions,
        objects: &[LocalizedObjectAnnotation],
    ) -> Vec<Region> {
        if objects.is_empty() {
            return vec![Region::full(dimensions)];
        }

        objects
            .iter()
            .map(|object| self.object_region(dimensions, object))
            .collect()
    }

    fn object_region(
        &self,
        dimensions: ImageDimensions,
        object: &LocalizedObjectAnnotation,
    ) -> Region {
        let vertices = &object.bounding_poly.normalized_vertices;
        if vertices.is_empty() {
            return Region::full(dimensions);
        }

        let width = dimensions.width as f64;
        let height = dimensions.height as f64;

        let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
        for vertex in vertices {
            let x = vertex.x * width;
            let y = vertex.y * height;
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }

        let left = min_x.clamp(0.0, width);
        let right = max_x.clamp(0.0, width);
        let top = min_y.clamp(0.0, height);
        let bottom = max_y.clamp(0.0, height);

        let pad_x = ((right - left) * self.margin_ratio).floor();
        let pad_y = ((bottom - top) * self.margin_ratio).floor();

        let left = (left - pad_x).max(0.0);
        let right = (right + pad_x).min(width);
        let top = (top - pad_y).max(0.0);
        let bottom = (bottom + pad_y).min(height);

        // floor(left) + floor(right - left) <= right, so the region stays in bounds
        Region {
            left: left.floor() as u32,
            top: top.floor() as u32,
            width: (right - left).floor() as u32,
            height: (bottom - top).floor() as u32,
        }
    }
}
