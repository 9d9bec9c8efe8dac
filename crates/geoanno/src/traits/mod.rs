use image::GrayImage;
use crate::{error::Result, types::Point2D};

/// Trait for single-channel image filtering stages
pub trait ImagePreprocessor: Send + Sync {
    /// Filter the input image (e.g., blur, gradient magnitude)
    fn preprocess(&self, image: &GrayImage) -> Result<GrayImage>;
}

/// Bidirectional mapping between pixel (column, row) space and map space.
///
/// Both directions are total: out-of-bounds coordinates are mapped like any
/// other, and `map_to_pixel(pixel_to_map(p))` returns `p` up to rounding.
pub trait CoordinateTransform {
    fn pixel_to_map(&self, col: f64, row: f64) -> (f64, f64);

    fn map_to_pixel(&self, x: f64, y: f64) -> (f64, f64);

    /// Map every point of a pixel-space sequence independently
    fn points_to_map(&self, points: &[Point2D]) -> Vec<Point2D> {
        points
            .iter()
            .map(|p| self.pixel_to_map(p.x, p.y).into())
            .collect()
    }

    /// Map every point of a map-space sequence back to pixel space
    fn points_to_pixel(&self, points: &[Point2D]) -> Vec<Point2D> {
        points
            .iter()
            .map(|p| self.map_to_pixel(p.x, p.y).into())
            .collect()
    }
}
