//! Edge-gradient vertex snapping ("attention correction").
//!
//! Each polygon vertex is moved by at most one pixel per axis towards the
//! strongest mixed-derivative response in a 3x3 window. The pass is local and
//! single-shot: it can land on an unrelated local maximum in low-contrast
//! areas and makes no attempt to converge on a true edge.

use image::{GrayImage, imageops};
use tracing::debug;

use crate::{
    annotation::PolygonAnnotation,
    error::Result,
    traits::{CoordinateTransform, ImagePreprocessor},
    types::{Bounds, Point2D},
};
use super::preprocessing::{CrossDerivativeMagnitude, GaussianBlur3x3};

/// Padding around the polygon bounding box, in pixels
pub const ROI_MARGIN: i64 = 5;

/// Side of the square search window, in pixels
pub const SEARCH_WINDOW: i64 = 3;

/// Region of interest in raster pixel coordinates (half-open)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionOfInterest {
    pub min_x: i64,
    pub min_y: i64,
    pub max_x: i64,
    pub max_y: i64,
}

impl RegionOfInterest {
    /// Padded bounding box of the vertices, clipped to a `width` x `height` raster
    pub fn around(vertices: &[Point2D], width: u32, height: u32) -> Option<Self> {
        let bounds = Bounds::of(vertices)?;
        let roi = Self {
            min_x: (bounds.min.x.trunc() as i64).saturating_sub(ROI_MARGIN).max(0),
            min_y: (bounds.min.y.trunc() as i64).saturating_sub(ROI_MARGIN).max(0),
            max_x: (bounds.max.x.trunc() as i64)
                .saturating_add(ROI_MARGIN)
                .min(i64::from(width)),
            max_y: (bounds.max.y.trunc() as i64)
                .saturating_add(ROI_MARGIN)
                .min(i64::from(height)),
        };
        (!roi.is_empty()).then_some(roi)
    }

    pub fn width(&self) -> i64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> i64 {
        self.max_y - self.min_y
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    fn crop(&self, image: &GrayImage) -> GrayImage {
        imageops::crop_imm(
            image,
            self.min_x as u32,
            self.min_y as u32,
            self.width() as u32,
            self.height() as u32,
        )
        .to_image()
    }
}

/// Result of refining one polygon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineOutcome {
    /// Region was processed; `moved` vertices changed position
    Refined { moved: usize },
    /// Clipped region was empty; polygon left untouched
    EmptyRegion,
}

/// Snaps vertices to local maxima of a gradient image computed by a
/// smoothing stage followed by a gradient stage.
#[derive(Debug, Clone, Default)]
pub struct GradientSnapper<S, G>
where
    S: ImagePreprocessor,
    G: ImagePreprocessor,
{
    pub smoothing: S,
    pub gradient: G,
}

/// The fixed 3x3 Gaussian + mixed-derivative configuration
pub type AttentionRefiner = GradientSnapper<GaussianBlur3x3, CrossDerivativeMagnitude>;

impl<S, G> GradientSnapper<S, G>
where
    S: ImagePreprocessor,
    G: ImagePreprocessor,
{
    pub fn new(smoothing: S, gradient: G) -> Self {
        Self { smoothing, gradient }
    }

    /// Refined copy of `vertices`, or `None` when the clipped region is empty
    pub fn refine_vertices(&self, gray: &GrayImage, vertices: &[Point2D]) -> Result<Option<Vec<Point2D>>> {
        let Some(roi) = RegionOfInterest::around(vertices, gray.width(), gray.height()) else {
            return Ok(None);
        };

        let region = roi.crop(gray);
        let magnitude = self.gradient.preprocess(&self.smoothing.preprocess(&region)?)?;

        let refined = vertices
            .iter()
            .map(|&vertex| snap_vertex(&magnitude, &roi, vertex))
            .collect();

        Ok(Some(refined))
    }

    /// Refine a polygon in place, keeping its map geometry in sync
    pub fn refine_polygon<T>(
        &self,
        gray: &GrayImage,
        polygon: &mut PolygonAnnotation,
        transform: &T,
    ) -> Result<RefineOutcome>
    where
        T: CoordinateTransform + ?Sized,
    {
        let Some(refined) = self.refine_vertices(gray, polygon.vertices_px())? else {
            debug!("Skipping '{}': region of interest is empty", polygon.label());
            return Ok(RefineOutcome::EmptyRegion);
        };

        let moved = polygon
            .vertices_px()
            .iter()
            .zip(&refined)
            .filter(|(before, after)| before != after)
            .count();

        polygon.set_geometry(refined, transform)?;
        Ok(RefineOutcome::Refined { moved })
    }
}

/// Move one vertex to the strongest response in the window whose top-left is
/// the vertex's truncated region-local position, offset back by one pixel.
fn snap_vertex(magnitude: &GrayImage, roi: &RegionOfInterest, vertex: Point2D) -> Point2D {
    let local_x = (vertex.x.trunc() as i64).saturating_sub(roi.min_x);
    let local_y = (vertex.y.trunc() as i64).saturating_sub(roi.min_y);
    let width = i64::from(magnitude.width());
    let height = i64::from(magnitude.height());

    if local_x < 0 || local_y < 0 || local_x >= width || local_y >= height {
        return vertex;
    }

    let end_x = (local_x + SEARCH_WINDOW).min(width);
    let end_y = (local_y + SEARCH_WINDOW).min(height);

    // First maximum in row-major order wins
    let mut best = (0i64, 0i64);
    let mut best_value = None;
    for y in local_y..end_y {
        for x in local_x..end_x {
            let value = magnitude.get_pixel(x as u32, y as u32)[0];
            if best_value.is_none_or(|current| value > current) {
                best_value = Some(value);
                best = (x - local_x, y - local_y);
            }
        }
    }

    Point2D::new(vertex.x + best.0 as f64 - 1.0, vertex.y + best.1 as f64 - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{AffineGeoreference, TransformAdapter};
    use image::Luma;

    fn magnitude_with_peak(width: u32, height: u32, peak: (u32, u32)) -> GrayImage {
        let mut image = GrayImage::new(width, height);
        image.put_pixel(peak.0, peak.1, Luma([200u8]));
        image
    }

    fn full_roi(image: &GrayImage) -> RegionOfInterest {
        RegionOfInterest {
            min_x: 0,
            min_y: 0,
            max_x: i64::from(image.width()),
            max_y: i64::from(image.height()),
        }
    }

    fn bright_square() -> GrayImage {
        let mut img = GrayImage::new(60, 60);
        for y in 20..40 {
            for x in 20..40 {
                img.put_pixel(x, y, Luma([255u8]));
            }
        }
        img
    }

    #[test]
    fn test_snap_moves_at_most_one_pixel() {
        let magnitude = magnitude_with_peak(10, 10, (6, 6));
        let roi = full_roi(&magnitude);

        // Window spans [4, 7) so the peak sits at offset (2, 2)
        let snapped = snap_vertex(&magnitude, &roi, Point2D::new(4.3, 4.6));
        assert_eq!(snapped, Point2D::new(5.3, 5.6));
    }

    #[test]
    fn test_snap_flat_window_moves_up_left() {
        let magnitude = GrayImage::new(10, 10);
        let roi = full_roi(&magnitude);
        let snapped = snap_vertex(&magnitude, &roi, Point2D::new(5.0, 5.0));
        assert_eq!(snapped, Point2D::new(4.0, 4.0));
    }

    #[test]
    fn test_snap_outside_region_unchanged() {
        let magnitude = GrayImage::new(10, 10);
        let roi = full_roi(&magnitude);
        for vertex in [Point2D::new(12.0, 3.0), Point2D::new(-2.5, 3.0)] {
            assert_eq!(snap_vertex(&magnitude, &roi, vertex), vertex);
        }
    }

    #[test]
    fn test_roi_is_padded_and_clipped() {
        let vertices = vec![Point2D::new(3.7, 10.2), Point2D::new(30.9, 18.0), Point2D::new(12.0, 57.5)];
        let roi = RegionOfInterest::around(&vertices, 40, 60).expect("Should be non-empty");
        assert_eq!(roi, RegionOfInterest { min_x: 0, min_y: 5, max_x: 35, max_y: 60 });
    }

    #[test]
    fn test_polygon_outside_raster_is_unchanged() {
        let tf = TransformAdapter::identity();
        let vertices = vec![Point2D::new(100.0, 100.0), Point2D::new(120.0, 100.0), Point2D::new(110.0, 120.0)];
        let mut polygon = PolygonAnnotation::new(vertices.clone(), "far", &tf).unwrap();

        let outcome = AttentionRefiner::default()
            .refine_polygon(&bright_square(), &mut polygon, &tf)
            .expect("Should not fail");

        assert_eq!(outcome, RefineOutcome::EmptyRegion);
        assert_eq!(polygon.vertices_px(), vertices.as_slice());
    }

    #[test]
    fn test_far_out_vertices_do_not_overflow() {
        let vertices = vec![Point2D::new(20.0, 20.0), Point2D::new(1e19, 25.0), Point2D::new(-1e19, 40.0)];
        let roi = RegionOfInterest::around(&vertices, 60, 60).expect("Should be non-empty");
        assert_eq!(roi, RegionOfInterest { min_x: 0, min_y: 15, max_x: 60, max_y: 45 });

        let refined = AttentionRefiner::default()
            .refine_vertices(&bright_square(), &vertices)
            .unwrap()
            .expect("Region should be non-empty");
        assert_eq!(refined[1], vertices[1]);
        assert_eq!(refined[2], vertices[2]);
    }

    #[test]
    fn test_refine_keeps_map_geometry_in_sync() {
        let tf = TransformAdapter::new(AffineGeoreference::from_origin(1000.0, 2000.0, 2.0, -2.0).unwrap());
        let vertices = vec![Point2D::new(21.0, 21.0), Point2D::new(38.0, 21.0), Point2D::new(38.0, 38.0), Point2D::new(21.0, 38.0)];
        let mut polygon = PolygonAnnotation::new(vertices.clone(), "square", &tf).unwrap();

        let outcome = AttentionRefiner::default()
            .refine_polygon(&bright_square(), &mut polygon, &tf)
            .unwrap();
        assert!(matches!(outcome, RefineOutcome::Refined { .. }));

        for (before, after) in vertices.iter().zip(polygon.vertices_px()) {
            assert!((before.x - after.x).abs() <= 1.0);
            assert!((before.y - after.y).abs() <= 1.0);
        }
        assert_eq!(polygon.vertices_map(), tf.points_to_map(polygon.vertices_px()).as_slice());
    }

    #[test]
    fn test_refine_snaps_towards_corner() {
        let vertices = vec![Point2D::new(17.0, 17.0), Point2D::new(45.0, 18.0), Point2D::new(30.0, 45.0)];
        let refined = AttentionRefiner::default()
            .refine_vertices(&bright_square(), &vertices)
            .unwrap()
            .expect("Region should be non-empty");

        // Inside the window spanning [17, 20) the blurred corner responds
        // most strongly at (19, 19)
        assert_eq!(refined[0], Point2D::new(18.0, 18.0));
    }
}
