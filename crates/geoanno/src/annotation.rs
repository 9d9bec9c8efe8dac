//! Rectangle and polygon annotation entities.
//!
//! Each entity keeps its geometry twice: in pixel space for editing and in
//! map space for persistence. Every pixel-space mutation goes through a
//! method that takes the active transform and recomputes the map-space form
//! in the same call, so the two never drift apart.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::{
    error::{GeoAnnoError, Result},
    metrics::MIN_RING_VERTICES,
    traits::CoordinateTransform,
    types::{Bounds, Point2D},
};

/// Persisted form of an annotation, in map-space units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type")]
pub enum AnnotationRecord {
    /// Top-left map coordinate plus signed width/height
    #[serde(rename = "rect")]
    Rect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        #[serde(default)]
        label: String,
    },
    #[serde(rename = "poly")]
    Poly {
        points: Vec<Point2D>,
        #[serde(default)]
        label: String,
    },
}

impl AnnotationRecord {
    pub fn label(&self) -> &str {
        match self {
            AnnotationRecord::Rect { label, .. } | AnnotationRecord::Poly { label, .. } => label,
        }
    }

    /// Polygon ring in map units, `None` for rectangles
    pub fn polygon_points(&self) -> Option<&[Point2D]> {
        match self {
            AnnotationRecord::Poly { points, .. } => Some(points),
            AnnotationRecord::Rect { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RectangleAnnotation {
    label: String,
    /// Normalised corners: min then max
    corners_px: [Point2D; 2],
    top_left_map: Point2D,
    bottom_right_map: Point2D,
}

impl RectangleAnnotation {
    /// Build from two opposite pixel corners, in any order
    pub fn new<T>(corner_a: Point2D, corner_b: Point2D, label: impl Into<String>, transform: &T) -> Self
    where
        T: CoordinateTransform + ?Sized,
    {
        let mut rect = Self {
            label: label.into(),
            corners_px: [Point2D::default(); 2],
            top_left_map: Point2D::default(),
            bottom_right_map: Point2D::default(),
        };
        rect.set_corners(corner_a, corner_b, transform);
        rect
    }

    /// Replace the pixel corners and recompute the map-space corners
    pub fn set_corners<T>(&mut self, corner_a: Point2D, corner_b: Point2D, transform: &T)
    where
        T: CoordinateTransform + ?Sized,
    {
        let min = Point2D::new(corner_a.x.min(corner_b.x), corner_a.y.min(corner_b.y));
        let max = Point2D::new(corner_a.x.max(corner_b.x), corner_a.y.max(corner_b.y));
        self.corners_px = [min, max];
        self.top_left_map = transform.pixel_to_map(min.x, min.y).into();
        self.bottom_right_map = transform.pixel_to_map(max.x, max.y).into();
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn corners_px(&self) -> [Point2D; 2] {
        self.corners_px
    }

    pub fn top_left_map(&self) -> Point2D {
        self.top_left_map
    }

    pub fn bottom_right_map(&self) -> Point2D {
        self.bottom_right_map
    }

    /// Signed map-space width; negative when the x axis is flipped
    pub fn map_width(&self) -> f64 {
        self.bottom_right_map.x - self.top_left_map.x
    }

    /// Signed map-space height; negative for north-up rasters
    pub fn map_height(&self) -> f64 {
        self.bottom_right_map.y - self.top_left_map.y
    }

    pub fn to_record(&self) -> AnnotationRecord {
        AnnotationRecord::Rect {
            x: self.top_left_map.x,
            y: self.top_left_map.y,
            w: self.map_width(),
            h: self.map_height(),
            label: self.label.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolygonAnnotation {
    label: String,
    vertices_px: Vec<Point2D>,
    vertices_map: Vec<Point2D>,
}

impl PolygonAnnotation {
    /// Build from an ordered pixel ring of at least three vertices
    pub fn new<T>(vertices_px: Vec<Point2D>, label: impl Into<String>, transform: &T) -> Result<Self>
    where
        T: CoordinateTransform + ?Sized,
    {
        let mut polygon = Self {
            label: label.into(),
            vertices_px: Vec::new(),
            vertices_map: Vec::new(),
        };
        polygon.set_geometry(vertices_px, transform)?;
        Ok(polygon)
    }

    /// Replace the pixel ring and recompute the map ring from it
    pub fn set_geometry<T>(&mut self, vertices_px: Vec<Point2D>, transform: &T) -> Result<()>
    where
        T: CoordinateTransform + ?Sized,
    {
        if vertices_px.len() < MIN_RING_VERTICES {
            return Err(GeoAnnoError::InvalidGeometry(format!(
                "polygon needs at least {MIN_RING_VERTICES} vertices, got {}",
                vertices_px.len()
            )));
        }
        self.vertices_map = transform.points_to_map(&vertices_px);
        self.vertices_px = vertices_px;
        Ok(())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn vertices_px(&self) -> &[Point2D] {
        &self.vertices_px
    }

    pub fn vertices_map(&self) -> &[Point2D] {
        &self.vertices_map
    }

    pub fn bounds_px(&self) -> Bounds {
        // set_geometry guarantees a non-empty ring
        Bounds::of(&self.vertices_px).unwrap_or(Bounds {
            min: Point2D::default(),
            max: Point2D::default(),
        })
    }

    /// Rectangle annotation covering the pixel bounding box of this polygon
    pub fn bounding_rect<T>(&self, transform: &T) -> RectangleAnnotation
    where
        T: CoordinateTransform + ?Sized,
    {
        let bounds = self.bounds_px();
        RectangleAnnotation::new(bounds.min, bounds.max, self.label.clone(), transform)
    }

    pub fn to_record(&self) -> AnnotationRecord {
        AnnotationRecord::Poly {
            points: self.vertices_map.clone(),
            label: self.label.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Annotation {
    Rectangle(RectangleAnnotation),
    Polygon(PolygonAnnotation),
}

impl Annotation {
    pub fn label(&self) -> &str {
        match self {
            Annotation::Rectangle(rect) => rect.label(),
            Annotation::Polygon(poly) => poly.label(),
        }
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        let label = label.into();
        match self {
            Annotation::Rectangle(rect) => rect.label = label,
            Annotation::Polygon(poly) => poly.label = label,
        }
    }

    /// Pixel geometry: two corners for rectangles, the ring for polygons
    pub fn geometry_px(&self) -> Vec<Point2D> {
        match self {
            Annotation::Rectangle(rect) => rect.corners_px.to_vec(),
            Annotation::Polygon(poly) => poly.vertices_px.clone(),
        }
    }

    /// Map geometry: top-left/bottom-right for rectangles, the ring for polygons
    pub fn geometry_map(&self) -> Vec<Point2D> {
        match self {
            Annotation::Rectangle(rect) => vec![rect.top_left_map, rect.bottom_right_map],
            Annotation::Polygon(poly) => poly.vertices_map.clone(),
        }
    }

    /// Replace pixel geometry and resynchronise map geometry.
    /// Rectangles take exactly two corners, polygons at least three vertices.
    pub fn set_geometry<T>(&mut self, points_px: Vec<Point2D>, transform: &T) -> Result<()>
    where
        T: CoordinateTransform + ?Sized,
    {
        match self {
            Annotation::Rectangle(rect) => match points_px.as_slice() {
                [a, b] => {
                    rect.set_corners(*a, *b, transform);
                    Ok(())
                }
                _ => Err(GeoAnnoError::InvalidGeometry(format!(
                    "rectangle needs 2 corners, got {}",
                    points_px.len()
                ))),
            },
            Annotation::Polygon(poly) => poly.set_geometry(points_px, transform),
        }
    }

    /// Move the annotation by a pixel offset
    pub fn translate_px<T>(&mut self, dx: f64, dy: f64, transform: &T) -> Result<()>
    where
        T: CoordinateTransform + ?Sized,
    {
        let moved = self
            .geometry_px()
            .into_iter()
            .map(|p| Point2D::new(p.x + dx, p.y + dy))
            .collect();
        self.set_geometry(moved, transform)
    }

    pub fn as_polygon(&self) -> Option<&PolygonAnnotation> {
        match self {
            Annotation::Polygon(poly) => Some(poly),
            Annotation::Rectangle(_) => None,
        }
    }

    pub fn as_polygon_mut(&mut self) -> Option<&mut PolygonAnnotation> {
        match self {
            Annotation::Polygon(poly) => Some(poly),
            Annotation::Rectangle(_) => None,
        }
    }

    pub fn serialize(&self) -> AnnotationRecord {
        match self {
            Annotation::Rectangle(rect) => rect.to_record(),
            Annotation::Polygon(poly) => poly.to_record(),
        }
    }

    /// Rebuild an annotation from its record, recovering pixel geometry
    /// through `map_to_pixel`. Map geometry is taken from the record as-is.
    pub fn deserialize<T>(record: &AnnotationRecord, transform: &T) -> Result<Self>
    where
        T: CoordinateTransform + ?Sized,
    {
        match record {
            AnnotationRecord::Rect { x, y, w, h, label } => {
                let top_left_map = Point2D::new(*x, *y);
                let bottom_right_map = Point2D::new(x + w, y + h);
                let a: Point2D = transform.map_to_pixel(top_left_map.x, top_left_map.y).into();
                let b: Point2D = transform.map_to_pixel(bottom_right_map.x, bottom_right_map.y).into();

                Ok(Annotation::Rectangle(RectangleAnnotation {
                    label: label.clone(),
                    corners_px: [
                        Point2D::new(a.x.min(b.x), a.y.min(b.y)),
                        Point2D::new(a.x.max(b.x), a.y.max(b.y)),
                    ],
                    top_left_map,
                    bottom_right_map,
                }))
            }
            AnnotationRecord::Poly { points, label } => {
                if points.len() < MIN_RING_VERTICES {
                    return Err(GeoAnnoError::InvalidGeometry(format!(
                        "polygon record '{label}' has {} points",
                        points.len()
                    )));
                }
                Ok(Annotation::Polygon(PolygonAnnotation {
                    label: label.clone(),
                    vertices_px: transform.points_to_pixel(points),
                    vertices_map: points.clone(),
                }))
            }
        }
    }
}

impl From<RectangleAnnotation> for Annotation {
    fn from(rect: RectangleAnnotation) -> Self {
        Annotation::Rectangle(rect)
    }
}

impl From<PolygonAnnotation> for Annotation {
    fn from(poly: PolygonAnnotation) -> Self {
        Annotation::Polygon(poly)
    }
}
