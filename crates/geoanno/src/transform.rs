//! Pixel ↔ map coordinate conversion.
//!
//! The affine follows the usual six-coefficient georeferencing layout:
//!
//! ```text
//! x = c + a * col + b * row
//! y = f + d * col + e * row
//! ```
//!
//! so rotation, shear and non-square pixels are all representable.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
    error::{GeoAnnoError, Result},
    traits::CoordinateTransform,
};

/// Which point of a pixel cell `pixel_to_map` refers to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default,
    Serialize, Deserialize, JsonSchema, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PixelAnchor {
    /// Pixel (col, row) maps to the centre of the cell
    #[default]
    Center,
    /// Pixel (col, row) maps to the upper-left corner of the cell
    UpperLeft,
}

impl PixelAnchor {
    fn offset(self) -> f64 {
        match self {
            PixelAnchor::Center => 0.5,
            PixelAnchor::UpperLeft => 0.0,
        }
    }
}

/// An invertible affine mapping from pixel space to a map CRS
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AffineGeoreference {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl AffineGeoreference {
    /// Create a georeference, rejecting singular matrices
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Result<Self> {
        let affine = Self { a, b, c, d, e, f };
        let det = affine.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(GeoAnnoError::InvalidGeometry(format!(
                "affine georeference is not invertible (determinant {det})"
            )));
        }
        Ok(affine)
    }

    /// North-up georeference from an origin and cell size.
    /// `pixel_height` is usually negative (rows grow southwards).
    pub fn from_origin(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Result<Self> {
        Self::new(pixel_width, 0.0, origin_x, 0.0, pixel_height, origin_y)
    }

    /// Build from a GDAL geotransform `[c, a, b, f, d, e]`
    pub fn from_gdal(gt: [f64; 6]) -> Result<Self> {
        Self::new(gt[1], gt[2], gt[0], gt[4], gt[5], gt[3])
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.c + self.a * col + self.b * row,
            self.f + self.d * col + self.e * row,
        )
    }

    pub fn apply_inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.determinant();
        let dx = x - self.c;
        let dy = y - self.f;
        (
            (self.e * dx - self.b * dy) / det,
            (self.a * dy - self.d * dx) / det,
        )
    }
}

/// Adapter over an optional georeference. Without one, map space is pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct TransformAdapter {
    affine: Option<AffineGeoreference>,
    anchor: PixelAnchor,
}

impl TransformAdapter {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn new(affine: AffineGeoreference) -> Self {
        Self {
            affine: Some(affine),
            anchor: PixelAnchor::default(),
        }
    }

    pub fn with_anchor(mut self, anchor: PixelAnchor) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn affine(&self) -> Option<&AffineGeoreference> {
        self.affine.as_ref()
    }

    pub fn anchor(&self) -> PixelAnchor {
        self.anchor
    }

    pub fn is_identity(&self) -> bool {
        self.affine.is_none()
    }
}

impl From<Option<AffineGeoreference>> for TransformAdapter {
    fn from(affine: Option<AffineGeoreference>) -> Self {
        Self {
            affine,
            anchor: PixelAnchor::default(),
        }
    }
}

impl CoordinateTransform for TransformAdapter {
    fn pixel_to_map(&self, col: f64, row: f64) -> (f64, f64) {
        match &self.affine {
            Some(affine) => {
                let offset = self.anchor.offset();
                affine.apply(col + offset, row + offset)
            }
            None => (col, row),
        }
    }

    fn map_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        match &self.affine {
            Some(affine) => {
                let offset = self.anchor.offset();
                let (col, row) = affine.apply_inverse(x, y);
                (col - offset, row - offset)
            }
            None => (x, y),
        }
    }
}
