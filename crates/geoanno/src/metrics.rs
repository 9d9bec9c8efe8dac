//! Area and perimeter of closed rings, planar or on the WGS84 ellipsoid.
//!
//! Which one applies is decided per ring by [`looks_like_lon_lat`]. That
//! check is purely numeric: a projected CRS whose coordinates happen to fall
//! inside [-180, 180] x [-90, 90] (small local grids, for example) is
//! classified as geographic. This is a known limitation.

use geo::GeodesicArea;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::{Point2D, to_geo_polygon};

/// Fewer vertices than this measure as zero
pub const MIN_RING_VERTICES: usize = 3;

/// Measured area and perimeter of a ring
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct RingMetrics {
    /// Square map units (square metres for geodesic rings)
    pub area: f64,
    /// Map units (metres for geodesic rings)
    pub perimeter: f64,
}

impl RingMetrics {
    pub const ZERO: RingMetrics = RingMetrics { area: 0.0, perimeter: 0.0 };
}

impl From<(f64, f64)> for RingMetrics {
    fn from((area, perimeter): (f64, f64)) -> Self {
        Self { area, perimeter }
    }
}

/// How a ring's coordinates are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MetricKind {
    Planar,
    Geodesic,
}

/// Shoelace area plus Euclidean perimeter, closing the ring by wraparound
pub fn planar_area_perimeter(points: &[Point2D]) -> RingMetrics {
    let n = points.len();
    if n < MIN_RING_VERTICES {
        return RingMetrics::ZERO;
    }

    let mut twice_area = 0.0;
    let mut perimeter = 0.0;
    for i in 0..n {
        let p1 = points[i];
        let p2 = points[(i + 1) % n];
        twice_area += p1.x * p2.y - p2.x * p1.y;
        perimeter += p1.distance(&p2);
    }

    RingMetrics {
        area: twice_area.abs() * 0.5,
        perimeter,
    }
}

/// Stateless geodesic service on the WGS84 ellipsoid
#[derive(Debug, Clone, Copy, Default)]
pub struct Wgs84Geodesy;

impl Wgs84Geodesy {
    /// Ellipsoidal area (m²) and perimeter (m) of a lon/lat ring given as
    /// parallel sequences. The ring is closed explicitly before measuring.
    pub fn area_perimeter(&self, lon: &[f64], lat: &[f64]) -> RingMetrics {
        let mut ring: Vec<Point2D> = lon
            .iter()
            .zip(lat)
            .map(|(&x, &y)| Point2D::new(x, y))
            .collect();

        if ring.len() < MIN_RING_VERTICES {
            return RingMetrics::ZERO;
        }

        let first = ring[0];
        if ring.last() != Some(&first) {
            ring.push(first);
        }

        // The unsigned variant treats clockwise rings as the complement of the globe
        let (perimeter, area) = to_geo_polygon(&ring).geodesic_perimeter_area_signed();
        RingMetrics { area: area.abs(), perimeter }
    }

    /// Same as [`Wgs84Geodesy::area_perimeter`] over `(lon, lat)` points
    pub fn ring_area_perimeter(&self, points: &[Point2D]) -> RingMetrics {
        let (lon, lat): (Vec<f64>, Vec<f64>) = points.iter().map(|p| (p.x, p.y)).unzip();
        self.area_perimeter(&lon, &lat)
    }
}

/// Geodesic area/perimeter over parallel longitude/latitude sequences
pub fn geodesic_area_perimeter(lon: &[f64], lat: &[f64]) -> RingMetrics {
    Wgs84Geodesy.area_perimeter(lon, lat)
}

/// True when every x is in [-180, 180] and every y in [-90, 90]
pub fn looks_like_lon_lat(points: &[Point2D]) -> bool {
    points
        .iter()
        .all(|p| (-180.0..=180.0).contains(&p.x) && (-90.0..=90.0).contains(&p.y))
}

pub fn classify(points: &[Point2D]) -> MetricKind {
    if looks_like_lon_lat(points) {
        MetricKind::Geodesic
    } else {
        MetricKind::Planar
    }
}

/// Classify the ring and measure it accordingly
pub fn measure_ring(geodesy: &Wgs84Geodesy, points: &[Point2D]) -> (MetricKind, RingMetrics) {
    let kind = classify(points);
    let metrics = match kind {
        MetricKind::Geodesic => geodesy.ring_area_perimeter(points),
        MetricKind::Planar => planar_area_perimeter(points),
    };
    (kind, metrics)
}
