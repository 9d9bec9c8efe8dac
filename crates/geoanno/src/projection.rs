//! Reprojection of map coordinates to WGS84 longitude/latitude.

use std::f64::consts::PI;

use proj4rs::{proj::Proj, transform::transform};

use crate::{
    error::{GeoAnnoError, Result},
    raster::Crs,
    types::Point2D,
};

pub const EPSG_WGS84: u32 = 4326;
pub const EPSG_WEB_MERCATOR: u32 = 3857;

const WGS84_PROJ: &str = "+proj=longlat +datum=WGS84 +no_defs";
const HALF_EARTH: f64 = 20_037_508.342_789_244;

/// proj string for the EPSG codes this crate knows about
pub fn get_proj_string(epsg: u32) -> Option<String> {
    let proj = match epsg {
        EPSG_WGS84 => WGS84_PROJ.to_string(),
        // NAD83, ETRS89: GRS80 with a null datum shift
        4269 | 4258 => "+proj=longlat +ellps=GRS80 +towgs84=0,0,0 +no_defs".to_string(),
        EPSG_WEB_MERCATOR => {
            "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs".to_string()
        }
        // RGF93 / Lambert-93
        2154 => "+proj=lcc +lat_0=46.5 +lon_0=3 +lat_1=49 +lat_2=44 +x_0=700000 +y_0=6600000 \
                 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs"
            .to_string(),
        32601..=32660 => format!("+proj=utm +zone={} +datum=WGS84 +units=m +no_defs", epsg - 32600),
        32701..=32760 => format!("+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs", epsg - 32700),
        // NAD83 / UTM zones 1N-23N
        26901..=26923 => format!("+proj=utm +zone={} +ellps=GRS80 +towgs84=0,0,0 +units=m +no_defs", epsg - 26900),
        // ETRS89 / UTM zones 28N-38N
        25828..=25838 => format!("+proj=utm +zone={} +ellps=GRS80 +towgs84=0,0,0 +units=m +no_defs", epsg - 25800),
        _ => return None,
    };
    Some(proj)
}

/// Whether an EPSG code names a geographic (degree-based) CRS
pub fn is_geographic_crs(epsg: u32) -> bool {
    matches!(epsg, EPSG_WGS84 | 4269 | 4258)
}

enum TransformStrategy {
    /// Source is already WGS84
    Identity,
    /// Closed-form spherical Mercator inverse
    FastMercToGeo,
    Proj4rs { source: Box<Proj>, target: Box<Proj>, source_is_geographic: bool },
}

/// Converts coordinates from a source CRS to WGS84 (EPSG:4326)
///
/// Only a fixed set of EPSG codes is understood: 4326, 4269, 4258, 3857,
/// 2154, WGS84 UTM (32601-32660, 32701-32760), NAD83 UTM (26901-26923) and
/// ETRS89 UTM (25828-25838). Any other code fails with
/// [`GeoAnnoError::UnsupportedCrs`].
pub struct Wgs84Reprojector {
    source: Crs,
    strategy: TransformStrategy,
}

impl std::fmt::Debug for Wgs84Reprojector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wgs84Reprojector")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl Wgs84Reprojector {
    pub fn new(source: Crs) -> Result<Self> {
        let strategy = match source.epsg {
            EPSG_WGS84 => TransformStrategy::Identity,
            EPSG_WEB_MERCATOR => TransformStrategy::FastMercToGeo,
            epsg => {
                let source_str = get_proj_string(epsg).ok_or(GeoAnnoError::UnsupportedCrs(epsg))?;
                let source_proj = Proj::from_proj_string(&source_str)
                    .map_err(|e| GeoAnnoError::Projection(format!("EPSG:{epsg}: {e:?}")))?;
                let target_proj = Proj::from_proj_string(WGS84_PROJ)
                    .map_err(|e| GeoAnnoError::Projection(format!("EPSG:{EPSG_WGS84}: {e:?}")))?;
                TransformStrategy::Proj4rs {
                    source: Box::new(source_proj),
                    target: Box::new(target_proj),
                    source_is_geographic: is_geographic_crs(epsg),
                }
            }
        };
        Ok(Self { source, strategy })
    }

    pub fn source(&self) -> Crs {
        self.source
    }

    /// Transform one coordinate to (longitude, latitude) in degrees
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        match &self.strategy {
            TransformStrategy::Identity => Ok((x, y)),
            TransformStrategy::FastMercToGeo => Ok((merc_x_to_lon(x), merc_y_to_lat(y))),
            TransformStrategy::Proj4rs { source, target, source_is_geographic } => {
                let mut point = if *source_is_geographic {
                    (x.to_radians(), y.to_radians(), 0.0)
                } else {
                    (x, y, 0.0)
                };
                transform(source, target, &mut point)
                    .map_err(|e| GeoAnnoError::Projection(format!("{} -> EPSG:4326: {e:?}", self.source)))?;
                Ok((point.0.to_degrees(), point.1.to_degrees()))
            }
        }
    }

    pub fn transform_points(&self, points: &[Point2D]) -> Result<Vec<Point2D>> {
        points
            .iter()
            .map(|p| self.transform(p.x, p.y).map(Point2D::from))
            .collect()
    }
}

fn merc_x_to_lon(x: f64) -> f64 {
    x / HALF_EARTH * 180.0
}

fn merc_y_to_lat(y: f64) -> f64 {
    let y_rad = y * PI / HALF_EARTH;
    (2.0 * y_rad.exp().atan() - PI / 2.0).to_degrees()
}
