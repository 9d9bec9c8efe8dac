//! # Raster Annotation Geometry Library
//!
//! Georeferenced rectangle and polygon annotations over raster images, with
//! the geometry work that goes with them: pixel ↔ map conversion, planar and
//! geodesic area/perimeter, gradient-based vertex refinement, and folder-wide
//! batch export to stats tables and WGS84 shapefiles.
//!
//! ## Core Features
//!
//! - **Dual geometry**: every annotation keeps pixel and map coordinates in sync
//! - **GeoTIFF georeferencing**: affine and EPSG code read from GeoTIFF tags
//! - **Metrics**: shoelace area for projected rings, ellipsoidal for lon/lat
//! - **Refinement**: snap polygon vertices to local gradient maxima
//! - **Batch export**: xlsx/CSV stats and polygon shapefiles for whole folders
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use geoanno::{AnnotationSession, GeoAnnoConfig, Point2D};
//!
//! let mut session = AnnotationSession::new(GeoAnnoConfig::default());
//! session.load_raster("scene.tif")?;
//!
//! let vertices = vec![
//!     Point2D::new(10.0, 10.0),
//!     Point2D::new(80.0, 12.0),
//!     Point2D::new(45.0, 70.0),
//! ];
//! session.add_polygon(vertices, "field")?;
//! session.refine()?;
//! session.save(None)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Batch Processing
//!
//! ```rust,no_run
//! use std::path::Path;
//! use geoanno::{batch_shapefiles, batch_stats, BatchOutcome, Crs};
//!
//! let folder = Path::new("annotations");
//! if let BatchOutcome::Completed(summary) = batch_stats(folder, "stats_area_perimeter.csv")? {
//!     println!("measured {} polygons", summary.polygons);
//! }
//! batch_shapefiles(folder, Some(Crs::from_epsg(32633)))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
pub mod error;
pub mod types;
pub mod traits;
pub mod transform;
pub mod metrics;
pub mod annotation;
pub mod algorithms;
pub mod raster;
pub mod projection;
pub mod io;
pub mod pipeline;
pub mod config;
pub mod session;

// Re-exports for convenience
pub use error::{GeoAnnoError, Result};
pub use types::{Bounds, Point2D};
pub use traits::*;
pub use transform::{AffineGeoreference, PixelAnchor, TransformAdapter};
pub use metrics::{
    classify, geodesic_area_perimeter, looks_like_lon_lat, measure_ring, planar_area_perimeter,
    MetricKind, RingMetrics, Wgs84Geodesy,
};
pub use annotation::{Annotation, AnnotationRecord, PolygonAnnotation, RectangleAnnotation};
pub use algorithms::*;
pub use raster::{load_raster, Crs, LoadedRaster};
pub use projection::Wgs84Reprojector;
pub use io::*;
pub use pipeline::{batch_shapefiles, batch_stats, BatchOutcome, BatchSummary};
pub use config::GeoAnnoConfig;
pub use session::{AnnotationSession, SessionCommand, SessionOutcome};
