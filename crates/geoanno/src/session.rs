//! In-memory annotation session: the loaded raster plus its annotations,
//! driven by [`SessionCommand`]s.

use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::{debug, info};

use crate::{
    algorithms::{AttentionRefiner, RefineOutcome},
    annotation::{Annotation, PolygonAnnotation, RectangleAnnotation},
    config::GeoAnnoConfig,
    error::{GeoAnnoError, Result},
    io::{annotations_path, bbox_path, export_bbox, load_annotations, save_annotations},
    pipeline::{batch_shapefiles, batch_stats, BatchOutcome, BatchSummary},
    raster::{load_raster, Crs, LoadedRaster},
    transform::TransformAdapter,
    types::Point2D,
};

#[derive(
    Debug, Clone,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq
)]
#[serde(tag = "type", content = "params")]
#[strum(serialize_all = "snake_case")]
pub enum SessionCommand {
    /// Open a raster, discarding current annotations
    #[serde(rename = "load_raster")]
    LoadRaster { path: PathBuf },

    /// Add a rectangle from two opposite pixel corners
    #[serde(rename = "add_rectangle")]
    AddRectangle {
        corner_a: Point2D,
        corner_b: Point2D,
        #[serde(default)]
        label: String,
    },

    /// Add a polygon from pixel vertices
    #[serde(rename = "add_polygon")]
    AddPolygon {
        #[schemars(length(min = 3))]
        vertices: Vec<Point2D>,
        #[serde(default)]
        label: String,
    },

    #[serde(rename = "set_label")]
    SetLabel { index: usize, label: String },

    /// Move an annotation by a pixel offset
    #[serde(rename = "translate")]
    Translate { index: usize, dx: f64, dy: f64 },

    #[serde(rename = "delete")]
    Delete { index: usize },

    #[serde(rename = "clear")]
    Clear,

    /// Save to `path`, or `<image>.json` next to the raster
    #[serde(rename = "save_annotations")]
    SaveAnnotations {
        #[serde(default)]
        path: Option<PathBuf>,
    },

    /// Replace annotations with those in `path`, or `<image>.json`
    #[serde(rename = "load_annotations")]
    LoadAnnotations {
        #[serde(default)]
        path: Option<PathBuf>,
    },

    /// Snap polygon vertices to nearby gradient maxima
    #[serde(rename = "refine")]
    Refine,

    /// Write polygon bounding boxes to `path`, or `<image>_bbox.json`
    #[serde(rename = "export_bbox")]
    ExportBbox {
        #[serde(default)]
        path: Option<PathBuf>,
    },

    #[serde(rename = "batch_stats")]
    BatchStats { folder: PathBuf },

    #[serde(rename = "batch_shapefiles")]
    BatchShapefiles { folder: PathBuf },
}

impl SessionCommand {
    /// Get the JSON schema for all commands
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(SessionCommand)
    }

    pub fn command_names() -> &'static [&'static str] {
        <Self as VariantNames>::VARIANTS
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::LoadRaster { .. } => "Open a raster and read its georeferencing",
            Self::AddRectangle { .. } => "Add a labelled rectangle from two pixel corners",
            Self::AddPolygon { .. } => "Add a labelled polygon from pixel vertices",
            Self::SetLabel { .. } => "Change the label of an annotation",
            Self::Translate { .. } => "Move an annotation by a pixel offset",
            Self::Delete { .. } => "Remove one annotation",
            Self::Clear => "Remove all annotations",
            Self::SaveAnnotations { .. } => "Save annotations as map-space JSON records",
            Self::LoadAnnotations { .. } => "Load annotations from map-space JSON records",
            Self::Refine => "Snap polygon vertices to local gradient maxima",
            Self::ExportBbox { .. } => "Export polygon bounding boxes as rect records",
            Self::BatchStats { .. } => "Compute area and perimeter for every polygon in a folder",
            Self::BatchShapefiles { .. } => "Convert every annotation file in a folder to a WGS84 shapefile",
        }
    }
}

/// What a command did
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionOutcome {
    RasterLoaded {
        width: u32,
        height: u32,
        georeferenced: bool,
        crs: Option<Crs>,
    },
    /// Annotation collection changed; `count` is its new size
    Annotations { count: usize },
    Written { path: PathBuf, count: usize },
    Refined {
        polygons: usize,
        moved_vertices: usize,
        skipped: usize,
    },
    Batch(BatchSummary),
    /// Nothing to operate on; not an error
    NothingToDo { reason: String },
}

impl SessionOutcome {
    fn nothing(reason: impl Into<String>) -> Self {
        SessionOutcome::NothingToDo { reason: reason.into() }
    }
}

impl From<BatchOutcome> for SessionOutcome {
    fn from(outcome: BatchOutcome) -> Self {
        match outcome {
            BatchOutcome::Completed(summary) => SessionOutcome::Batch(summary),
            BatchOutcome::NothingFound => SessionOutcome::nothing("no polygon annotations found"),
        }
    }
}

/// Single-threaded session state. Only [`AnnotationSession::load_raster`]
/// changes the transform; everything else reads it.
#[derive(Debug, Default)]
pub struct AnnotationSession {
    config: GeoAnnoConfig,
    raster: Option<LoadedRaster>,
    annotations: Vec<Annotation>,
    refiner: AttentionRefiner,
}

impl AnnotationSession {
    pub fn new(config: GeoAnnoConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &GeoAnnoConfig {
        &self.config
    }

    pub fn raster(&self) -> Option<&LoadedRaster> {
        self.raster.as_ref()
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Transform of the loaded raster, or identity without one
    pub fn transform(&self) -> TransformAdapter {
        self.raster
            .as_ref()
            .map(|raster| raster.transform)
            .unwrap_or_else(|| TransformAdapter::identity().with_anchor(self.config.pixel_anchor))
    }

    /// CRS used to reproject shapefile output: the raster's, else the configured one
    pub fn source_crs(&self) -> Option<Crs> {
        self.raster
            .as_ref()
            .and_then(|raster| raster.crs)
            .or_else(|| self.config.source_crs())
    }

    pub fn load_raster<P: AsRef<Path>>(&mut self, path: P) -> Result<&LoadedRaster> {
        let mut raster = load_raster(path)?;
        raster.transform = raster.transform.with_anchor(self.config.pixel_anchor);
        self.annotations.clear();
        Ok(self.raster.insert(raster))
    }

    /// Install an already decoded raster, e.g. one built in memory
    pub fn set_raster(&mut self, mut raster: LoadedRaster) {
        raster.transform = raster.transform.with_anchor(self.config.pixel_anchor);
        self.annotations.clear();
        self.raster = Some(raster);
    }

    fn require_raster(&self) -> Result<&LoadedRaster> {
        self.raster.as_ref().ok_or(GeoAnnoError::NoRasterLoaded)
    }

    fn annotation_mut(&mut self, index: usize) -> Result<&mut Annotation> {
        self.annotations
            .get_mut(index)
            .ok_or(GeoAnnoError::AnnotationNotFound(index))
    }

    pub fn add_rectangle(&mut self, corner_a: Point2D, corner_b: Point2D, label: impl Into<String>) -> Result<usize> {
        let transform = self.require_raster()?.transform;
        let rect = RectangleAnnotation::new(corner_a, corner_b, label, &transform);
        self.annotations.push(rect.into());
        Ok(self.annotations.len() - 1)
    }

    pub fn add_polygon(&mut self, vertices: Vec<Point2D>, label: impl Into<String>) -> Result<usize> {
        let transform = self.require_raster()?.transform;
        let poly = PolygonAnnotation::new(vertices, label, &transform)?;
        self.annotations.push(poly.into());
        Ok(self.annotations.len() - 1)
    }

    pub fn set_label(&mut self, index: usize, label: impl Into<String>) -> Result<()> {
        self.annotation_mut(index)?.set_label(label);
        Ok(())
    }

    pub fn translate(&mut self, index: usize, dx: f64, dy: f64) -> Result<()> {
        let transform = self.transform();
        self.annotation_mut(index)?.translate_px(dx, dy, &transform)
    }

    pub fn delete(&mut self, index: usize) -> Result<Annotation> {
        if index >= self.annotations.len() {
            return Err(GeoAnnoError::AnnotationNotFound(index));
        }
        Ok(self.annotations.remove(index))
    }

    pub fn clear(&mut self) {
        self.annotations.clear();
    }

    fn default_path(&self, path: Option<PathBuf>, derive: fn(&Path) -> PathBuf) -> Result<PathBuf> {
        match path {
            Some(path) => Ok(path),
            None => Ok(derive(&self.require_raster()?.path)),
        }
    }

    pub fn save(&self, path: Option<PathBuf>) -> Result<SessionOutcome> {
        if self.annotations.is_empty() {
            return Ok(SessionOutcome::nothing("no annotations to save"));
        }
        let path = self.default_path(path, annotations_path)?;
        let count = save_annotations(&path, &self.annotations)?;
        info!("Saved {} annotations to {}", count, path.display());
        Ok(SessionOutcome::Written { path, count })
    }

    /// Replace the collection with the records in `path`
    pub fn load(&mut self, path: Option<PathBuf>) -> Result<usize> {
        let path = self.default_path(path, annotations_path)?;
        let loaded = load_annotations(&path, &self.transform())?;
        debug!("Loaded {} annotations from {}", loaded.len(), path.display());
        self.annotations = loaded;
        Ok(self.annotations.len())
    }

    /// Refine every polygon against the loaded raster
    pub fn refine(&mut self) -> Result<SessionOutcome> {
        let Some(raster) = self.raster.as_ref() else {
            return Err(GeoAnnoError::NoRasterLoaded);
        };
        if !self.annotations.iter().any(|a| a.as_polygon().is_some()) {
            return Ok(SessionOutcome::nothing("no polygons to refine"));
        }

        let (mut polygons, mut moved_vertices, mut skipped) = (0, 0, 0);
        for polygon in self.annotations.iter_mut().filter_map(Annotation::as_polygon_mut) {
            match self.refiner.refine_polygon(&raster.gray, polygon, &raster.transform)? {
                RefineOutcome::Refined { moved } => {
                    polygons += 1;
                    moved_vertices += moved;
                }
                RefineOutcome::EmptyRegion => skipped += 1,
            }
        }

        info!("Refined {polygons} polygons ({moved_vertices} vertices moved, {skipped} skipped)");
        Ok(SessionOutcome::Refined { polygons, moved_vertices, skipped })
    }

    pub fn export_bbox(&self, path: Option<PathBuf>) -> Result<SessionOutcome> {
        let path = self.default_path(path, bbox_path)?;
        let count = export_bbox(&path, &self.annotations, &self.transform())?;
        if count == 0 {
            return Ok(SessionOutcome::nothing("no polygons to bound"));
        }
        info!("Exported {} bounding boxes to {}", count, path.display());
        Ok(SessionOutcome::Written { path, count })
    }

    pub fn execute(&mut self, command: SessionCommand) -> Result<SessionOutcome> {
        debug!("Executing {}", command);
        match command {
            SessionCommand::LoadRaster { path } => {
                let raster = self.load_raster(path)?;
                Ok(SessionOutcome::RasterLoaded {
                    width: raster.width(),
                    height: raster.height(),
                    georeferenced: !raster.transform.is_identity(),
                    crs: raster.crs,
                })
            }
            SessionCommand::AddRectangle { corner_a, corner_b, label } => {
                self.add_rectangle(corner_a, corner_b, label)?;
                Ok(self.count())
            }
            SessionCommand::AddPolygon { vertices, label } => {
                self.add_polygon(vertices, label)?;
                Ok(self.count())
            }
            SessionCommand::SetLabel { index, label } => {
                self.set_label(index, label)?;
                Ok(self.count())
            }
            SessionCommand::Translate { index, dx, dy } => {
                self.translate(index, dx, dy)?;
                Ok(self.count())
            }
            SessionCommand::Delete { index } => {
                self.delete(index)?;
                Ok(self.count())
            }
            SessionCommand::Clear => {
                self.clear();
                Ok(self.count())
            }
            SessionCommand::SaveAnnotations { path } => self.save(path),
            SessionCommand::LoadAnnotations { path } => {
                self.load(path)?;
                Ok(self.count())
            }
            SessionCommand::Refine => self.refine(),
            SessionCommand::ExportBbox { path } => self.export_bbox(path),
            SessionCommand::BatchStats { folder } => {
                Ok(batch_stats(&folder, &self.config.stats_file_name)?.into())
            }
            SessionCommand::BatchShapefiles { folder } => {
                Ok(batch_shapefiles(&folder, self.source_crs())?.into())
            }
        }
    }

    fn count(&self) -> SessionOutcome {
        SessionOutcome::Annotations { count: self.annotations.len() }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use image::{GrayImage, Luma};

    use super::*;
    use crate::transform::{AffineGeoreference, PixelAnchor};

    fn georeferenced_session(dir: &Path) -> AnnotationSession {
        let mut gray = GrayImage::new(40, 40);
        gray.put_pixel(20, 20, Luma([200]));
        let affine = AffineGeoreference::from_origin(300_000.0, 6_000_000.0, 1.0, -1.0).unwrap();

        let mut session = AnnotationSession::default();
        session.set_raster(LoadedRaster {
            path: dir.join("scene.tif"),
            gray,
            transform: TransformAdapter::new(affine),
            crs: Some(Crs::from_epsg(32633)),
        });
        session
    }

    fn triangle() -> Vec<Point2D> {
        vec![Point2D::new(5.0, 5.0), Point2D::new(25.0, 8.0), Point2D::new(12.0, 30.0)]
    }

    #[test]
    fn test_schema_and_names() {
        let schema = SessionCommand::schema();
        assert!(serde_json::to_string(&schema).unwrap().contains("add_polygon"));
        assert!(SessionCommand::command_names().contains(&"batch_shapefiles"));
        assert_eq!(SessionCommand::from_str("refine").unwrap(), SessionCommand::Refine);
        assert!(!SessionCommand::Clear.description().is_empty());
    }

    #[test]
    fn test_command_wire_format() {
        let command: SessionCommand = serde_json::from_str(
            r#"{"type": "translate", "params": {"index": 0, "dx": 1.5, "dy": -2}}"#,
        )
        .unwrap();
        assert_eq!(command, SessionCommand::Translate { index: 0, dx: 1.5, dy: -2.0 });

        let clear: SessionCommand = serde_json::from_str(r#"{"type": "clear"}"#).unwrap();
        assert_eq!(clear, SessionCommand::Clear);
    }

    #[test]
    fn test_drawing_requires_raster() {
        let mut session = AnnotationSession::default();
        assert!(matches!(
            session.add_polygon(triangle(), "a"),
            Err(GeoAnnoError::NoRasterLoaded)
        ));
        assert!(matches!(session.refine(), Err(GeoAnnoError::NoRasterLoaded)));
    }

    #[test]
    fn test_edit_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = georeferenced_session(dir.path());

        session.add_polygon(triangle(), "field").unwrap();
        session
            .add_rectangle(Point2D::new(10.0, 10.0), Point2D::new(2.0, 3.0), "box")
            .unwrap();
        assert_eq!(session.annotations().len(), 2);

        session.execute(SessionCommand::SetLabel { index: 1, label: "crate".into() }).unwrap();
        assert_eq!(session.annotations()[1].label(), "crate");

        session.translate(0, 1.0, -1.0).unwrap();
        let moved = session.annotations()[0].as_polygon().unwrap();
        assert_eq!(moved.vertices_px()[0], Point2D::new(6.0, 4.0));
        assert_eq!(moved.vertices_map()[0], Point2D::new(300_006.5, 5_999_995.5));

        assert!(matches!(session.delete(5), Err(GeoAnnoError::AnnotationNotFound(5))));
        assert_eq!(
            session.execute(SessionCommand::Delete { index: 1 }).unwrap(),
            SessionOutcome::Annotations { count: 1 }
        );
        assert_eq!(
            session.execute(SessionCommand::Clear).unwrap(),
            SessionOutcome::Annotations { count: 0 }
        );
    }

    #[test]
    fn test_save_and_reload_default_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = georeferenced_session(dir.path());

        assert!(matches!(
            session.save(None).unwrap(),
            SessionOutcome::NothingToDo { .. }
        ));

        session.add_polygon(triangle(), "field").unwrap();
        let outcome = session.execute(SessionCommand::SaveAnnotations { path: None }).unwrap();
        assert_eq!(
            outcome,
            SessionOutcome::Written { path: dir.path().join("scene.json"), count: 1 }
        );

        session.clear();
        assert_eq!(session.load(None).unwrap(), 1);
        let poly = session.annotations()[0].as_polygon().unwrap();
        for (a, b) in poly.vertices_px().iter().zip(&triangle()) {
            assert!((a.x - b.x).abs() < 1e-6 && (a.y - b.y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_refine_and_bbox() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = georeferenced_session(dir.path());

        assert!(matches!(
            session.export_bbox(None).unwrap(),
            SessionOutcome::NothingToDo { .. }
        ));
        assert!(!dir.path().join("scene_bbox.json").exists());

        session.add_polygon(triangle(), "field").unwrap();
        session.add_polygon(vec![Point2D::new(100.0, 100.0), Point2D::new(120.0, 100.0), Point2D::new(110.0, 120.0)], "outside").unwrap();

        let SessionOutcome::Refined { polygons, skipped, .. } = session.refine().unwrap() else {
            panic!("Expected refinement");
        };
        assert_eq!((polygons, skipped), (1, 1));

        let outcome = session.export_bbox(None).unwrap();
        assert_eq!(
            outcome,
            SessionOutcome::Written { path: dir.path().join("scene_bbox.json"), count: 2 }
        );
    }

    #[test]
    fn test_source_crs_precedence() {
        let config = GeoAnnoConfig {
            source_epsg: Some(3857),
            pixel_anchor: PixelAnchor::UpperLeft,
            ..Default::default()
        };
        let session = AnnotationSession::new(config.clone());
        assert_eq!(session.source_crs(), Some(Crs::from_epsg(3857)));
        assert_eq!(session.transform().anchor(), PixelAnchor::UpperLeft);

        let dir = tempfile::tempdir().unwrap();
        let mut session = georeferenced_session(dir.path());
        session.config = config;
        assert_eq!(session.source_crs(), Some(Crs::from_epsg(32633)));
    }

    #[test]
    fn test_batch_nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = AnnotationSession::default();
        let outcome = session
            .execute(SessionCommand::BatchStats { folder: dir.path().to_path_buf() })
            .unwrap();
        assert!(matches!(outcome, SessionOutcome::NothingToDo { .. }));
    }
}
