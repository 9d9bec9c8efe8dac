//! Annotation JSON files: a pretty-printed UTF-8 array of records.

use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    annotation::{Annotation, AnnotationRecord},
    error::Result,
    traits::CoordinateTransform,
};

/// `<image>.json` next to the raster
pub fn annotations_path(image: &Path) -> PathBuf {
    image.with_extension("json")
}

/// `<image>_bbox.json` next to the raster
pub fn bbox_path(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    image.with_file_name(format!("{stem}_bbox.json"))
}

/// Parse a record array. Entries that are not valid records (unknown
/// `type`, missing fields) are skipped; a file that is not a JSON array is
/// an error.
pub fn parse_records(content: &str) -> Result<Vec<AnnotationRecord>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(content)?;

    let records = values
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value::<AnnotationRecord>(value) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!("Skipping record {}: {}", i, e);
                None
            }
        })
        .collect();

    Ok(records)
}

pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<AnnotationRecord>> {
    let content = fs::read_to_string(path)?;
    parse_records(&content)
}

pub fn write_records<P: AsRef<Path>>(path: P, records: &[AnnotationRecord]) -> Result<()> {
    let content = serde_json::to_string_pretty(records)?;
    fs::write(path, content)?;
    Ok(())
}

/// Persist the map-space form of every annotation. Returns the count written.
pub fn save_annotations<P: AsRef<Path>>(path: P, annotations: &[Annotation]) -> Result<usize> {
    let records: Vec<AnnotationRecord> = annotations.iter().map(Annotation::serialize).collect();
    write_records(path, &records)?;
    Ok(records.len())
}

/// Load annotations, rebuilding pixel geometry through `transform`.
/// Degenerate records are skipped with a warning.
pub fn load_annotations<P, T>(path: P, transform: &T) -> Result<Vec<Annotation>>
where
    P: AsRef<Path>,
    T: CoordinateTransform + ?Sized,
{
    let path = path.as_ref();
    let annotations = read_records(path)?
        .iter()
        .filter_map(|record| match Annotation::deserialize(record, transform) {
            Ok(annotation) => Some(annotation),
            Err(e) => {
                warn!("Skipping record in {}: {}", path.display(), e);
                None
            }
        })
        .collect();
    Ok(annotations)
}

/// Write the pixel bounding box of every polygon as a rect record.
/// Returns the number of boxes written; nothing is written for zero polygons.
pub fn export_bbox<P, T>(path: P, annotations: &[Annotation], transform: &T) -> Result<usize>
where
    P: AsRef<Path>,
    T: CoordinateTransform + ?Sized,
{
    let records: Vec<AnnotationRecord> = annotations
        .iter()
        .filter_map(Annotation::as_polygon)
        .map(|poly| poly.bounding_rect(transform).to_record())
        .collect();

    if !records.is_empty() {
        write_records(path, &records)?;
    }
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        annotation::{PolygonAnnotation, RectangleAnnotation},
        transform::{AffineGeoreference, TransformAdapter},
        types::Point2D,
    };

    fn transform() -> TransformAdapter {
        TransformAdapter::new(AffineGeoreference::from_origin(300_000.0, 6_000_000.0, 1.0, -1.0).unwrap())
    }

    fn polygon(label: &str) -> Annotation {
        let ring = vec![Point2D::new(5.0, 5.0), Point2D::new(25.0, 8.0), Point2D::new(12.0, 30.0)];
        PolygonAnnotation::new(ring, label, &transform()).unwrap().into()
    }

    #[test]
    fn test_paths() {
        let image = Path::new("/data/scenes/tile_07.tif");
        assert_eq!(annotations_path(image), PathBuf::from("/data/scenes/tile_07.json"));
        assert_eq!(bbox_path(image), PathBuf::from("/data/scenes/tile_07_bbox.json"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.json");
        let tf = transform();
        let rect: Annotation =
            RectangleAnnotation::new(Point2D::new(1.0, 2.0), Point2D::new(9.0, 6.0), "box", &tf).into();
        let annotations = vec![polygon("tree"), rect];

        assert_eq!(save_annotations(&path, &annotations).unwrap(), 2);
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("[\n  {\n    \"type\": \"poly\""));

        let loaded = load_annotations(&path, &tf).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].label(), "tree");
        assert_eq!(loaded[1].label(), "box");
        for (a, b) in loaded[0].geometry_px().iter().zip(annotations[0].geometry_px()) {
            assert!((a.x - b.x).abs() < 1e-6 && (a.y - b.y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_parse_skips_unknown_and_degenerate() {
        let json = r#"[
            {"type": "circle", "cx": 1, "cy": 2, "r": 3},
            {"type": "poly", "points": [{"x": 0, "y": 0}, {"x": 1, "y": 0}], "label": "thin"},
            {"type": "poly", "points": [{"x": 0, "y": 0}, {"x": 1, "y": 0}, {"x": 1, "y": 1}], "label": "ok"}
        ]"#;
        let records = parse_records(json).unwrap();
        assert_eq!(records.len(), 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.json");
        fs::write(&path, json).unwrap();
        let loaded = load_annotations(&path, &TransformAdapter::identity()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].label(), "ok");
    }

    #[test]
    fn test_parse_rejects_non_array() {
        assert!(parse_records("{not json").is_err());
        assert!(parse_records(r#"{"type": "poly"}"#).is_err());
    }

    #[test]
    fn test_export_bbox() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene_bbox.json");
        let tf = transform();

        let written = export_bbox(&path, &[polygon("tree")], &tf).unwrap();
        assert_eq!(written, 1);

        let records = read_records(&path).unwrap();
        match &records[0] {
            AnnotationRecord::Rect { x, y, w, h, label } => {
                assert_eq!((*x, *y), (300_005.5, 5_999_994.5));
                assert_eq!((*w, *h), (20.0, -25.0));
                assert_eq!(label, "tree");
            }
            other => panic!("expected rect, got {other:?}"),
        }
    }

    #[test]
    fn test_export_bbox_without_polygons_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty_bbox.json");
        assert_eq!(export_bbox(&path, &[], &TransformAdapter::identity()).unwrap(), 0);
        assert!(!path.exists());
    }
}
