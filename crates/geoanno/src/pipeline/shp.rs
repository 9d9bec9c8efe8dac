//! Polygon shapefile export in EPSG:4326.

use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};

use shapefile::{
    dbase::{FieldName, FieldValue, Record, TableWriterBuilder},
    Point, Polygon, PolygonRing, ShapeWriter, Writer,
};
use tracing::{debug, info, warn};

use super::{read_folder, BatchOutcome, BatchSummary};
use crate::{
    error::{GeoAnnoError, Result},
    metrics::{looks_like_lon_lat, MIN_RING_VERTICES},
    projection::Wgs84Reprojector,
    raster::Crs,
    types::Point2D,
};

/// Attribute column holding each polygon's label
pub const LABEL_FIELD: &str = "label";
const LABEL_FIELD_LEN: u8 = 254;

/// ESRI WKT written to the `.prj` sidecar
pub const WGS84_PRJ: &str = "GEOGCS[\"GCS_WGS_1984\",DATUM[\"D_WGS_1984\",\
SPHEROID[\"WGS_1984\",6378137.0,298.257223563]],PRIMEM[\"Greenwich\",0.0],\
UNIT[\"Degree\",0.0174532925199433]]";

/// Turns annotation rings into WGS84 polygon shapefiles
#[derive(Debug, Default)]
pub struct ShapefileExport {
    reprojector: Option<Wgs84Reprojector>,
}

impl ShapefileExport {
    /// `source` is the CRS projected rings are expressed in. Unknown or
    /// unsupported CRSs leave projected rings untouched.
    pub fn new(source: Option<Crs>) -> Self {
        let reprojector = match source {
            Some(crs) => match Wgs84Reprojector::new(crs) {
                Ok(reprojector) => Some(reprojector),
                Err(e) => {
                    warn!("Cannot reproject from {crs}: {e}; projected rings are written unchanged");
                    None
                }
            },
            None => None,
        };
        Self { reprojector }
    }

    /// Ring coordinates as they should appear in the shapefile
    pub fn prepare_ring(&self, points: &[Point2D]) -> Vec<Point2D> {
        if looks_like_lon_lat(points) {
            return points.to_vec();
        }
        let Some(reprojector) = &self.reprojector else {
            debug!("Projected ring without a source CRS, writing as-is");
            return points.to_vec();
        };
        match reprojector.transform_points(points) {
            Ok(reprojected) => reprojected,
            Err(e) => {
                warn!("Reprojection failed, writing ring as-is: {e}");
                points.to_vec()
            }
        }
    }
}

/// Write `<path>.shp` with its `.shx`, `.dbf`, `.prj` and `.cpg` companions.
/// Rings with fewer than three vertices are skipped. Returns the number of
/// polygons written.
pub fn write_shapefile(path: &Path, polygons: &[(String, Vec<Point2D>)]) -> Result<usize> {
    let label_field = FieldName::try_from(LABEL_FIELD)
        .map_err(|e| GeoAnnoError::Shapefile(format!("invalid field name {LABEL_FIELD}: {e:?}")))?;

    let mut shp = Cursor::new(Vec::new());
    let mut shx = Cursor::new(Vec::new());
    let mut dbf = Cursor::new(Vec::new());
    let mut written = 0;

    {
        let table = TableWriterBuilder::new()
            .add_character_field(label_field, LABEL_FIELD_LEN)
            .build_with_dest(&mut dbf);
        let mut writer = Writer::new(ShapeWriter::with_shx(&mut shp, &mut shx), table);

        for (label, ring) in polygons {
            if ring.len() < MIN_RING_VERTICES {
                debug!("Skipping polygon '{label}' with {} vertices", ring.len());
                continue;
            }
            let points = ring.iter().map(|p| Point::new(p.x, p.y)).collect();
            let polygon = Polygon::new(PolygonRing::Outer(points));

            let mut record = Record::default();
            record.insert(
                LABEL_FIELD.to_string(),
                FieldValue::Character(Some(truncate_label(label).to_string())),
            );
            writer.write_shape_and_record(&polygon, &record)?;
            written += 1;
        }
        // dropping the writer finalizes headers into the buffers
    }

    // The writers emit headers with the first record only
    let (mut shp, mut shx, mut dbf) = (shp.into_inner(), shx.into_inner(), dbf.into_inner());
    if shp.is_empty() {
        shp = empty_polygon_header().to_vec();
        shx = shp.clone();
    }
    if dbf.is_empty() {
        dbf = empty_label_table();
    }

    fs::write(path.with_extension("shp"), shp)?;
    fs::write(path.with_extension("shx"), shx)?;
    fs::write(path.with_extension("dbf"), dbf)?;
    fs::write(path.with_extension("prj"), WGS84_PRJ)?;
    fs::write(path.with_extension("cpg"), "UTF-8")?;

    Ok(written)
}

/// 100-byte main/index file header of a polygon shapefile with no records
fn empty_polygon_header() -> [u8; 100] {
    const FILE_CODE: i32 = 9994;
    const VERSION: i32 = 1000;
    const POLYGON: i32 = 5;
    // file length in 16-bit words
    const HEADER_WORDS: i32 = 50;

    let mut header = [0u8; 100];
    header[0..4].copy_from_slice(&FILE_CODE.to_be_bytes());
    header[24..28].copy_from_slice(&HEADER_WORDS.to_be_bytes());
    header[28..32].copy_from_slice(&VERSION.to_le_bytes());
    header[32..36].copy_from_slice(&POLYGON.to_le_bytes());
    header
}

/// dBase III table with the label column and no records
fn empty_label_table() -> Vec<u8> {
    const DESCRIPTOR_LEN: u16 = 32;
    let header_len: u16 = DESCRIPTOR_LEN * 2 + 1;
    let record_len: u16 = 1 + u16::from(LABEL_FIELD_LEN);

    let mut table = vec![0u8; 32];
    table[0] = 0x03;
    table[1..4].copy_from_slice(&[70, 1, 1]);
    table[8..10].copy_from_slice(&header_len.to_le_bytes());
    table[10..12].copy_from_slice(&record_len.to_le_bytes());

    let mut descriptor = [0u8; 32];
    descriptor[..LABEL_FIELD.len()].copy_from_slice(LABEL_FIELD.as_bytes());
    descriptor[11] = b'C';
    descriptor[16] = LABEL_FIELD_LEN;
    table.extend_from_slice(&descriptor);

    table.push(0x0D);
    table.push(0x1A);
    table
}

fn truncate_label(label: &str) -> &str {
    let max = usize::from(LABEL_FIELD_LEN);
    if label.len() <= max {
        return label;
    }
    let mut end = max;
    while !label.is_char_boundary(end) {
        end -= 1;
    }
    &label[..end]
}

/// Export every readable JSON file in `folder` to a sibling shapefile of
/// the same stem, reprojected to EPSG:4326. Files without polygons yield an
/// empty layer. `NothingFound` means no file could be read.
pub fn batch_shapefiles(folder: &Path, source: Option<Crs>) -> Result<BatchOutcome> {
    let (files, files_skipped) = read_folder(folder)?;
    if files.is_empty() {
        info!("No readable annotation files in {}", folder.display());
        return Ok(BatchOutcome::NothingFound);
    }

    let export = ShapefileExport::new(source);
    let mut outputs: Vec<PathBuf> = Vec::with_capacity(files.len());
    let mut polygons = 0;

    for file in &files {
        let rings: Vec<(String, Vec<Point2D>)> = file
            .polygons()
            .filter(|(_, points)| points.len() >= MIN_RING_VERTICES)
            .map(|(label, points)| (label.to_string(), export.prepare_ring(points)))
            .collect();

        let output = file.path.with_extension("shp");
        let written = write_shapefile(&output, &rings)?;
        info!("Wrote {} polygons to {}", written, output.display());
        polygons += written;
        outputs.push(output);
    }

    Ok(BatchOutcome::Completed(BatchSummary {
        files_scanned: files.len() + files_skipped,
        files_skipped,
        polygons,
        outputs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle(x0: f64, y0: f64, size: f64) -> Vec<Point2D> {
        vec![
            Point2D::new(x0, y0),
            Point2D::new(x0 + size, y0),
            Point2D::new(x0, y0 + size),
        ]
    }

    #[test]
    fn test_prepare_ring_lon_lat_untouched() {
        let export = ShapefileExport::new(Some(Crs::from_epsg(32633)));
        let ring = triangle(10.0, 45.0, 0.5);
        assert_eq!(export.prepare_ring(&ring), ring);
    }

    #[test]
    fn test_prepare_ring_reprojects_utm() {
        let export = ShapefileExport::new(Some(Crs::from_epsg(32633)));
        let ring = triangle(500_000.0, 0.0, 1000.0);
        let out = export.prepare_ring(&ring);
        assert!((out[0].x - 15.0).abs() < 1e-6);
        assert!(out[0].y.abs() < 1e-6);
        assert!(looks_like_lon_lat(&out));
    }

    #[test]
    fn test_prepare_ring_without_crs_is_unchanged() {
        for export in [ShapefileExport::new(None), ShapefileExport::new(Some(Crs::from_epsg(27700)))] {
            let ring = triangle(500_000.0, 4_000_000.0, 10.0);
            assert_eq!(export.prepare_ring(&ring), ring);
        }
    }

    #[test]
    fn test_write_shapefile_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plots.shp");
        let polygons = vec![
            ("field".to_string(), triangle(1.0, 1.0, 0.1)),
            ("thin".to_string(), vec![Point2D::new(0.0, 0.0), Point2D::new(1.0, 1.0)]),
        ];

        assert_eq!(write_shapefile(&path, &polygons).unwrap(), 1);
        for ext in ["shp", "shx", "dbf", "prj", "cpg"] {
            assert!(path.with_extension(ext).exists(), "missing .{ext}");
        }
        let prj = fs::read_to_string(path.with_extension("prj")).unwrap();
        assert!(prj.starts_with("GEOGCS[\"GCS_WGS_1984\""));

        let shapes = shapefile::read_shapes_as::<_, Polygon>(&path).unwrap();
        assert_eq!(shapes.len(), 1);
    }

    #[test]
    fn test_truncate_label_on_char_boundary() {
        let long = "é".repeat(200);
        let cut = truncate_label(&long);
        assert!(cut.len() <= 254);
        assert_eq!(cut.chars().count(), 127);
        assert_eq!(truncate_label("short"), "short");
    }

    #[test]
    fn test_batch_writes_one_layer_per_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("img.json"),
            r#"[{"type":"poly","points":[{"x":1,"y":1},{"x":2,"y":1},{"x":1,"y":2}],"label":"a"}]"#,
        )
        .unwrap();
        fs::write(dir.path().join("img_bbox.json"), r#"[{"type":"rect","x":0,"y":0,"w":1,"h":1}]"#).unwrap();
        fs::write(dir.path().join("broken.json"), "not json").unwrap();

        let BatchOutcome::Completed(summary) = batch_shapefiles(dir.path(), None).unwrap() else {
            panic!("Expected output");
        };
        assert_eq!(summary.files_scanned, 3);
        assert_eq!(summary.files_skipped, 1);
        assert_eq!(summary.polygons, 1);
        assert_eq!(
            summary.outputs,
            vec![dir.path().join("img.shp"), dir.path().join("img_bbox.shp")]
        );

        let empty = shapefile::read_shapes_as::<_, Polygon>(dir.path().join("img_bbox.shp")).unwrap();
        assert!(empty.is_empty());
        assert!(dir.path().join("img_bbox.prj").exists());
    }

    #[test]
    fn test_empty_layer_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("none.shp");
        assert_eq!(write_shapefile(&path, &[]).unwrap(), 0);

        let shp = fs::read(&path).unwrap();
        assert_eq!(shp.len(), 100);
        assert_eq!(&shp[0..4], &9994i32.to_be_bytes());
        assert_eq!(&shp[32..36], &5i32.to_le_bytes());
        assert_eq!(fs::read(path.with_extension("shx")).unwrap().len(), 100);

        let records = shapefile::dbase::read(path.with_extension("dbf")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_folder_of_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();
        assert_eq!(batch_shapefiles(dir.path(), None).unwrap(), BatchOutcome::NothingFound);
    }

    #[test]
    fn test_batch_empty_folder() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(batch_shapefiles(dir.path(), None).unwrap(), BatchOutcome::NothingFound);
    }
}
