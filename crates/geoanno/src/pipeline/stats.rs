//! Area/perimeter statistics for every polygon in a folder.

use std::path::{Path, PathBuf};

use rust_xlsxwriter::Workbook;
use schemars::JsonSchema;
use serde::Serialize;
use tracing::info;

use super::{read_folder, BatchOutcome, BatchSummary};
use crate::{
    error::Result,
    metrics::{measure_ring, MetricKind, RingMetrics, Wgs84Geodesy},
};

/// Worksheet holding the stats table
pub const STATS_SHEET: &str = "stats";

/// Column names of the stats table
pub const STATS_HEADER: [&str; 4] = ["filename", "label", "area(m²)", "perimeter(m)"];

/// One measured polygon
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct StatsRow {
    pub filename: String,
    pub label: String,
    pub kind: MetricKind,
    pub metrics: RingMetrics,
}

impl StatsRow {
    fn to_record(&self) -> [String; 4] {
        [
            self.filename.clone(),
            self.label.clone(),
            format!("{:.4}", self.metrics.area),
            format!("{:.4}", self.metrics.perimeter),
        ]
    }
}

/// Measure every polygon in every readable JSON file of `folder`.
/// Returns the rows, the number of files scanned and the number skipped.
pub fn collect_stats(folder: &Path) -> Result<(Vec<StatsRow>, usize, usize)> {
    let (files, skipped) = read_folder(folder)?;
    let geodesy = Wgs84Geodesy;

    let rows = files
        .iter()
        .flat_map(|file| {
            let filename = file.file_name();
            file.polygons().map(move |(label, points)| {
                let (kind, metrics) = measure_ring(&geodesy, points);
                StatsRow {
                    filename: filename.clone(),
                    label: label.to_string(),
                    kind,
                    metrics,
                }
            })
        })
        .collect();

    Ok((rows, files.len() + skipped, skipped))
}

/// Write rows with [`STATS_HEADER`]: a `.csv` path gets a CSV table, any
/// other path an xlsx workbook with a single [`STATS_SHEET`] sheet.
/// Numeric cells are text with four decimals.
pub fn write_stats(path: &Path, rows: &[StatsRow]) -> Result<()> {
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        write_csv(path, rows)
    } else {
        write_workbook(path, rows)
    }
}

fn write_workbook(path: &Path, rows: &[StatsRow]) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(STATS_SHEET)?;

    for (col, title) in (0u16..).zip(STATS_HEADER) {
        sheet.write_string(0, col, title)?;
    }
    for (row, stats) in (1u32..).zip(rows) {
        for (col, cell) in (0u16..).zip(stats.to_record()) {
            sheet.write_string(row, col, cell)?;
        }
    }

    workbook.save(path)?;
    Ok(())
}

fn write_csv(path: &Path, rows: &[StatsRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(STATS_HEADER)?;
    for row in rows {
        writer.write_record(row.to_record())?;
    }
    writer.flush()?;
    Ok(())
}

/// Measure all polygons under `folder` and write `folder/output_name`.
/// Nothing is written when no polygon is found.
pub fn batch_stats(folder: &Path, output_name: &str) -> Result<BatchOutcome> {
    let (rows, files_scanned, files_skipped) = collect_stats(folder)?;
    if rows.is_empty() {
        info!("No polygon annotations found in {}", folder.display());
        return Ok(BatchOutcome::NothingFound);
    }

    let output: PathBuf = folder.join(output_name);
    write_stats(&output, &rows)?;
    info!("Wrote {} polygon stats to {}", rows.len(), output.display());

    Ok(BatchOutcome::Completed(BatchSummary {
        files_scanned,
        files_skipped,
        polygons: rows.len(),
        outputs: vec![output],
    }))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::config::DEFAULT_STATS_FILE_NAME;

    const PLANAR: &str = r#"[
        {"type": "poly", "points": [{"x": 1000, "y": 1000}, {"x": 1004, "y": 1000}, {"x": 1004, "y": 1003}], "label": "tri"},
        {"type": "rect", "x": 1000, "y": 1000, "w": 5, "h": 5, "label": "ignored"}
    ]"#;

    #[test]
    fn test_collect_stats_planar() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), PLANAR).unwrap();

        let (rows, scanned, skipped) = collect_stats(dir.path()).unwrap();
        assert_eq!((scanned, skipped), (1, 0));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].filename, "a.json");
        assert_eq!(rows[0].label, "tri");
        assert_eq!(rows[0].kind, MetricKind::Planar);
        assert_eq!(rows[0].metrics.area, 6.0);
        assert_eq!(rows[0].metrics.perimeter, 12.0);
    }

    #[test]
    fn test_csv_formatting() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), PLANAR).unwrap();

        let outcome = batch_stats(dir.path(), "stats.csv").unwrap();
        let BatchOutcome::Completed(summary) = outcome else {
            panic!("Expected output");
        };
        assert_eq!(summary.polygons, 1);

        let text = fs::read_to_string(dir.path().join("stats.csv")).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "filename,label,area(m²),perimeter(m)");
        assert_eq!(lines[1], "a.json,tri,6.0000,12.0000");
    }

    #[test]
    fn test_default_output_is_workbook() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), PLANAR).unwrap();

        let outcome = batch_stats(dir.path(), DEFAULT_STATS_FILE_NAME).unwrap();
        let workbook = dir.path().join("stats_area_perimeter.xlsx");
        assert!(matches!(outcome, BatchOutcome::Completed(ref s) if s.outputs == vec![workbook.clone()]));

        // xlsx is a zip container
        let bytes = fs::read(&workbook).unwrap();
        assert_eq!(&bytes[..2], b"PK");
        assert!(!dir.path().join("stats_area_perimeter.csv").exists());
    }

    #[test]
    fn test_clockwise_and_counter_clockwise_rings_match() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("ring.json"),
            r#"[
                {"type": "poly", "points": [{"x": 0, "y": 0}, {"x": 1, "y": 0}, {"x": 1, "y": 1}, {"x": 0, "y": 1}], "label": "ccw"},
                {"type": "poly", "points": [{"x": 0, "y": 1}, {"x": 1, "y": 1}, {"x": 1, "y": 0}, {"x": 0, "y": 0}], "label": "cw"}
            ]"#,
        )
        .unwrap();

        batch_stats(dir.path(), "stats.csv").unwrap();
        let text = fs::read_to_string(dir.path().join("stats.csv")).unwrap();
        let areas: Vec<f64> = text
            .lines()
            .skip(1)
            .map(|line| line.split(',').nth(2).unwrap().parse().unwrap())
            .collect();
        assert_eq!(areas.len(), 2);
        assert!((areas[0] - 1.2308e10).abs() / 1.2308e10 < 0.01, "area {}", areas[0]);
        assert!((areas[0] - areas[1]).abs() < 1.0);
    }

    #[test]
    fn test_no_polygons_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("rects.json"), r#"[{"type":"rect","x":0,"y":0,"w":1,"h":1}]"#).unwrap();

        assert_eq!(batch_stats(dir.path(), "stats.csv").unwrap(), BatchOutcome::NothingFound);
        assert!(!dir.path().join("stats.csv").exists());
    }
}
