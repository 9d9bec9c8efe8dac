//! Batch operations over a folder of annotation JSON files.
//!
//! Both operations run to completion on the calling thread. Files that fail
//! to read or parse are skipped and counted; only failures writing the final
//! outputs are returned as errors.

pub mod shp;
pub mod stats;

use std::{
    fs,
    path::{Path, PathBuf},
};

use schemars::JsonSchema;
use serde::Serialize;
use tracing::warn;

use crate::{annotation::AnnotationRecord, error::Result, io::read_records};

pub use shp::{batch_shapefiles, write_shapefile, ShapefileExport};
pub use stats::{batch_stats, collect_stats, write_stats, StatsRow, STATS_HEADER};

/// Summary of a batch run that produced output
#[derive(Debug, Clone, PartialEq, Default, Serialize, JsonSchema)]
pub struct BatchSummary {
    /// JSON files found in the folder
    pub files_scanned: usize,
    /// Files skipped because they could not be read or parsed
    pub files_skipped: usize,
    /// Polygon records processed
    pub polygons: usize,
    /// Files written
    pub outputs: Vec<PathBuf>,
}

/// What a batch entry point reports back to its caller
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Completed(BatchSummary),
    /// No polygon records were found; nothing was written
    NothingFound,
}

/// `*.json` files directly inside `folder`, sorted by name
pub fn json_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(folder)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// One parsed annotation file
pub(crate) struct AnnotationFile {
    pub path: PathBuf,
    pub records: Vec<AnnotationRecord>,
}

impl AnnotationFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn polygons(&self) -> impl Iterator<Item = (&str, &[crate::types::Point2D])> {
        self.records
            .iter()
            .filter_map(|record| record.polygon_points().map(|points| (record.label(), points)))
    }
}

/// Read every JSON file in `folder`, returning the parsed ones and the
/// number skipped
pub(crate) fn read_folder(folder: &Path) -> Result<(Vec<AnnotationFile>, usize)> {
    let mut parsed = Vec::new();
    let mut skipped = 0;

    for path in json_files(folder)? {
        match read_records(&path) {
            Ok(records) => parsed.push(AnnotationFile { path, records }),
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                skipped += 1;
            }
        }
    }

    Ok((parsed, skipped))
}
