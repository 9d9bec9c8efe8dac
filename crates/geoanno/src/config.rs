//! Session configuration, loadable from TOML or JSON.

use std::{fs, path::Path};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    error::{GeoAnnoError, Result},
    raster::Crs,
    transform::PixelAnchor,
};

pub const DEFAULT_STATS_FILE_NAME: &str = "stats_area_perimeter.xlsx";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GeoAnnoConfig {
    /// File name of the stats table written into the batch folder;
    /// `.csv` selects CSV, anything else an xlsx workbook
    pub stats_file_name: String,
    /// Which point of a pixel its map coordinate refers to
    pub pixel_anchor: PixelAnchor,
    /// CRS assumed for projected annotations when exporting shapefiles.
    /// The loaded raster's CRS takes precedence when known.
    pub source_epsg: Option<u32>,
}

impl Default for GeoAnnoConfig {
    fn default() -> Self {
        Self {
            stats_file_name: DEFAULT_STATS_FILE_NAME.to_string(),
            pixel_anchor: PixelAnchor::default(),
            source_epsg: None,
        }
    }
}

impl GeoAnnoConfig {
    pub fn source_crs(&self) -> Option<Crs> {
        self.source_epsg.map(Crs::from_epsg)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load from a `.toml` or `.json` file, picked by extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = || fs::read_to_string(path);
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&content()?),
            Some("json") => Self::from_json(&content()?),
            _ => Err(GeoAnnoError::UnsupportedFormat(format!(
                "{} (use .toml or .json)",
                path.display()
            ))),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
