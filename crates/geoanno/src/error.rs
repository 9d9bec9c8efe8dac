use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoAnnoError {
    #[error("Failed to load image: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("TIFF decoding error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("No raster loaded")]
    NoRasterLoaded,

    #[error("No annotation at index {0}")]
    AnnotationNotFound(usize),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Unsupported CRS: EPSG:{0}")]
    UnsupportedCrs(u32),

    #[error("Projection error: {0}")]
    Projection(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Shapefile error: {0}")]
    Shapefile(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Workbook error: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<shapefile::Error> for GeoAnnoError {
    fn from(err: shapefile::Error) -> Self {
        GeoAnnoError::Shapefile(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GeoAnnoError>;
