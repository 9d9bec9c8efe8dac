//! Raster loading: an 8-bit grayscale pixel array plus, for GeoTIFFs, the
//! affine georeference and EPSG code read from the GeoTIFF tags.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use image::{GrayImage, Luma};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tiff::{
    decoder::{Decoder, DecodingResult},
    tags::Tag,
    ColorType,
};
use tracing::{debug, warn};

use crate::{
    error::{GeoAnnoError, Result},
    transform::{AffineGeoreference, TransformAdapter},
};

pub const MODEL_PIXEL_SCALE_TAG: u16 = 33550;
pub const MODEL_TIEPOINT_TAG: u16 = 33922;
pub const MODEL_TRANSFORMATION_TAG: u16 = 34264;
pub const GEO_KEY_DIRECTORY_TAG: u16 = 34735;

const GT_RASTER_TYPE_KEY: u32 = 1025;
const GEOGRAPHIC_TYPE_KEY: u32 = 2048;
const PROJECTED_CS_TYPE_KEY: u32 = 3072;
const RASTER_PIXEL_IS_POINT: u32 = 2;
const USER_DEFINED: u32 = 32767;

/// Coordinate reference system identified by EPSG code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Crs {
    pub epsg: u32,
}

impl Crs {
    pub const WGS84: Crs = Crs { epsg: 4326 };

    pub fn from_epsg(epsg: u32) -> Self {
        Self { epsg }
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

/// A raster opened for annotation
#[derive(Debug, Clone)]
pub struct LoadedRaster {
    pub path: PathBuf,
    pub gray: GrayImage,
    pub transform: TransformAdapter,
    pub crs: Option<Crs>,
}

impl LoadedRaster {
    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    pub fn height(&self) -> u32 {
        self.gray.height()
    }
}

/// Georeferencing found in a GeoTIFF
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoTiffInfo {
    pub affine: Option<AffineGeoreference>,
    pub crs: Option<Crs>,
}

/// Open a raster. Missing or unreadable georeferencing falls back to the
/// identity transform with no CRS; undecodable pixels are an error.
pub fn load_raster<P: AsRef<Path>>(path: P) -> Result<LoadedRaster> {
    let path = path.as_ref();
    let gray = load_gray(path)?;

    let info = if is_tiff(path) {
        read_geotiff_info(path).unwrap_or_else(|e| {
            warn!("Ignoring georeferencing of {}: {}", path.display(), e);
            GeoTiffInfo::default()
        })
    } else {
        GeoTiffInfo::default()
    };

    debug!(
        "Loaded {} ({}x{}), georeferenced: {}, crs: {:?}",
        path.display(),
        gray.width(),
        gray.height(),
        info.affine.is_some(),
        info.crs
    );

    Ok(LoadedRaster {
        path: path.to_path_buf(),
        gray,
        transform: TransformAdapter::from(info.affine),
        crs: info.crs,
    })
}

/// Decode to 8-bit luma. TIFFs the image decoder rejects (float or
/// multi-band data) are read through the TIFF decoder and band 1 is
/// min-max stretched to 0..=255.
pub fn load_gray<P: AsRef<Path>>(path: P) -> Result<GrayImage> {
    let path = path.as_ref();
    match image::open(path) {
        Ok(img) => Ok(img.to_luma8()),
        Err(err) if is_tiff(path) => {
            debug!("image decoder failed for {} ({}), reading band 1", path.display(), err);
            read_first_band(path)
        }
        Err(err) => Err(err.into()),
    }
}

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>> {
    Ok(Decoder::new(BufReader::new(File::open(path)?))?)
}

fn read_first_band(path: &Path) -> Result<GrayImage> {
    let mut decoder = open_decoder(path)?;
    let (width, height) = decoder.dimensions()?;
    let samples = match decoder.colortype()? {
        ColorType::GrayA(_) => 2,
        ColorType::RGB(_) => 3,
        ColorType::RGBA(_) | ColorType::CMYK(_) => 4,
        _ => 1,
    };

    let values = decoding_result_to_f64(decoder.read_image()?)?;
    let pixel_count = width as usize * height as usize;
    // Planar files decode band 1 only, chunky files interleave every band
    let stride = if values.len() >= pixel_count * samples { samples } else { 1 };
    let band: Vec<f64> = values.into_iter().step_by(stride).take(pixel_count).collect();

    if band.len() < pixel_count {
        return Err(GeoAnnoError::UnsupportedFormat(format!(
            "{}: expected {} samples in band 1, found {}",
            path.display(),
            pixel_count,
            band.len()
        )));
    }

    Ok(stretch_to_u8(&band, width, height))
}

fn decoding_result_to_f64(result: DecodingResult) -> Result<Vec<f64>> {
    let values = match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => return Err(GeoAnnoError::UnsupportedFormat("unsupported TIFF sample type".to_string())),
    };
    Ok(values)
}

/// Min-max stretch to 0..=255, truncating. A constant band becomes all zero.
fn stretch_to_u8(band: &[f64], width: u32, height: u32) -> GrayImage {
    let (min, max) = band
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = if max > min { max - min } else { 0.0 };

    GrayImage::from_fn(width, height, |x, y| {
        let v = band[(y * width + x) as usize];
        if range == 0.0 || !v.is_finite() {
            return Luma([0u8]);
        }
        Luma([((v - min) / range * 255.0) as u8])
    })
}

/// Read the affine georeference and EPSG code from GeoTIFF tags
pub fn read_geotiff_info<P: AsRef<Path>>(path: P) -> Result<GeoTiffInfo> {
    let mut decoder = open_decoder(path.as_ref())?;

    let geo_keys = match decoder.find_tag(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY_TAG))? {
        Some(value) => value.into_u32_vec()?,
        None => Vec::new(),
    };
    let key = |id: u32| geo_key_value(&geo_keys, id);

    let mut affine = match decoder.find_tag(Tag::from_u16_exhaustive(MODEL_TRANSFORMATION_TAG))? {
        Some(value) => Some(affine_from_transformation(&value.into_f64_vec()?)?),
        None => {
            let scale = decoder.find_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE_TAG))?;
            let tiepoint = decoder.find_tag(Tag::from_u16_exhaustive(MODEL_TIEPOINT_TAG))?;
            match (scale, tiepoint) {
                (Some(scale), Some(tiepoint)) => Some(affine_from_tiepoint(
                    &scale.into_f64_vec()?,
                    &tiepoint.into_f64_vec()?,
                )?),
                _ => None,
            }
        }
    };

    if key(GT_RASTER_TYPE_KEY) == Some(RASTER_PIXEL_IS_POINT) {
        affine = affine.map(shift_half_pixel).transpose()?;
    }

    let crs = key(PROJECTED_CS_TYPE_KEY)
        .or_else(|| key(GEOGRAPHIC_TYPE_KEY))
        .filter(|&code| code != 0 && code != USER_DEFINED)
        .map(Crs::from_epsg);

    Ok(GeoTiffInfo { affine, crs })
}

/// Inline value of a key in a GeoKeyDirectory (header of 4, then 4 per key)
fn geo_key_value(directory: &[u32], key_id: u32) -> Option<u32> {
    directory
        .get(4..)?
        .chunks_exact(4)
        .find(|entry| entry[0] == key_id && entry[1] == 0)
        .map(|entry| entry[3])
}

fn affine_from_transformation(m: &[f64]) -> Result<AffineGeoreference> {
    if m.len() < 16 {
        return Err(GeoAnnoError::InvalidGeometry(format!(
            "ModelTransformationTag has {} values, expected 16",
            m.len()
        )));
    }
    AffineGeoreference::new(m[0], m[1], m[3], m[4], m[5], m[7])
}

fn affine_from_tiepoint(scale: &[f64], tiepoint: &[f64]) -> Result<AffineGeoreference> {
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(GeoAnnoError::InvalidGeometry(
            "incomplete ModelPixelScaleTag / ModelTiepointTag".to_string(),
        ));
    }
    let (sx, sy) = (scale[0], scale[1]);
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    AffineGeoreference::new(sx, 0.0, x - i * sx, 0.0, -sy, y + j * sy)
}

/// PixelIsPoint rasters reference pixel centres; move the origin to the corner
fn shift_half_pixel(affine: AffineGeoreference) -> Result<AffineGeoreference> {
    AffineGeoreference::new(
        affine.a,
        affine.b,
        affine.c - 0.5 * (affine.a + affine.b),
        affine.d,
        affine.e,
        affine.f - 0.5 * (affine.d + affine.e),
    )
}
