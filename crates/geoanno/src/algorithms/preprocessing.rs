use image::{GrayImage, Luma};
use imageproc::{filter::filter3x3, map::map_colors};
use crate::{error::Result, traits::ImagePreprocessor};

/// Integer 3x3 Gaussian, weights sum to 16
const GAUSSIAN_3X3: [i32; 9] = [
    1, 2, 1,
    2, 4, 2,
    1, 2, 1,
];

/// Mixed second derivative d²/dxdy (outer product of two central differences)
const CROSS_DERIVATIVE_3X3: [i32; 9] = [
     1, 0, -1,
     0, 0,  0,
    -1, 0,  1,
];

/// Fixed 3x3 Gaussian smoothing with rounded 8-bit output
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianBlur3x3;

impl ImagePreprocessor for GaussianBlur3x3 {
    fn preprocess(&self, image: &GrayImage) -> Result<GrayImage> {
        let weighted = filter3x3::<_, i32, i16>(image, &GAUSSIAN_3X3);
        Ok(map_colors(&weighted, |p: Luma<i16>| {
            Luma([((i32::from(p[0]) + 8) / 16).clamp(0, 255) as u8])
        }))
    }
}

/// Absolute mixed-derivative response, saturated to 8 bits
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossDerivativeMagnitude;

impl ImagePreprocessor for CrossDerivativeMagnitude {
    fn preprocess(&self, image: &GrayImage) -> Result<GrayImage> {
        let response = filter3x3::<_, i32, i16>(image, &CROSS_DERIVATIVE_3X3);
        Ok(map_colors(&response, |p: Luma<i16>| {
            Luma([p[0].unsigned_abs().min(255) as u8])
        }))
    }
}
