//! Dataset samples and image decoding.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Result};

/// An image file and its class label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostureSample {
    /// Image path.
    pub path: PathBuf,

    /// Class label.
    pub label: usize,
}

impl PostureSample {
    /// Creates a sample.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, label: usize) -> Self {
        Self {
            path: path.into(),
            label,
        }
    }

    /// Decodes the image into a CHW pixel buffer.
    ///
    /// # Errors
    ///
    /// Returns `DatasetError::ImageDecode` if the file cannot be decoded.
    pub fn load(&self, output_size: u32, normalization: Option<&Normalization>) -> Result<LoadedSample> {
        Ok(LoadedSample {
            pixels: load_image(&self.path, output_size, normalization)?,
            label: self.label,
        })
    }
}

/// A decoded sample ready for collation.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSample {
    /// `[3, S, S]` pixels, row-major.
    pub pixels: Vec<f32>,

    /// Class label.
    pub label: usize,
}

/// Per-channel normalization applied after scaling to `[0, 1]`.
///
/// # Example
///
/// ```
/// use ml_dataset::Normalization;
///
/// let norm = Normalization::imagenet();
/// assert!((norm.apply(0, 0.485)).abs() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    /// Channel means.
    pub mean: [f32; 3],

    /// Channel standard deviations.
    pub std: [f32; 3],
}

impl Normalization {
    /// `ImageNet` channel statistics.
    #[must_use]
    pub const fn imagenet() -> Self {
        Self {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }

    /// Normalizes one value of `channel`.
    #[must_use]
    pub fn apply(&self, channel: usize, value: f32) -> f32 {
        (value - self.mean[channel]) / self.std[channel]
    }

    /// Returns `true` if every standard deviation is positive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.std.iter().all(|s| s.is_finite() && *s > 0.0)
    }
}

impl Default for Normalization {
    fn default() -> Self {
        Self::imagenet()
    }
}

/// Decodes an image, converts it to RGB, resizes it to `size` x `size` and
/// lays it out CHW in `[0, 1]`, then normalizes if asked.
///
/// # Errors
///
/// Returns `DatasetError::ImageDecode` if the file cannot be opened or decoded.
pub fn load_image(path: &Path, size: u32, normalization: Option<&Normalization>) -> Result<Vec<f32>> {
    let decoded = image::open(path).map_err(|e| DatasetError::image_decode(path.display().to_string(), e.to_string()))?;
    let rgb = image::imageops::resize(&decoded.to_rgb8(), size, size, FilterType::Triangle);

    let plane = (size as usize) * (size as usize);
    let mut pixels = vec![0.0; 3 * plane];
    for (index, pixel) in rgb.pixels().enumerate() {
        for channel in 0..3 {
            let value = f32::from(pixel[channel]) / 255.0;
            pixels[channel * plane + index] = match normalization {
                Some(norm) => norm.apply(channel, value),
                None => value,
            };
        }
    }
    Ok(pixels)
}
