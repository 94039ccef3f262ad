use crate::transforms::Transform;
use anyhow::{ensure, Context, Result};
use image::{DynamicImage, Rgb, Rgb32FImage, RgbImage};
use tch::{Kind, Tensor};

// ============================================================================
// EnsureRgb
// ============================================================================

/// Converts any decoded image to 8-bit RGB.
///
/// Grayscale is replicated across channels, alpha is dropped and 16-bit or
/// float sources are rescaled to `0..=255`.
#[derive(Debug, Clone, Copy)]
pub struct EnsureRgb;

impl Transform<DynamicImage, RgbImage> for EnsureRgb {
    fn apply(&self, img: DynamicImage) -> Result<RgbImage> {
        Ok(match img {
            DynamicImage::ImageRgb8(rgb) => rgb,
            other => other.to_rgb8(),
        })
    }
}

// ============================================================================
// ToFloatImage
// ============================================================================

/// Casts 8-bit pixels to `f32` without rescaling (values stay in `0..=255`).
#[derive(Debug, Clone, Copy)]
pub struct ToFloatImage;

pub(crate) fn to_float_image(img: &RgbImage) -> Rgb32FImage {
    Rgb32FImage::from_fn(img.width(), img.height(), |x, y| {
        Rgb(img.get_pixel(x, y).0.map(f32::from))
    })
}

impl Transform<RgbImage, Rgb32FImage> for ToFloatImage {
    fn apply(&self, img: RgbImage) -> Result<Rgb32FImage> {
        Ok(to_float_image(&img))
    }
}

// ============================================================================
// ToChannelFirst
// ============================================================================

/// Converts an interleaved `H × W × 3` float image into a contiguous
/// `[3, H, W]` f32 tensor.
///
/// # Example
/// ```ignore
/// let tensor = ToChannelFirst.apply(normalized)?;
/// assert_eq!(tensor.size(), vec![3, 224, 224]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ToChannelFirst;

impl Transform<Rgb32FImage, Tensor> for ToChannelFirst {
    fn apply(&self, img: Rgb32FImage) -> Result<Tensor> {
        let (width, height) = img.dimensions();
        ensure!(
            width > 0 && height > 0,
            "Image dimensions must be positive (got {}x{})",
            width,
            height
        );

        Tensor::from_slice(img.as_raw())
            .f_reshape([height as i64, width as i64, 3])
            .and_then(|t| t.f_permute([2, 0, 1]))
            .map(|t| t.contiguous().to_kind(Kind::Float))
            .context("Failed to reorder image to channel-first layout")
    }
}
