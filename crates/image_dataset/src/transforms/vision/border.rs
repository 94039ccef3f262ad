use crate::transforms::Transform;
use anyhow::Result;
use image::{imageops, RgbImage};

/// Crops away black margins: keeps the tightest rectangle holding every
/// pixel that is non-zero in at least one channel.
///
/// An image with no non-zero pixel at all is returned unchanged (with a
/// warning), since there is no box to crop to.
///
/// # Example
/// ```ignore
/// let cropped = CropBlackBorder.apply(letterboxed)?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct CropBlackBorder;

impl CropBlackBorder {
    /// Inclusive bounding box `(x0, y0, x1, y1)` of non-black pixels.
    pub fn bounding_box(img: &RgbImage) -> Option<(u32, u32, u32, u32)> {
        img.enumerate_pixels()
            .filter(|(_, _, p)| p.0.iter().any(|v| *v > 0))
            .fold(None, |bbox, (x, y, _)| match bbox {
                None => Some((x, y, x, y)),
                Some((x0, y0, x1, y1)) => Some((x0.min(x), y0.min(y), x1.max(x), y1.max(y))),
            })
    }
}

impl Transform<RgbImage, RgbImage> for CropBlackBorder {
    fn apply(&self, img: RgbImage) -> Result<RgbImage> {
        match Self::bounding_box(&img) {
            None => {
                log::warn!(
                    "image of {}x{} is entirely black, skipping border crop",
                    img.width(),
                    img.height()
                );
                Ok(img)
            }
            Some((0, 0, x1, y1)) if x1 + 1 == img.width() && y1 + 1 == img.height() => Ok(img),
            Some((x0, y0, x1, y1)) => {
                Ok(imageops::crop_imm(&img, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_crops_black_margins() -> Result<()> {
        let img = RgbImage::from_fn(10, 8, |x, y| {
            if (2..7).contains(&x) && (1..5).contains(&y) {
                Rgb([0, 0, 9])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let out = CropBlackBorder.apply(img)?;
        assert_eq!(out.dimensions(), (5, 4));
        assert!(out.pixels().all(|p| p.0 == [0, 0, 9]));
        Ok(())
    }

    #[test]
    fn test_interior_black_pixels_are_kept() -> Result<()> {
        let mut img = RgbImage::from_pixel(6, 6, Rgb([0, 0, 0]));
        img.put_pixel(1, 1, Rgb([1, 0, 0]));
        img.put_pixel(4, 3, Rgb([0, 1, 0]));
        let out = CropBlackBorder.apply(img)?;
        assert_eq!(out.dimensions(), (4, 3));
        assert_eq!(out.get_pixel(1, 1), &Rgb([0, 0, 0]));
        Ok(())
    }

    #[test]
    fn test_all_black_image_is_left_alone() -> Result<()> {
        let img = RgbImage::new(7, 5);
        assert_eq!(CropBlackBorder::bounding_box(&img), None);
        let out = CropBlackBorder.apply(img)?;
        assert_eq!(out.dimensions(), (7, 5));
        Ok(())
    }
}
