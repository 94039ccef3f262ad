use super::geometric::reflect_101;
use super::{uniform, RandomTransform};
use anyhow::{anyhow, ensure, Result};
use image::{ImageBuffer, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use imageproc::filter::{gaussian_blur_f32, median_filter};
use rand::{Rng, RngCore};
use rand_distr::{Distribution, Normal};

/// Picks an odd kernel size uniformly from `[3, limit]`.
fn odd_kernel_size(limit: u32, rng: &mut dyn RngCore) -> u32 {
    let choices = (limit.max(3) - 3) / 2 + 1;
    3 + 2 * rng.random_range(0..choices)
}

fn validate_blur_limit(limit: u32) -> Result<()> {
    ensure!(
        limit >= 3 && limit % 2 == 1,
        "Blur limit must be an odd kernel size >= 3 (got {})",
        limit
    );
    Ok(())
}

// ============================================================================
// GaussNoise
// ============================================================================

/// Adds zero-mean gaussian noise, independently per pixel and channel.
/// The variance is drawn uniformly from `var_limit` on every call.
#[derive(Debug, Clone)]
pub struct GaussNoise {
    var_limit: (f32, f32),
}

impl GaussNoise {
    pub fn new(var_limit: (f32, f32)) -> Result<Self> {
        ensure!(
            var_limit.0 >= 0.0 && var_limit.0 <= var_limit.1,
            "Noise variance range must be non-negative and ordered (got {:?})",
            var_limit
        );
        Ok(Self { var_limit })
    }
}

impl RandomTransform for GaussNoise {
    fn apply_with_rng(&self, mut img: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        let sigma = uniform(rng, self.var_limit.0, self.var_limit.1).sqrt();
        let normal = Normal::new(0.0f32, sigma)
            .map_err(|e| anyhow!("Invalid noise sigma {}: {}", sigma, e))?;
        for value in img.iter_mut() {
            let noisy = *value as f32 + normal.sample(&mut *rng);
            *value = noisy.round().clamp(0.0, 255.0) as u8;
        }
        Ok(img)
    }
}

// ============================================================================
// MotionBlur
// ============================================================================

/// Convolves with a normalized kernel holding a single random line segment,
/// mimicking camera shake. Kernel size is odd in `[3, blur_limit]`.
#[derive(Debug, Clone)]
pub struct MotionBlur {
    blur_limit: u32,
}

impl MotionBlur {
    pub fn new(blur_limit: u32) -> Result<Self> {
        validate_blur_limit(blur_limit)?;
        Ok(Self { blur_limit })
    }

    fn kernel(ksize: usize, rng: &mut dyn RngCore) -> Vec<f32> {
        let x1 = rng.random_range(0..ksize);
        let x2 = rng.random_range(0..ksize);
        let (y1, y2) = if x1 == x2 {
            // vertical segment: force two distinct rows
            let y1 = rng.random_range(0..ksize);
            let mut y2 = rng.random_range(0..ksize - 1);
            if y2 >= y1 {
                y2 += 1;
            }
            (y1, y2)
        } else {
            (rng.random_range(0..ksize), rng.random_range(0..ksize))
        };

        let side = ksize as u32;
        let mut canvas: ImageBuffer<Luma<f32>, Vec<f32>> = ImageBuffer::new(side, side);
        draw_line_segment_mut(
            &mut canvas,
            (x1 as f32, y1 as f32),
            (x2 as f32, y2 as f32),
            Luma([1.0]),
        );
        let mut kernel = canvas.into_raw();
        let total: f32 = kernel.iter().sum();
        kernel.iter_mut().for_each(|v| *v /= total);
        kernel
    }
}

impl RandomTransform for MotionBlur {
    fn apply_with_rng(&self, img: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        let ksize = odd_kernel_size(self.blur_limit, rng) as usize;
        let kernel = Self::kernel(ksize, rng);
        Ok(filter_2d(&img, &kernel, ksize))
    }
}

/// Correlates each channel with a `ksize × ksize` kernel anchored at its
/// center, reflecting (101) at the borders. `imageproc::filter::filter`
/// clamps at the borders instead, so it is not used here.
fn filter_2d(img: &RgbImage, kernel: &[f32], ksize: usize) -> RgbImage {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let half = (ksize / 2) as i64;
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let mut acc = [0.0f32; 3];
        for ky in 0..ksize as i64 {
            for kx in 0..ksize as i64 {
                let weight = kernel[(ky as usize) * ksize + kx as usize];
                if weight == 0.0 {
                    continue;
                }
                let sx = reflect_101(x as i64 + kx - half, w) as u32;
                let sy = reflect_101(y as i64 + ky - half, h) as u32;
                let p = img.get_pixel(sx, sy);
                for c in 0..3 {
                    acc[c] += p[c] as f32 * weight;
                }
            }
        }
        Rgb(acc.map(|v| v.round().clamp(0.0, 255.0) as u8))
    })
}

// ============================================================================
// MedianBlur
// ============================================================================

/// Per-channel median filter with an odd square window in `[3, blur_limit]`.
#[derive(Debug, Clone)]
pub struct MedianBlur {
    blur_limit: u32,
}

impl MedianBlur {
    pub fn new(blur_limit: u32) -> Result<Self> {
        validate_blur_limit(blur_limit)?;
        Ok(Self { blur_limit })
    }
}

impl RandomTransform for MedianBlur {
    fn apply_with_rng(&self, img: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        let radius = odd_kernel_size(self.blur_limit, rng) / 2;
        Ok(median_filter(&img, radius, radius))
    }
}

// ============================================================================
// GaussianBlur
// ============================================================================

/// Gaussian blur with an odd kernel size in `[3, blur_limit]`; sigma follows
/// the kernel size the way OpenCV derives it when none is given.
#[derive(Debug, Clone)]
pub struct GaussianBlur {
    blur_limit: u32,
}

impl GaussianBlur {
    pub fn new(blur_limit: u32) -> Result<Self> {
        validate_blur_limit(blur_limit)?;
        Ok(Self { blur_limit })
    }

    fn sigma_for(ksize: u32) -> f32 {
        0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
    }
}

impl RandomTransform for GaussianBlur {
    fn apply_with_rng(&self, img: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        let sigma = Self::sigma_for(odd_kernel_size(self.blur_limit, rng));
        Ok(gaussian_blur_f32(&img, sigma))
    }
}

// ============================================================================
// Cutout
// ============================================================================

/// Blanks `num_holes` rectangles of `hole_height × hole_width` at random
/// centers. Holes are clipped to the frame, so they may come out smaller.
#[derive(Debug, Clone)]
pub struct Cutout {
    num_holes: usize,
    hole_height: u32,
    hole_width: u32,
    fill: [u8; 3],
}

impl Cutout {
    pub fn new(num_holes: usize, hole_height: u32, hole_width: u32) -> Result<Self> {
        ensure!(num_holes > 0, "Cutout needs at least one hole");
        Ok(Self {
            num_holes,
            hole_height,
            hole_width,
            fill: [0, 0, 0],
        })
    }

    pub fn with_fill(mut self, fill: [u8; 3]) -> Self {
        self.fill = fill;
        self
    }
}

impl RandomTransform for Cutout {
    fn apply_with_rng(&self, mut img: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 {
            return Ok(img);
        }
        for _ in 0..self.num_holes {
            let cy = rng.random_range(0..h);
            let cx = rng.random_range(0..w);
            let y1 = cy.saturating_sub(self.hole_height / 2).min(h);
            let x1 = cx.saturating_sub(self.hole_width / 2).min(w);
            let y2 = (y1 + self.hole_height).min(h);
            let x2 = (x1 + self.hole_width).min(w);
            for y in y1..y2 {
                for x in x1..x2 {
                    img.put_pixel(x, y, Rgb(self.fill));
                }
            }
        }
        Ok(img)
    }
}
