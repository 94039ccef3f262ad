use super::geometric::reflect_101;
use super::{uniform, RandomTransform};
use crate::transforms::Transform;
use anyhow::{ensure, Result};
use image::{Rgb, Rgb32FImage, RgbImage};
use rand::RngCore;

fn validate_range(name: &str, range: (f32, f32)) -> Result<()> {
    ensure!(
        range.0 <= range.1,
        "{} range must be ordered (got {:?})",
        name,
        range
    );
    Ok(())
}

// ============================================================================
// RandomBrightnessContrast
// ============================================================================

/// Linear photometric jitter: `out = in * (1 + contrast) + brightness * 255`.
///
/// `brightness` and `contrast` are drawn independently from their ranges on
/// every call; results are clipped to `[0, 255]`.
#[derive(Debug, Clone)]
pub struct RandomBrightnessContrast {
    brightness: (f32, f32),
    contrast: (f32, f32),
}

impl RandomBrightnessContrast {
    pub fn new(brightness: (f32, f32), contrast: (f32, f32)) -> Result<Self> {
        validate_range("Brightness", brightness)?;
        validate_range("Contrast", contrast)?;
        Ok(Self {
            brightness,
            contrast,
        })
    }
}

impl RandomTransform for RandomBrightnessContrast {
    fn apply_with_rng(&self, mut img: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        let alpha = 1.0 + uniform(rng, self.contrast.0, self.contrast.1);
        let beta = uniform(rng, self.brightness.0, self.brightness.1) * 255.0;

        let lut: Vec<u8> = (0..=255u8)
            .map(|v| (v as f32 * alpha + beta).round().clamp(0.0, 255.0) as u8)
            .collect();
        img.iter_mut().for_each(|v| *v = lut[*v as usize]);
        Ok(img)
    }
}

// ============================================================================
// HueSaturationValue
// ============================================================================

/// Shifts hue, saturation and value by amounts drawn from `±limit`.
///
/// Limits use 8-bit HSV units: hue on the 0–179 half-degree scale, saturation
/// and value on 0–255. Hue wraps around; saturation and value are clipped.
#[derive(Debug, Clone)]
pub struct HueSaturationValue {
    hue_shift_limit: f32,
    sat_shift_limit: f32,
    val_shift_limit: f32,
}

impl HueSaturationValue {
    pub fn new(hue_shift_limit: f32, sat_shift_limit: f32, val_shift_limit: f32) -> Result<Self> {
        ensure!(
            hue_shift_limit >= 0.0 && sat_shift_limit >= 0.0 && val_shift_limit >= 0.0,
            "HSV shift limits must be non-negative"
        );
        Ok(Self {
            hue_shift_limit,
            sat_shift_limit,
            val_shift_limit,
        })
    }
}

impl RandomTransform for HueSaturationValue {
    fn apply_with_rng(&self, mut img: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        let hue_shift = uniform(rng, -self.hue_shift_limit, self.hue_shift_limit);
        let sat_shift = uniform(rng, -self.sat_shift_limit, self.sat_shift_limit) / 255.0;
        let val_shift = uniform(rng, -self.val_shift_limit, self.val_shift_limit) / 255.0;

        for pixel in img.pixels_mut() {
            let (h, s, v) = rgb_to_hsv(pixel);
            let h = (h + 2.0 * hue_shift).rem_euclid(360.0);
            let s = (s + sat_shift).clamp(0.0, 1.0);
            let v = (v + val_shift).clamp(0.0, 1.0);
            *pixel = hsv_to_rgb(h, s, v);
        }
        Ok(img)
    }
}

/// Returns hue in degrees `[0, 360)`, saturation and value in `[0, 1]`.
fn rgb_to_hsv(p: &Rgb<u8>) -> (f32, f32, f32) {
    let [r, g, b] = p.0.map(|c| c as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = max - min;

    let s = if max > 0.0 { diff / max } else { 0.0 };
    let h = if diff == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / diff
    } else if max == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    (h.rem_euclid(360.0), s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
    let c = v * s;
    let sector = h / 60.0;
    let x = c * (1.0 - (sector.rem_euclid(2.0) - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    Rgb([r, g, b].map(|ch| ((ch + m) * 255.0).round().clamp(0.0, 255.0) as u8))
}

// ============================================================================
// Clahe
// ============================================================================

/// Contrast-limited adaptive histogram equalization on the lightness channel.
///
/// The image is converted to CIE Lab, `L` is equalized per tile of an
/// `tiles_x × tiles_y` grid with histogram clipping, tile lookup tables are
/// blended bilinearly, and the result is converted back to RGB. The clip
/// limit is drawn uniformly from `clip_limit` on every call.
#[derive(Debug, Clone)]
pub struct Clahe {
    clip_limit: (f32, f32),
    tile_grid: (u32, u32),
}

impl Clahe {
    pub fn new(clip_limit: (f32, f32)) -> Result<Self> {
        Self::with_tile_grid(clip_limit, (8, 8))
    }

    pub fn with_tile_grid(clip_limit: (f32, f32), tile_grid: (u32, u32)) -> Result<Self> {
        validate_range("Clip limit", clip_limit)?;
        ensure!(clip_limit.0 > 0.0, "Clip limit must be positive (got {:?})", clip_limit);
        ensure!(
            tile_grid.0 > 0 && tile_grid.1 > 0,
            "Tile grid must be positive (got {:?})",
            tile_grid
        );
        Ok(Self {
            clip_limit,
            tile_grid,
        })
    }

    /// Equalizes a single 8-bit channel stored row-major as `width × height`.
    fn equalize(&self, channel: &[u8], width: u32, height: u32, clip: f32) -> Vec<u8> {
        let (tiles_x, tiles_y) = (self.tile_grid.0 as usize, self.tile_grid.1 as usize);
        let (w, h) = (width as usize, height as usize);
        let tile_w = w.div_ceil(tiles_x);
        let tile_h = h.div_ceil(tiles_y);
        let tile_area = (tile_w * tile_h) as f32;
        let clip_count = ((clip * tile_area / 256.0) as u32).max(1);
        let lut_scale = 255.0 / tile_area;

        // Tiles cover the frame padded by reflection up to a whole grid.
        let mut luts = vec![[0u8; 256]; tiles_x * tiles_y];
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let mut hist = [0u32; 256];
                for py in ty * tile_h..(ty + 1) * tile_h {
                    let sy = reflect_101(py as i64, h as i64) as usize;
                    for px in tx * tile_w..(tx + 1) * tile_w {
                        let sx = reflect_101(px as i64, w as i64) as usize;
                        hist[channel[sy * w + sx] as usize] += 1;
                    }
                }
                clip_histogram(&mut hist, clip_count);

                let lut = &mut luts[ty * tiles_x + tx];
                let mut cumulative = 0u32;
                for (bin, count) in hist.iter().enumerate() {
                    cumulative += count;
                    lut[bin] = (cumulative as f32 * lut_scale).round().clamp(0.0, 255.0) as u8;
                }
            }
        }

        let mut out = vec![0u8; channel.len()];
        for y in 0..h {
            let tyf = y as f32 / tile_h as f32 - 0.5;
            let ty1 = tyf.floor();
            let ya = tyf - ty1;
            let ty2 = ((ty1 as i64 + 1).min(tiles_y as i64 - 1)) as usize;
            let ty1 = ty1.max(0.0) as usize;
            for x in 0..w {
                let txf = x as f32 / tile_w as f32 - 0.5;
                let tx1 = txf.floor();
                let xa = txf - tx1;
                let tx2 = ((tx1 as i64 + 1).min(tiles_x as i64 - 1)) as usize;
                let tx1 = tx1.max(0.0) as usize;

                let v = channel[y * w + x] as usize;
                let top = luts[ty1 * tiles_x + tx1][v] as f32 * (1.0 - xa)
                    + luts[ty1 * tiles_x + tx2][v] as f32 * xa;
                let bottom = luts[ty2 * tiles_x + tx1][v] as f32 * (1.0 - xa)
                    + luts[ty2 * tiles_x + tx2][v] as f32 * xa;
                out[y * w + x] = (top * (1.0 - ya) + bottom * ya).round().clamp(0.0, 255.0) as u8;
            }
        }
        out
    }
}

/// Clips bins above `limit` and spreads the excess evenly over all bins.
fn clip_histogram(hist: &mut [u32; 256], limit: u32) {
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    if excess == 0 {
        return;
    }
    let batch = excess / 256;
    let residual = (excess % 256) as usize;
    hist.iter_mut().for_each(|bin| *bin += batch);
    if residual > 0 {
        let step = (256 / residual).max(1);
        for bin in hist.iter_mut().step_by(step).take(residual) {
            *bin += 1;
        }
    }
}

impl RandomTransform for Clahe {
    fn apply_with_rng(&self, img: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        let clip = uniform(rng, self.clip_limit.0, self.clip_limit.1);
        let (w, h) = img.dimensions();

        let lab: Vec<[f32; 3]> = img.pixels().map(rgb_to_lab).collect();
        let lightness: Vec<u8> = lab
            .iter()
            .map(|p| (p[0] * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8)
            .collect();
        let equalized = self.equalize(&lightness, w, h, clip);

        let mut out = RgbImage::new(w, h);
        for ((pixel, lab), l8) in out.pixels_mut().zip(lab.iter()).zip(equalized) {
            *pixel = lab_to_rgb([l8 as f32 * 100.0 / 255.0, lab[1], lab[2]]);
        }
        Ok(out)
    }
}

const LAB_EPSILON: f32 = 0.008856;
const WHITE_X: f32 = 0.950456;
const WHITE_Z: f32 = 1.088754;

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn lab_f(t: f32) -> f32 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn lab_f_inv(t: f32) -> f32 {
    let cube = t * t * t;
    if cube > LAB_EPSILON {
        cube
    } else {
        (t - 16.0 / 116.0) / 7.787
    }
}

/// sRGB (D65) to CIE Lab with `L` in `[0, 100]`.
fn rgb_to_lab(p: &Rgb<u8>) -> [f32; 3] {
    let [r, g, b] = p.0.map(|c| srgb_to_linear(c as f32 / 255.0));
    let x = (0.412_453 * r + 0.357_580 * g + 0.180_423 * b) / WHITE_X;
    let y = 0.212_671 * r + 0.715_160 * g + 0.072_169 * b;
    let z = (0.019_334 * r + 0.119_193 * g + 0.950_227 * b) / WHITE_Z;

    let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
    let l = if y > LAB_EPSILON {
        116.0 * fy - 16.0
    } else {
        903.3 * y
    };
    [l, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

fn lab_to_rgb([l, a, b]: [f32; 3]) -> Rgb<u8> {
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;
    let y = if l > 903.3 * LAB_EPSILON {
        fy * fy * fy
    } else {
        l / 903.3
    };
    let x = lab_f_inv(fx) * WHITE_X;
    let z = lab_f_inv(fz) * WHITE_Z;

    let r = 3.240_479 * x - 1.537_150 * y - 0.498_535 * z;
    let g = -0.969_256 * x + 1.875_991 * y + 0.041_556 * z;
    let b = 0.055_648 * x - 0.204_043 * y + 1.057_311 * z;
    Rgb([r, g, b].map(|c| (linear_to_srgb(c.clamp(0.0, 1.0)) * 255.0).round().clamp(0.0, 255.0) as u8))
}

// ============================================================================
// Normalize
// ============================================================================

/// Normalizes images using channel-wise statistics.
///
/// # Arguments:
/// - `mean`: per-channel means, on the `[0, 1]` scale
/// - `std`: per-channel standard deviations, on the `[0, 1]` scale
/// - `max_pixel_value`: value that maps to 1.0 (255 for 8-bit input)
///
/// # Mathematical Operation:
/// ```text
/// output[h, w, c] = (input[h, w, c] - mean[c] * max_pixel_value) / (std[c] * max_pixel_value)
/// ```
///
/// # Example
/// ```ignore
/// let norm = Normalize::imagenet();
/// let normalized: Rgb32FImage = norm.apply(rgb_image)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Normalize {
    mean: [f32; 3],
    std: [f32; 3],
    max_pixel_value: f32,
}

impl Normalize {
    pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
    pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

    /// Creates new normalization parameters.
    pub fn new(mean: &[f32], std: &[f32]) -> Result<Self> {
        ensure!(
            mean.len() == 3 && std.len() == 3,
            "Normalization expects 3 channels, got mean of length {} and std of length {}",
            mean.len(),
            std.len()
        );
        ensure!(
            std.iter().all(|s| *s > 0.0),
            "Normalization std must be positive (got {:?})",
            std
        );
        Ok(Self {
            mean: [mean[0], mean[1], mean[2]],
            std: [std[0], std[1], std[2]],
            max_pixel_value: 255.0,
        })
    }

    /// ImageNet standard normalization (RGB)
    pub fn imagenet() -> Self {
        Self {
            mean: Self::IMAGENET_MEAN,
            std: Self::IMAGENET_STD,
            max_pixel_value: 255.0,
        }
    }

    pub fn with_max_pixel_value(mut self, max_pixel_value: f32) -> Self {
        self.max_pixel_value = max_pixel_value;
        self
    }

    pub fn mean(&self) -> [f32; 3] {
        self.mean
    }

    pub fn std(&self) -> [f32; 3] {
        self.std
    }

    fn normalize_in_place(&self, img: &mut Rgb32FImage) {
        let scale = self.max_pixel_value;
        for pixel in img.pixels_mut() {
            for c in 0..3 {
                pixel[c] = (pixel[c] - self.mean[c] * scale) / (self.std[c] * scale);
            }
        }
    }
}

impl Transform<RgbImage, Rgb32FImage> for Normalize {
    fn apply(&self, img: RgbImage) -> Result<Rgb32FImage> {
        let mut out = super::conversion::to_float_image(&img);
        self.normalize_in_place(&mut out);
        Ok(out)
    }
}

/// Float input is taken to be on the `[0, max_pixel_value]` scale.
impl Transform<Rgb32FImage, Rgb32FImage> for Normalize {
    fn apply(&self, mut img: Rgb32FImage) -> Result<Rgb32FImage> {
        self.normalize_in_place(&mut img);
        Ok(img)
    }
}
