use super::{uniform, RandomTransform};
use anyhow::{ensure, Result};
use image::{imageops, imageops::FilterType, Rgb, RgbImage};
use rand::{Rng, RngCore};

// ============================================================================
// Resize
// ============================================================================

/// Resizes an image to exactly `width × height` with a bilinear filter.
///
/// Unlike `DynamicImage::resize`, the aspect ratio is *not* preserved: the
/// output always has the requested dimensions, which is what lets a pipeline
/// guarantee a fixed `S × S` output whatever happened before it.
///
/// # Examples
/// ``` ignore
/// let resize = Resize::new(256, 256)?;
/// let resized = resize.apply(img)?;
/// assert_eq!(resized.dimensions(), (256, 256));
/// ```
#[derive(Debug, Clone)]
pub struct Resize {
    width: u32,
    height: u32,
    filter: FilterType,
}

impl Resize {
    /// Creates a new Resize transform.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        ensure!(
            width > 0 && height > 0,
            "Image dimensions must be positive after resizing (got {}x{})",
            width,
            height
        );
        Ok(Self {
            width,
            height,
            filter: FilterType::Triangle,
        })
    }

    /// Overrides the resampling filter (bilinear by default).
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl RandomTransform for Resize {
    fn apply_with_rng(&self, img: RgbImage, _rng: &mut dyn RngCore) -> Result<RgbImage> {
        if img.dimensions() == (self.width, self.height) {
            return Ok(img);
        }
        Ok(imageops::resize(&img, self.width, self.height, self.filter))
    }
}

// ============================================================================
// RandomResizedCrop
// ============================================================================

/// Crops a random region and resizes it to `width × height`.
///
/// The region area is `scale` times the input area and its aspect ratio is
/// log-uniform in `ratio`. When ten attempts fail to fit a region inside the
/// image (common with `scale > 1`), a centered crop with the aspect ratio
/// clamped to `ratio` is used instead.
#[derive(Debug, Clone)]
pub struct RandomResizedCrop {
    width: u32,
    height: u32,
    scale: (f32, f32),
    ratio: (f32, f32),
}

impl RandomResizedCrop {
    const MAX_ATTEMPTS: usize = 10;

    pub fn new(width: u32, height: u32, scale: (f32, f32)) -> Result<Self> {
        Self::with_ratio(width, height, scale, (3.0 / 4.0, 4.0 / 3.0))
    }

    pub fn with_ratio(width: u32, height: u32, scale: (f32, f32), ratio: (f32, f32)) -> Result<Self> {
        ensure!(
            width > 0 && height > 0,
            "Crop size must be positive (got {}x{})",
            width,
            height
        );
        ensure!(
            scale.0 > 0.0 && scale.0 <= scale.1,
            "Scale range must be positive and ordered (got {:?})",
            scale
        );
        ensure!(
            ratio.0 > 0.0 && ratio.0 <= ratio.1,
            "Aspect ratio range must be positive and ordered (got {:?})",
            ratio
        );
        Ok(Self {
            width,
            height,
            scale,
            ratio,
        })
    }

    /// Picks the crop window `(x, y, w, h)` for an image of the given size.
    fn crop_window(&self, img_w: u32, img_h: u32, rng: &mut dyn RngCore) -> (u32, u32, u32, u32) {
        let area = img_w as f32 * img_h as f32;
        let log_ratio = (self.ratio.0.ln(), self.ratio.1.ln());

        for _ in 0..Self::MAX_ATTEMPTS {
            let target_area = uniform(rng, self.scale.0, self.scale.1) * area;
            let aspect = uniform(rng, log_ratio.0, log_ratio.1).exp();
            let w = (target_area * aspect).sqrt().round() as u32;
            let h = (target_area / aspect).sqrt().round() as u32;
            if w > 0 && h > 0 && w <= img_w && h <= img_h {
                let x = rng.random_range(0..=img_w - w);
                let y = rng.random_range(0..=img_h - h);
                return (x, y, w, h);
            }
        }

        // Fallback to a centered crop
        let in_ratio = img_w as f32 / img_h as f32;
        let (w, h) = if in_ratio < self.ratio.0 {
            (img_w, (img_w as f32 / self.ratio.0).round() as u32)
        } else if in_ratio > self.ratio.1 {
            ((img_h as f32 * self.ratio.1).round() as u32, img_h)
        } else {
            (img_w, img_h)
        };
        let w = w.clamp(1, img_w);
        let h = h.clamp(1, img_h);
        ((img_w - w) / 2, (img_h - h) / 2, w, h)
    }
}

impl RandomTransform for RandomResizedCrop {
    fn apply_with_rng(&self, img: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        let (img_w, img_h) = img.dimensions();
        ensure!(
            img_w > 0 && img_h > 0,
            "Cannot crop an empty image ({}x{})",
            img_w,
            img_h
        );
        let (x, y, w, h) = self.crop_window(img_w, img_h, rng);
        let crop = imageops::crop_imm(&img, x, y, w, h).to_image();
        Ok(imageops::resize(&crop, self.width, self.height, FilterType::Triangle))
    }
}

// ============================================================================
// HorizontalFlip
// ============================================================================

/// Mirrors the image left-to-right. The gate probability lives on the
/// pipeline step, so the operation itself always flips.
#[derive(Debug, Clone, Copy, Default)]
pub struct HorizontalFlip;

impl RandomTransform for HorizontalFlip {
    fn apply_with_rng(&self, mut img: RgbImage, _rng: &mut dyn RngCore) -> Result<RgbImage> {
        imageops::flip_horizontal_in_place(&mut img);
        Ok(img)
    }
}

// ============================================================================
// ShiftScaleRotate
// ============================================================================

/// Random affine transform around the image center.
///
/// - shift: fraction of width/height, uniform in `[-shift_limit, shift_limit]`
/// - scale: `1 + u`, `u` uniform in `[-scale_limit, scale_limit]`
/// - rotation: degrees, uniform in `[-rotate_limit, rotate_limit]`
///
/// Pixels pulled from outside the frame are mirrored (reflect-101).
#[derive(Debug, Clone)]
pub struct ShiftScaleRotate {
    shift_limit: f32,
    scale_limit: f32,
    rotate_limit: f32,
}

impl ShiftScaleRotate {
    pub fn new(shift_limit: f32, scale_limit: f32, rotate_limit: f32) -> Result<Self> {
        ensure!(
            shift_limit >= 0.0 && scale_limit >= 0.0 && rotate_limit >= 0.0,
            "ShiftScaleRotate limits must be non-negative (got {}, {}, {})",
            shift_limit,
            scale_limit,
            rotate_limit
        );
        ensure!(scale_limit < 1.0, "scale_limit must be below 1.0 (got {})", scale_limit);
        Ok(Self {
            shift_limit,
            scale_limit,
            rotate_limit,
        })
    }
}

impl RandomTransform for ShiftScaleRotate {
    fn apply_with_rng(&self, img: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        let angle = uniform(rng, -self.rotate_limit, self.rotate_limit);
        let scale = 1.0 + uniform(rng, -self.scale_limit, self.scale_limit);
        let dx = uniform(rng, -self.shift_limit, self.shift_limit);
        let dy = uniform(rng, -self.shift_limit, self.shift_limit);

        let (w, h) = img.dimensions();
        let mut matrix = rotation_matrix(w as f32 / 2.0, h as f32 / 2.0, angle, scale);
        matrix[0][2] += dx * w as f32;
        matrix[1][2] += dy * h as f32;
        warp_affine(&img, matrix)
    }
}

// ============================================================================
// Sampling helpers shared by the warping transforms
// ============================================================================

/// 2×3 affine matrix mapping source coordinates to destination coordinates.
pub(crate) type Affine = [[f32; 3]; 2];

/// Rotation by `angle_deg` (counter-clockwise on screen) and uniform `scale`
/// about `(cx, cy)`.
pub(crate) fn rotation_matrix(cx: f32, cy: f32, angle_deg: f32, scale: f32) -> Affine {
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let alpha = scale * cos;
    let beta = scale * sin;
    [
        [alpha, beta, (1.0 - alpha) * cx - beta * cy],
        [-beta, alpha, beta * cx + (1.0 - alpha) * cy],
    ]
}

fn invert_affine(m: Affine) -> Result<Affine> {
    let [[a, b, c], [d, e, f]] = m;
    let det = a * e - b * d;
    ensure!(det.abs() > f32::EPSILON, "Affine matrix is not invertible");
    let inv = 1.0 / det;
    Ok([
        [e * inv, -b * inv, (b * f - e * c) * inv],
        [-d * inv, a * inv, (d * c - a * f) * inv],
    ])
}

/// Warps `img` by `matrix` into an output of the same size.
pub(crate) fn warp_affine(img: &RgbImage, matrix: Affine) -> Result<RgbImage> {
    let [[a, b, c], [d, e, f]] = invert_affine(matrix)?;
    let (w, h) = img.dimensions();
    Ok(remap(img, w, h, |x, y| {
        (a * x + b * y + c, d * x + e * y + f)
    }))
}

/// Builds a `width × height` image where each output pixel `(x, y)` is read
/// from `img` at `map(x, y)` with bilinear interpolation and reflect-101 borders.
pub(crate) fn remap<F>(img: &RgbImage, width: u32, height: u32, map: F) -> RgbImage
where
    F: Fn(f32, f32) -> (f32, f32),
{
    RgbImage::from_fn(width, height, |x, y| {
        let (sx, sy) = map(x as f32, y as f32);
        sample_bilinear(img, sx, sy)
    })
}

/// Mirror index into `0..len` without repeating the edge pixel (OpenCV's
/// `BORDER_REFLECT_101`).
pub(crate) fn reflect_101(i: i64, len: i64) -> i64 {
    if len <= 1 {
        return 0;
    }
    let period = 2 * len - 2;
    let i = i.rem_euclid(period);
    if i >= len {
        period - i
    } else {
        i
    }
}

fn sample_bilinear(img: &RgbImage, sx: f32, sy: f32) -> Rgb<u8> {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let sx = if sx.is_finite() { sx } else { 0.0 };
    let sy = if sy.is_finite() { sy } else { 0.0 };

    let x0f = sx.floor();
    let y0f = sy.floor();
    let fx = sx - x0f;
    let fy = sy - y0f;
    let x0 = x0f as i64;
    let y0 = y0f as i64;

    let xs = [reflect_101(x0, w) as u32, reflect_101(x0 + 1, w) as u32];
    let ys = [reflect_101(y0, h) as u32, reflect_101(y0 + 1, h) as u32];
    let weights = [
        (1.0 - fx) * (1.0 - fy),
        fx * (1.0 - fy),
        (1.0 - fx) * fy,
        fx * fy,
    ];
    let taps = [
        img.get_pixel(xs[0], ys[0]),
        img.get_pixel(xs[1], ys[0]),
        img.get_pixel(xs[0], ys[1]),
        img.get_pixel(xs[1], ys[1]),
    ];

    let mut out = [0u8; 3];
    for (c, value) in out.iter_mut().enumerate() {
        let acc: f32 = taps
            .iter()
            .zip(weights.iter())
            .map(|(p, wgt)| p[c] as f32 * wgt)
            .sum();
        *value = acc.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}
