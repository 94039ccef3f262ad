//! Non-rigid warps: lens distortion, grid distortion and elastic deformation.
//!
//! All three build a dense sampling map and hand it to [`remap`], so borders
//! are reflected (101) and sampling is bilinear like the affine warps.

use super::geometric::{reflect_101, remap, warp_affine, Affine};
use super::{uniform, RandomTransform};
use anyhow::{ensure, Result};
use image::RgbImage;
use rand::{Rng, RngCore};

// ============================================================================
// OpticalDistortion
// ============================================================================

/// Barrel / pincushion distortion through a pinhole camera model.
///
/// A single coefficient `k ∈ [-distort_limit, distort_limit]` is used for
/// both radial terms, so a normalized point at radius `r` moves by a factor
/// of `1 + k·r² + k·r⁴`. The principal point sits at the image center,
/// shifted by `[-shift_limit, shift_limit]` pixels (rounded).
#[derive(Debug, Clone)]
pub struct OpticalDistortion {
    distort_limit: f32,
    shift_limit: f32,
}

impl OpticalDistortion {
    pub fn new(distort_limit: f32, shift_limit: f32) -> Result<Self> {
        ensure!(
            distort_limit >= 0.0 && shift_limit >= 0.0,
            "Distortion limits must be non-negative (got {}, {})",
            distort_limit,
            shift_limit
        );
        Ok(Self {
            distort_limit,
            shift_limit,
        })
    }
}

impl RandomTransform for OpticalDistortion {
    fn apply_with_rng(&self, img: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        let k = uniform(rng, -self.distort_limit, self.distort_limit);
        let dx = uniform(rng, -self.shift_limit, self.shift_limit).round();
        let dy = uniform(rng, -self.shift_limit, self.shift_limit).round();

        let (w, h) = img.dimensions();
        let (fx, fy) = (w as f32, h as f32);
        let (cx, cy) = (fx * 0.5 + dx, fy * 0.5 + dy);

        Ok(remap(&img, w, h, |u, v| {
            let x = (u - cx) / fx;
            let y = (v - cy) / fy;
            let r2 = x * x + y * y;
            let radial = 1.0 + k * r2 + k * r2 * r2;
            (fx * x * radial + cx, fy * y * radial + cy)
        }))
    }
}

// ============================================================================
// GridDistortion
// ============================================================================

/// Splits each axis into `num_steps` cells and stretches every cell by a
/// random factor `1 + U(-distort_limit, distort_limit)`; the last cell absorbs
/// the remainder so the frame still ends at the image edge.
#[derive(Debug, Clone)]
pub struct GridDistortion {
    num_steps: u32,
    distort_limit: f32,
}

impl GridDistortion {
    pub fn new(num_steps: u32, distort_limit: f32) -> Result<Self> {
        ensure!(num_steps > 0, "Grid distortion needs at least one step");
        ensure!(
            distort_limit >= 0.0,
            "Distortion limit must be non-negative (got {})",
            distort_limit
        );
        Ok(Self {
            num_steps,
            distort_limit,
        })
    }

    fn sample_steps(&self, rng: &mut dyn RngCore) -> Vec<f32> {
        (0..=self.num_steps)
            .map(|_| 1.0 + uniform(rng, -self.distort_limit, self.distort_limit))
            .collect()
    }

    /// Source coordinate for every output coordinate along one axis.
    fn axis_map(&self, len: u32, steps: &[f32]) -> Vec<f32> {
        let len = len as usize;
        let step = (len / self.num_steps as usize).max(1);
        let mut coords = vec![0.0f32; len];
        let mut prev = 0.0f32;

        for (idx, start) in (0..len).step_by(step).enumerate() {
            let (end, cur) = if start + step > len {
                (len, len as f32)
            } else {
                let factor = steps[idx.min(steps.len() - 1)];
                (start + step, prev + step as f32 * factor)
            };
            let n = end - start;
            for (i, slot) in coords[start..end].iter_mut().enumerate() {
                *slot = if n > 1 {
                    prev + (cur - prev) * i as f32 / (n - 1) as f32
                } else {
                    prev
                };
            }
            prev = cur;
        }
        coords
    }
}

impl RandomTransform for GridDistortion {
    fn apply_with_rng(&self, img: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        let x_steps = self.sample_steps(rng);
        let y_steps = self.sample_steps(rng);
        let (w, h) = img.dimensions();
        let xs = self.axis_map(w, &x_steps);
        let ys = self.axis_map(h, &y_steps);

        Ok(remap(&img, w, h, |x, y| (xs[x as usize], ys[y as usize])))
    }
}

// ============================================================================
// ElasticTransform
// ============================================================================

/// Random affine jitter followed by a smooth random displacement field.
///
/// Three control points around the center move by up to `alpha_affine`
/// pixels to define the affine part. Each pixel is then displaced by
/// `alpha * G_sigma(U(-1, 1))`, a gaussian-smoothed uniform noise field.
#[derive(Debug, Clone)]
pub struct ElasticTransform {
    alpha: f32,
    sigma: f32,
    alpha_affine: f32,
}

impl ElasticTransform {
    pub fn new(alpha: f32, sigma: f32, alpha_affine: f32) -> Result<Self> {
        ensure!(
            alpha >= 0.0 && alpha_affine >= 0.0,
            "Elastic alpha values must be non-negative (got {}, {})",
            alpha,
            alpha_affine
        );
        ensure!(sigma > 0.0, "Elastic sigma must be positive (got {})", sigma);
        Ok(Self {
            alpha,
            sigma,
            alpha_affine,
        })
    }

    fn displacement_field(&self, w: usize, h: usize, rng: &mut dyn RngCore) -> Vec<f32> {
        let noise: Vec<f32> = (0..w * h)
            .map(|_| rng.random::<f32>() * 2.0 - 1.0)
            .collect();
        let mut field = gaussian_smooth(&noise, w, h, self.sigma);
        field.iter_mut().for_each(|v| *v *= self.alpha);
        field
    }
}

impl RandomTransform for ElasticTransform {
    fn apply_with_rng(&self, img: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
        let (w, h) = img.dimensions();
        let center = [(h / 2) as f32, (w / 2) as f32];
        let square = (w.min(h) / 3) as f32;

        let src = [
            [center[0] + square, center[1] + square],
            [center[0] + square, center[1] - square],
            [center[0] - square, center[1] - square],
        ];
        let mut dst = src;
        for point in dst.iter_mut() {
            for coord in point.iter_mut() {
                *coord += uniform(rng, -self.alpha_affine, self.alpha_affine);
            }
        }
        let warped = if square > 0.0 {
            warp_affine(&img, affine_from_points(src, dst)?)?
        } else {
            img
        };

        let (wu, hu) = (w as usize, h as usize);
        let dx = self.displacement_field(wu, hu, rng);
        let dy = self.displacement_field(wu, hu, rng);

        Ok(remap(&warped, w, h, |x, y| {
            let i = y as usize * wu + x as usize;
            (x + dx[i], y + dy[i])
        }))
    }
}

/// Solves for the affine matrix taking the three `src` points onto `dst`.
fn affine_from_points(src: [[f32; 2]; 3], dst: [[f32; 2]; 3]) -> Result<Affine> {
    let [[x0, y0], [x1, y1], [x2, y2]] = src;
    let det = x0 * (y1 - y2) - y0 * (x1 - x2) + (x1 * y2 - x2 * y1);
    ensure!(det.abs() > f32::EPSILON, "Affine control points are collinear");

    // Cramer's rule, once per output coordinate.
    let solve = |t0: f32, t1: f32, t2: f32| -> [f32; 3] {
        let a = (t0 * (y1 - y2) - y0 * (t1 - t2) + (t1 * y2 - t2 * y1)) / det;
        let b = (x0 * (t1 - t2) - t0 * (x1 - x2) + (x1 * t2 - x2 * t1)) / det;
        let c = (x0 * (y1 * t2 - y2 * t1) - y0 * (x1 * t2 - x2 * t1) + t0 * (x1 * y2 - x2 * y1))
            / det;
        [a, b, c]
    };
    Ok([
        solve(dst[0][0], dst[1][0], dst[2][0]),
        solve(dst[0][1], dst[1][1], dst[2][1]),
    ])
}

/// Separable gaussian smoothing of a single-channel `w × h` field, truncated
/// at four sigma, with reflect-101 borders.
fn gaussian_smooth(field: &[f32], w: usize, h: usize, sigma: f32) -> Vec<f32> {
    let radius = (4.0 * sigma).ceil() as i64;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|v| *v /= total);

    let mut rows = vec![0.0f32; field.len()];
    for y in 0..h {
        for x in 0..w {
            rows[y * w + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| {
                    let sx = reflect_101(x as i64 + k as i64 - radius, w as i64) as usize;
                    field[y * w + sx] * weight
                })
                .sum();
        }
    }

    let mut out = vec![0.0f32; field.len()];
    for y in 0..h {
        for x in 0..w {
            out[y * w + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| {
                    let sy = reflect_101(y as i64 + k as i64 - radius, h as i64) as usize;
                    rows[sy * w + x] * weight
                })
                .sum();
        }
    }
    out
}
