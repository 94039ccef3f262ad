//! src/transforms/vision/mod.rs
//!
//! Vision transforms for image preprocessing and augmentation.
//!
//! # Module Organization
//!
//! ```text
//! transforms/vision/
//! ├── io.rs            → Image loading (path → DynamicImage)
//! ├── conversion.rs    → Format conversions (RGB, float, channel-first tensor)
//! ├── border.rs        → Black border cropping
//! ├── geometric.rs     → Spatial transformations (resize, crop, flip, affine)
//! ├── distortion.rs    → Non-rigid warps (optical, grid, elastic)
//! ├── photometric.rs   → Color and appearance (brightness, HSV, CLAHE, normalize)
//! ├── augmentation.rs  → Noise, blur and cutout
//! └── pipeline.rs      → Probability-gated step lists (train / valid presets)
//! ```
//!
//! # Randomness
//!
//! Augmentations implement [`RandomTransform`] and draw every random number
//! from the `RngCore` they are handed. Through the blanket
//! [`Transform`] impl they can also be used directly, in which case they draw
//! from the calling thread's worker RNG (see
//! [`crate::dataloader::init_worker_rng`]).
//!
//! # Quick Start
//!
//! ```ignore
//! use crate::transforms::Transform;
//! use crate::transforms::vision::{EnsureRgb, LoadImage, Pipeline, ToChannelFirst};
//!
//! let pipeline = LoadImage::new()
//!     .then(EnsureRgb)
//!     .then(Pipeline::train(256)?)
//!     .then(ToChannelFirst);
//! let tensor = pipeline.apply(path)?; // [3, 256, 256]
//! ```

pub mod augmentation;
pub mod border;
pub mod conversion;
pub mod distortion;
pub mod geometric;
pub mod io;
pub mod photometric;
pub mod pipeline;

pub use augmentation::{Cutout, GaussNoise, GaussianBlur, MedianBlur, MotionBlur};
pub use border::CropBlackBorder;
pub use conversion::{EnsureRgb, ToChannelFirst, ToFloatImage};
pub use distortion::{ElasticTransform, GridDistortion, OpticalDistortion};
pub use geometric::{HorizontalFlip, RandomResizedCrop, Resize, ShiftScaleRotate};
pub use io::LoadImage;
pub use photometric::{Clahe, HueSaturationValue, Normalize, RandomBrightnessContrast};
pub use pipeline::{Pipeline, PipelineBuilder, Step, StepKind, TransformKind};

use crate::dataloader::with_worker_rng;
use crate::transforms::Transform;
use anyhow::Result;
use image::RgbImage;
use rand::{Rng, RngCore};

/// An image-to-image operation whose parameters are drawn at random on
/// every call.
///
/// Implementors must take all of their randomness from `rng` so that a
/// seeded source reproduces the output exactly.
pub trait RandomTransform: Send + Sync + std::fmt::Debug {
    fn apply_with_rng(&self, img: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage>;
}

impl<T: RandomTransform> Transform<RgbImage, RgbImage> for T {
    fn apply(&self, img: RgbImage) -> Result<RgbImage> {
        with_worker_rng(|rng| self.apply_with_rng(img, rng))
    }
}

/// Uniform sample from the closed range `[lo, hi]`; a collapsed range
/// returns `lo` without consuming randomness.
pub(crate) fn uniform(rng: &mut dyn RngCore, lo: f32, hi: f32) -> f32 {
    if lo >= hi {
        lo
    } else {
        rng.random_range(lo..=hi)
    }
}
