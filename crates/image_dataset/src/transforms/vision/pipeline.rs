//! Probability-gated augmentation pipelines.
//!
//! A [`Pipeline`] is an ordered list of [`Step`]s followed by an optional
//! [`Normalize`]. Each step is either a single [`TransformKind`] or a "one of"
//! group, and is applied with its own probability. Every random draw of a
//! call, including the gate decisions, comes from one `RngCore`, so a seeded
//! source reproduces a pipeline run exactly.
//!
//! # Example
//! ```ignore
//! let train = Pipeline::train(256)?;
//! let valid = Pipeline::valid(256)?;
//! log::info!("train pipeline: {}", train.describe());
//!
//! let augmented: Rgb32FImage = train.apply(rgb)?; // 256 x 256, normalized
//! ```

use super::conversion::to_float_image;
use super::{
    Clahe, Cutout, ElasticTransform, GaussNoise, GaussianBlur, GridDistortion, HorizontalFlip,
    HueSaturationValue, MedianBlur, MotionBlur, Normalize, OpticalDistortion, RandomBrightnessContrast,
    RandomResizedCrop, RandomTransform, Resize, ShiftScaleRotate,
};
use crate::dataloader::with_worker_rng;
use crate::transforms::Transform;
use anyhow::{ensure, Result};
use image::{Rgb32FImage, RgbImage};
use rand::{Rng, RngCore};

// ============================================================================
// TransformKind
// ============================================================================

macro_rules! transform_kinds {
    ($($variant:ident($ty:ty)),+ $(,)?) => {
        /// Every image operation a pipeline step can hold, with its parameters.
        #[derive(Debug, Clone)]
        pub enum TransformKind {
            $($variant($ty),)+
        }

        impl TransformKind {
            pub fn name(&self) -> &'static str {
                match self {
                    $(TransformKind::$variant(_) => stringify!($variant),)+
                }
            }
        }

        impl RandomTransform for TransformKind {
            fn apply_with_rng(&self, img: RgbImage, rng: &mut dyn RngCore) -> Result<RgbImage> {
                match self {
                    $(TransformKind::$variant(op) => op.apply_with_rng(img, rng),)+
                }
            }
        }

        $(
            impl From<$ty> for TransformKind {
                fn from(op: $ty) -> Self {
                    TransformKind::$variant(op)
                }
            }
        )+
    };
}

transform_kinds! {
    RandomResizedCrop(RandomResizedCrop),
    HorizontalFlip(HorizontalFlip),
    RandomBrightnessContrast(RandomBrightnessContrast),
    GaussNoise(GaussNoise),
    MotionBlur(MotionBlur),
    MedianBlur(MedianBlur),
    GaussianBlur(GaussianBlur),
    OpticalDistortion(OpticalDistortion),
    GridDistortion(GridDistortion),
    ElasticTransform(ElasticTransform),
    Clahe(Clahe),
    HueSaturationValue(HueSaturationValue),
    ShiftScaleRotate(ShiftScaleRotate),
    Resize(Resize),
    Cutout(Cutout),
}

// ============================================================================
// Step
// ============================================================================

#[derive(Debug, Clone)]
pub enum StepKind {
    Single(TransformKind),
    /// Picks one alternative uniformly at random each time the step fires.
    OneOf(Vec<TransformKind>),
}

/// One pipeline stage and the probability that it runs on a given call.
#[derive(Debug, Clone)]
pub struct Step {
    kind: StepKind,
    p: f64,
}

impl Step {
    pub fn new(op: impl Into<TransformKind>, p: f64) -> Result<Self> {
        validate_probability(p)?;
        Ok(Self {
            kind: StepKind::Single(op.into()),
            p,
        })
    }

    /// A step that runs on every call.
    pub fn always(op: impl Into<TransformKind>) -> Self {
        Self {
            kind: StepKind::Single(op.into()),
            p: 1.0,
        }
    }

    pub fn one_of(choices: Vec<TransformKind>, p: f64) -> Result<Self> {
        validate_probability(p)?;
        ensure!(!choices.is_empty(), "OneOf step needs at least one alternative");
        Ok(Self {
            kind: StepKind::OneOf(choices),
            p,
        })
    }

    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    pub fn probability(&self) -> f64 {
        self.p
    }

    /// Runs the step if its gate fires; returns the name of what ran.
    fn apply_with_rng(
        &self,
        img: RgbImage,
        rng: &mut dyn RngCore,
    ) -> Result<(RgbImage, Option<&'static str>)> {
        let fires = self.p >= 1.0 || (self.p > 0.0 && rng.random_bool(self.p));
        if !fires {
            return Ok((img, None));
        }
        let op = match &self.kind {
            StepKind::Single(op) => op,
            StepKind::OneOf(choices) => &choices[rng.random_range(0..choices.len())],
        };
        Ok((op.apply_with_rng(img, rng)?, Some(op.name())))
    }

    fn describe(&self) -> String {
        let body = match &self.kind {
            StepKind::Single(op) => op.name().to_string(),
            StepKind::OneOf(choices) => format!(
                "OneOf[{}]",
                choices.iter().map(|c| c.name()).collect::<Vec<_>>().join("|")
            ),
        };
        format!("{}(p={})", body, self.p)
    }
}

fn validate_probability(p: f64) -> Result<()> {
    ensure!(
        (0.0..=1.0).contains(&p),
        "Step probability must be within [0, 1] (got {})",
        p
    );
    Ok(())
}

// ============================================================================
// Pipeline
// ============================================================================

/// Ordered augmentation steps ending in an optional normalization.
///
/// Without normalization the output holds raw `0..=255` values as `f32`.
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<Step>,
    normalize: Option<Normalize>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Training preset for an `size × size` output with ImageNet statistics.
    pub fn train(size: u32) -> Result<Self> {
        Self::train_with(size, Normalize::imagenet())
    }

    /// Training preset with custom normalization statistics.
    ///
    /// Crop, flip, photometric jitter, one of noise/blur, one of the
    /// non-rigid warps, CLAHE, HSV shift, shift-scale-rotate, a final resize
    /// and cutout with three holes a tenth of the side long.
    pub fn train_with(size: u32, normalize: Normalize) -> Result<Self> {
        let hole = size / 10;
        Ok(Self::builder()
            .step(Step::always(RandomResizedCrop::new(size, size, (0.8, 1.2))?))
            .step(Step::new(HorizontalFlip, 0.5)?)
            .step(Step::new(
                RandomBrightnessContrast::new((-0.2, 0.2), (-0.2, 0.2))?,
                0.5,
            )?)
            .step(Step::one_of(
                vec![
                    GaussNoise::new((5.0, 30.0))?.into(),
                    MotionBlur::new(5)?.into(),
                    MedianBlur::new(5)?.into(),
                    GaussianBlur::new(5)?.into(),
                ],
                0.25,
            )?)
            .step(Step::one_of(
                vec![
                    OpticalDistortion::new(1.0, 0.05)?.into(),
                    GridDistortion::new(5, 1.0)?.into(),
                    ElasticTransform::new(3.0, 50.0, 50.0)?.into(),
                ],
                0.25,
            )?)
            .step(Step::new(Clahe::new((1.0, 4.0))?, 0.25)?)
            .step(Step::new(HueSaturationValue::new(10.0, 15.0, 10.0)?, 0.25)?)
            .step(Step::new(ShiftScaleRotate::new(0.1, 0.1, 45.0)?, 0.25)?)
            .step(Step::always(Resize::new(size, size)?))
            .step(Step::new(Cutout::new(3, hole, hole)?, 0.35)?)
            .normalize(normalize)
            .build())
    }

    /// Validation / test preset: resize then normalize with ImageNet statistics.
    pub fn valid(size: u32) -> Result<Self> {
        Self::valid_with(size, Normalize::imagenet())
    }

    pub fn valid_with(size: u32, normalize: Normalize) -> Result<Self> {
        Ok(Self::builder()
            .step(Step::always(Resize::new(size, size)?))
            .normalize(normalize)
            .build())
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn normalization(&self) -> Option<&Normalize> {
        self.normalize.as_ref()
    }

    /// One-line summary, e.g. `Resize(p=1) -> Normalize`.
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = self.steps.iter().map(Step::describe).collect();
        if self.normalize.is_some() {
            parts.push("Normalize".to_string());
        }
        parts.join(" -> ")
    }

    /// Runs the pipeline drawing every random number from `rng`.
    pub fn apply_with_rng(&self, img: RgbImage, rng: &mut dyn RngCore) -> Result<Rgb32FImage> {
        let mut img = img;
        let mut applied = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let (out, name) = step.apply_with_rng(img, rng)?;
            img = out;
            applied.extend(name);
        }
        log::debug!("applied {:?} -> {}x{}", applied, img.width(), img.height());

        match &self.normalize {
            Some(normalize) => normalize.apply(img),
            None => Ok(to_float_image(&img)),
        }
    }
}

impl Transform<RgbImage, Rgb32FImage> for Pipeline {
    fn apply(&self, img: RgbImage) -> Result<Rgb32FImage> {
        with_worker_rng(|rng| self.apply_with_rng(img, rng))
    }
}

/// Builder for custom pipelines.
///
/// ```ignore
/// let pipeline = Pipeline::builder()
///     .step(Step::always(Resize::new(128, 128)?))
///     .step(Step::new(HorizontalFlip, 0.5)?)
///     .normalize(Normalize::new(&[0.5; 3], &[0.5; 3])?)
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    steps: Vec<Step>,
    normalize: Option<Normalize>,
}

impl PipelineBuilder {
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn normalize(mut self, normalize: Normalize) -> Self {
        self.normalize = Some(normalize);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            steps: self.steps,
            normalize: self.normalize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn test_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_valid_pipeline_output_size() -> Result<()> {
        let pipeline = Pipeline::valid(64)?;
        let mut rng = StdRng::seed_from_u64(0);
        for (w, h) in [(200, 120), (20, 33), (64, 64)] {
            let out = pipeline.apply_with_rng(test_image(w, h), &mut rng)?;
            assert_eq!(out.dimensions(), (64, 64));
        }
        Ok(())
    }

    #[test]
    fn test_valid_pipeline_is_deterministic() -> Result<()> {
        let pipeline = Pipeline::valid(16)?;
        let a = pipeline.apply_with_rng(test_image(40, 30), &mut StdRng::seed_from_u64(1))?;
        let b = pipeline.apply_with_rng(test_image(40, 30), &mut StdRng::seed_from_u64(2))?;
        assert_eq!(a, b);

        let white = pipeline.apply_with_rng(
            RgbImage::from_pixel(8, 8, Rgb([255, 255, 255])),
            &mut StdRng::seed_from_u64(3),
        )?;
        let p = white.get_pixel(5, 5);
        assert!((p[0] - (1.0 - 0.485) / 0.229).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_train_pipeline_output_size() -> Result<()> {
        let pipeline = Pipeline::train(48)?;
        let mut rng = StdRng::seed_from_u64(42);
        for (w, h) in [(120, 80), (30, 60), (48, 48), (500, 41)] {
            for _ in 0..4 {
                let out = pipeline.apply_with_rng(test_image(w, h), &mut rng)?;
                assert_eq!(out.dimensions(), (48, 48));
            }
        }
        Ok(())
    }

    #[test]
    fn test_train_pipeline_reproducible_with_seed() -> Result<()> {
        let pipeline = Pipeline::train(32)?;
        let a = pipeline.apply_with_rng(test_image(70, 50), &mut StdRng::seed_from_u64(9))?;
        let b = pipeline.apply_with_rng(test_image(70, 50), &mut StdRng::seed_from_u64(9))?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_every_kind_fires_at_full_probability() -> Result<()> {
        let pipeline = Pipeline::train(24)?;
        let mut rng = StdRng::seed_from_u64(5);
        for step in pipeline.steps() {
            let choices = match step.kind() {
                StepKind::Single(op) => vec![op.clone()],
                StepKind::OneOf(choices) => choices.clone(),
            };
            for op in choices {
                let forced = Step::always(op);
                let (out, name) = forced.apply_with_rng(test_image(24, 24), &mut rng)?;
                assert!(name.is_some());
                assert_eq!(out.dimensions(), (24, 24));
            }
        }
        Ok(())
    }

    #[test]
    fn test_zero_probability_step_never_runs() -> Result<()> {
        let step = Step::new(HorizontalFlip, 0.0)?;
        let img = test_image(5, 2);
        let (out, name) = step.apply_with_rng(img.clone(), &mut StdRng::seed_from_u64(0))?;
        assert_eq!(out, img);
        assert!(name.is_none());
        Ok(())
    }

    #[test]
    fn test_gate_fires_at_its_probability() -> Result<()> {
        let step = Step::new(HorizontalFlip, 0.25)?;
        let mut rng = StdRng::seed_from_u64(17);
        let trials = 4000;
        let mut fired = 0;
        for _ in 0..trials {
            let (_, name) = step.apply_with_rng(test_image(4, 4), &mut rng)?;
            fired += name.is_some() as usize;
        }
        let rate = fired as f64 / trials as f64;
        assert!((rate - 0.25).abs() < 0.03, "fired at rate {}", rate);
        Ok(())
    }

    #[test]
    fn test_one_of_picks_uniformly() -> Result<()> {
        // Noise/blur group of the training preset
        let pipeline = Pipeline::train(8)?;
        let group = &pipeline.steps()[3];
        let StepKind::OneOf(choices) = group.kind() else {
            panic!("expected a OneOf step, got {:?}", group.kind());
        };
        assert_eq!(choices.len(), 4);

        let mut rng = StdRng::seed_from_u64(23);
        let trials = 4000;
        let mut counts: HashMap<&'static str, usize> = HashMap::new();
        for _ in 0..trials {
            let (_, name) = group.apply_with_rng(test_image(8, 8), &mut rng)?;
            if let Some(name) = name {
                *counts.entry(name).or_default() += 1;
            }
        }
        let fired: usize = counts.values().sum();
        let rate = fired as f64 / trials as f64;
        assert!((rate - 0.25).abs() < 0.03, "group fired at rate {}", rate);
        for choice in choices {
            let share = counts.get(choice.name()).copied().unwrap_or(0) as f64 / fired as f64;
            assert!((share - 0.25).abs() < 0.06, "{} chosen with share {}", choice.name(), share);
        }
        Ok(())
    }

    #[test]
    fn test_step_validation() -> Result<()> {
        assert!(Step::new(HorizontalFlip, 1.5).is_err());
        assert!(Step::new(HorizontalFlip, -0.1).is_err());
        assert!(Step::one_of(vec![], 0.5).is_err());
        Ok(())
    }

    #[test]
    fn test_pipeline_without_normalize_keeps_raw_values() -> Result<()> {
        let pipeline = Pipeline::builder()
            .step(Step::always(Resize::new(4, 4)?))
            .build();
        let out = pipeline.apply_with_rng(
            RgbImage::from_pixel(4, 4, Rgb([255, 10, 0])),
            &mut StdRng::seed_from_u64(0),
        )?;
        assert_eq!(out.get_pixel(0, 0).0, [255.0, 10.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_describe() -> Result<()> {
        assert_eq!(Pipeline::valid(8)?.describe(), "Resize(p=1) -> Normalize");
        let train = Pipeline::train(8)?.describe();
        assert!(train.starts_with("RandomResizedCrop(p=1) -> HorizontalFlip(p=0.5)"));
        assert!(train.contains("OneOf[OpticalDistortion|GridDistortion|ElasticTransform](p=0.25)"));
        assert!(train.contains("Cutout(p=0.35)"));
        Ok(())
    }
}
