use crate::record_table::RecordTable;
use crate::sample::{Sample, IMAGE, LABEL};
use crate::transforms::vision::conversion::to_float_image;
use crate::transforms::vision::{CropBlackBorder, EnsureRgb, LoadImage, ToChannelFirst};
use crate::transforms::Transform;
use anyhow::{bail, Context, Result};
use image::{Rgb32FImage, RgbImage};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tch::Tensor;

/// Random-access collection of samples.
///
/// Implementations must be `Send + Sync`: loader workers call `get`
/// concurrently from several threads.
pub trait Dataset: Send + Sync {
    /// Builds the sample at `index`, failing for `index >= len()`.
    fn get(&self, index: usize) -> Result<Sample>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which split a dataset serves. `Test` samples carry no label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Train,
    Valid,
    Test,
}

impl Mode {
    pub fn has_labels(self) -> bool {
        !matches!(self, Mode::Test)
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "train" => Ok(Mode::Train),
            "valid" | "val" | "validation" => Ok(Mode::Valid),
            "test" => Ok(Mode::Test),
            other => bail!("Unknown dataset mode '{}'", other),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Train => "train",
            Mode::Valid => "valid",
            Mode::Test => "test",
        })
    }
}

/// Work done on the decoded frame before augmentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Preprocess {
    #[default]
    None,
    /// Trim all-black margins (see [`CropBlackBorder`]).
    CropBlackBorder,
}

/// Shared image transform: RGB frame in, float `H × W × 3` image out.
pub type ImageTransform = Arc<dyn Transform<RgbImage, Rgb32FImage>>;

/// Loads, augments and tensorizes the images listed in a [`RecordTable`].
///
/// Each `get` re-reads and re-decodes its file, converts it to RGB, applies
/// the optional preprocessing and transform, and returns a [`Sample`] with
/// `"image"` as a `[3, H, W]` f32 tensor plus `"label"` as a
/// `[n_targets]` f32 tensor outside of test mode.
///
/// # Example
/// ```ignore
/// let table = RecordTable::from_parquet("train.parquet", &config.target_columns)?;
/// let train = ImageDataset::new(table, Mode::Train, Some(Arc::new(config.train_pipeline()?)));
/// let sample = train.get(0)?; // image [3, S, S], label [11]
/// ```
#[derive(Clone)]
pub struct ImageDataset {
    table: RecordTable,
    mode: Mode,
    transform: Option<ImageTransform>,
    preprocess: Preprocess,
    loader: LoadImage,
}

impl ImageDataset {
    /// Without a transform the image tensor holds raw `0..=255` values.
    pub fn new(table: RecordTable, mode: Mode, transform: Option<ImageTransform>) -> Self {
        Self {
            table,
            mode,
            transform,
            preprocess: Preprocess::None,
            loader: LoadImage::new(),
        }
    }

    /// Same as [`new`](Self::new), but black margins are cropped right after decoding.
    pub fn border_cropped(table: RecordTable, mode: Mode, transform: Option<ImageTransform>) -> Self {
        Self::new(table, mode, transform).with_preprocess(Preprocess::CropBlackBorder)
    }

    pub fn with_transform<T>(mut self, transform: T) -> Self
    where
        T: Transform<RgbImage, Rgb32FImage> + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn with_preprocess(mut self, preprocess: Preprocess) -> Self {
        self.preprocess = preprocess;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn preprocess(&self) -> Preprocess {
        self.preprocess
    }

    pub fn table(&self) -> &RecordTable {
        &self.table
    }

    fn load_rgb(&self, index: usize) -> Result<RgbImage> {
        let record = self.table.get(index)?;
        let decoded = self.loader.apply(record.file_path.clone())?;
        let rgb = EnsureRgb.apply(decoded)?;
        match self.preprocess {
            Preprocess::None => Ok(rgb),
            Preprocess::CropBlackBorder => CropBlackBorder.apply(rgb),
        }
    }
}

impl Dataset for ImageDataset {
    fn get(&self, index: usize) -> Result<Sample> {
        let rgb = self.load_rgb(index)?;
        let (width, height) = rgb.dimensions();

        let image = match &self.transform {
            Some(transform) => transform
                .apply(rgb)
                .with_context(|| format!("Failed to transform sample {}", index))?,
            None => to_float_image(&rgb),
        };
        let tensor = ToChannelFirst.apply(image)?;
        log::debug!(
            "sample {} ({}): {}x{} -> {:?}",
            index,
            self.mode,
            width,
            height,
            tensor.size()
        );

        let sample = Sample::from_single(IMAGE, tensor);
        if !self.mode.has_labels() {
            return Ok(sample);
        }
        let record = self.table.get(index)?;
        Ok(sample.with_feature(LABEL, Tensor::from_slice(&record.label)))
    }

    fn len(&self) -> usize {
        self.table.len()
    }
}

impl fmt::Debug for ImageDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageDataset")
            .field("len", &self.table.len())
            .field("mode", &self.mode)
            .field("preprocess", &self.preprocess)
            .field("has_transform", &self.transform.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DatasetError;
    use crate::record_table::Record;
    use image::Rgb;
    use tempfile::TempDir;

    fn table_with_image(dir: &TempDir, img: &RgbImage) -> Result<RecordTable> {
        let path = dir.path().join("img.png");
        img.save(&path)?;
        RecordTable::new(
            vec!["a".into(), "b".into()],
            vec![Record::new(path, vec![1.0, 0.0])],
        )
    }

    #[test]
    fn test_mode_parsing() -> Result<()> {
        assert_eq!("TRAIN".parse::<Mode>()?, Mode::Train);
        assert_eq!("val".parse::<Mode>()?, Mode::Valid);
        assert_eq!(Mode::Test.to_string(), "test");
        assert!("holdout".parse::<Mode>().is_err());
        Ok(())
    }

    #[test]
    fn test_raw_sample_without_transform() -> Result<()> {
        let dir = TempDir::new()?;
        let table = table_with_image(&dir, &RgbImage::from_pixel(5, 3, Rgb([200, 100, 0])))?;
        let dataset = ImageDataset::new(table, Mode::Valid, None);

        let sample = dataset.get(0)?;
        let image = sample.image()?;
        assert_eq!(image.size(), vec![3, 3, 5]);
        assert_eq!(image.double_value(&[0, 2, 4]), 200.0);
        assert_eq!(image.double_value(&[1, 0, 0]), 100.0);
        assert_eq!(sample.label().map(|l| l.size()), Some(vec![2]));
        Ok(())
    }

    #[test]
    fn test_out_of_range_index() -> Result<()> {
        let dir = TempDir::new()?;
        let table = table_with_image(&dir, &RgbImage::new(2, 2))?;
        let dataset = ImageDataset::new(table, Mode::Train, None);
        let err = dataset.get(1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DatasetError>(),
            Some(DatasetError::IndexOutOfRange { index: 1, len: 1 })
        ));
        Ok(())
    }

    #[test]
    fn test_border_cropped_variant() -> Result<()> {
        let dir = TempDir::new()?;
        let img = RgbImage::from_fn(8, 6, |x, y| {
            if (2..6).contains(&x) && (1..4).contains(&y) {
                Rgb([50, 60, 70])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let table = table_with_image(&dir, &img)?;
        let dataset = ImageDataset::border_cropped(table, Mode::Test, None);
        let sample = dataset.get(0)?;
        assert_eq!(sample.image()?.size(), vec![3, 3, 4]);
        assert!(sample.label().is_none());
        Ok(())
    }
}
