//! src/config.rs
//!
//! Dataset-level configuration: output size, target columns and the
//! normalization statistics the pipelines end with.
//!
//! Example:
//! ```ignore
//! let config = DatasetConfig::builder()
//!     .image_size(512)
//!     .target_columns(["ETT - Abnormal", "ETT - Borderline"])
//!     .build()?;
//!
//! // or from disk
//! let config = DatasetConfig::from_json_file("dataset.json")?;
//! let train = config.train_pipeline()?;
//! let loader_config = config.loader_builder().batch_size(16).shuffle(true).build();
//! ```

use crate::dataloader::{DataLoaderConfig, DataLoaderConfigBuilder};
use crate::transforms::vision::{Normalize, Pipeline};
use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The eleven catheter/tube position targets of the reference dataset.
pub const DEFAULT_TARGET_COLUMNS: [&str; 11] = [
    "ETT - Abnormal",
    "ETT - Borderline",
    "ETT - Normal",
    "NGT - Abnormal",
    "NGT - Borderline",
    "NGT - Incompletely Imaged",
    "NGT - Normal",
    "CVC - Abnormal",
    "CVC - Borderline",
    "CVC - Normal",
    "Swan Ganz Catheter Present",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Side length `S` of the square images the pipelines produce.
    pub image_size: u32,
    /// Ordered target columns; label vectors follow this order.
    pub target_columns: Vec<String>,
    /// Per-channel normalization mean on the `[0, 1]` scale.
    pub mean: [f32; 3],
    /// Per-channel normalization std on the `[0, 1]` scale.
    pub std: [f32; 3],
    /// Base seed for shuffling and worker augmentation RNGs.
    pub seed: Option<u64>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            image_size: 512,
            target_columns: DEFAULT_TARGET_COLUMNS.iter().map(|c| c.to_string()).collect(),
            mean: Normalize::IMAGENET_MEAN,
            std: Normalize::IMAGENET_STD,
            seed: None,
        }
    }
}

impl DatasetConfig {
    pub fn builder() -> DatasetConfigBuilder {
        DatasetConfigBuilder::default()
    }

    /// Loads and validates a JSON config; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Invalid dataset config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.image_size > 0, "image_size must be positive");
        ensure!(
            !self.target_columns.is_empty(),
            "At least one target column is required"
        );
        let mut seen = std::collections::HashSet::new();
        for column in &self.target_columns {
            ensure!(seen.insert(column), "Duplicate target column '{}'", column);
        }
        ensure!(
            self.std.iter().all(|s| *s > 0.0),
            "Normalization std must be positive (got {:?})",
            self.std
        );
        Ok(())
    }

    pub fn normalize(&self) -> Result<Normalize> {
        Normalize::new(&self.mean, &self.std)
    }

    pub fn train_pipeline(&self) -> Result<Pipeline> {
        Pipeline::train_with(self.image_size, self.normalize()?)
    }

    pub fn valid_pipeline(&self) -> Result<Pipeline> {
        Pipeline::valid_with(self.image_size, self.normalize()?)
    }

    /// DataLoader builder preset with this config's seed, if one is set.
    pub fn loader_builder(&self) -> DataLoaderConfigBuilder {
        let builder = DataLoaderConfig::builder();
        match self.seed {
            Some(seed) => builder.seed(seed),
            None => builder,
        }
    }
}

/// Builder for DatasetConfig with method chaining
#[derive(Default)]
pub struct DatasetConfigBuilder {
    config: DatasetConfig,
}

impl DatasetConfigBuilder {
    pub fn image_size(mut self, size: u32) -> Self {
        self.config.image_size = size;
        self
    }

    pub fn target_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.target_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn mean(mut self, mean: [f32; 3]) -> Self {
        self.config.mean = mean;
        self
    }

    pub fn std(mut self, std: [f32; 3]) -> Self {
        self.config.std = std;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Build and validate the final configuration.
    pub fn build(self) -> Result<DatasetConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() -> Result<()> {
        let config = DatasetConfig::builder().build()?;
        assert_eq!(config.target_columns.len(), 11);
        assert_eq!(config.normalize()?, Normalize::imagenet());
        assert_eq!(config.loader_builder().build().seed, None);
        Ok(())
    }

    #[test]
    fn test_builder_validation() {
        assert!(DatasetConfig::builder().image_size(0).build().is_err());
        assert!(DatasetConfig::builder()
            .target_columns(Vec::<String>::new())
            .build()
            .is_err());
        assert!(DatasetConfig::builder()
            .target_columns(["a", "a"])
            .build()
            .is_err());
        assert!(DatasetConfig::builder().std([0.2, 0.0, 0.2]).build().is_err());
    }

    #[test]
    fn test_from_json_file_fills_defaults() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(file, r#"{{"image_size": 64, "target_columns": ["a", "b"], "seed": 7}}"#)?;
        let config = DatasetConfig::from_json_file(file.path())?;
        assert_eq!(config.image_size, 64);
        assert_eq!(config.target_columns, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.mean, Normalize::IMAGENET_MEAN);
        assert_eq!(config.valid_pipeline()?.describe(), "Resize(p=1) -> Normalize");
        assert_eq!(config.loader_builder().build().seed, Some(7));
        Ok(())
    }

    #[test]
    fn test_json_round_trip() -> Result<()> {
        let config = DatasetConfig::builder().image_size(128).seed(3).build()?;
        let text = serde_json::to_string(&config)?;
        let back: DatasetConfig = serde_json::from_str(&text)?;
        assert_eq!(back, config);
        Ok(())
    }
}
