//! src/dataloader/config.rs
//!
//! Configuration for DataLoader behaviour
//!
//! Example:
//! ```ignore
//! let config = DataLoaderConfig::builder()
//!     .batch_size(32)
//!     .num_workers(4)
//!     .shuffle(true)
//!     .seed(42)
//!     .prefetch_factor(2)
//!     .drop_last(true)
//!     .build();
//! ```
//!
//! # Performance considerations:
//! - `num_workers`: image decoding and augmentation dominate, so workers
//!   scale almost linearly until the disk or the cores saturate
//! - `prefetch_factor`: batches in flight per worker; more hides decode
//!   latency spikes at the cost of memory

use anyhow::{ensure, Result};
use std::time::Duration;

/// Configuration for DataLoader
#[derive(Debug, Clone)]
pub struct DataLoaderConfig {
    /// Number of samples per batch
    pub batch_size: usize,
    /// Number of parallel workers (0 = load on the calling thread)
    pub num_workers: usize,
    /// Whether to drop the last incomplete batch
    pub drop_last: bool,
    /// Whether to reshuffle the sample order every epoch
    pub shuffle: bool,
    /// Random seed for reproducible shuffling and augmentation.
    /// Drawn at random once per loader when unset.
    pub seed: Option<u64>,
    /// Number of batches in flight per worker (must be >0 when using workers)
    pub prefetch_factor: usize,
    /// Maximum time to wait for a batch from the workers. Default: 60s
    pub timeout: Duration,
    /// How often idle workers check for the shutdown signal. Default: 100ms.
    pub worker_timeout: Duration,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            num_workers: 0,
            drop_last: false,
            shuffle: false,
            seed: None,
            prefetch_factor: 2,
            timeout: Duration::from_secs(60),
            worker_timeout: Duration::from_millis(100),
        }
    }
}

impl DataLoaderConfig {
    pub fn builder() -> DataLoaderConfigBuilder {
        DataLoaderConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size > 0, "batch_size must be greater than 0");
        ensure!(
            self.num_workers == 0 || self.prefetch_factor > 0,
            "prefetch_factor must be greater than 0 when using workers"
        );
        ensure!(!self.timeout.is_zero(), "timeout must be non-zero");
        Ok(())
    }
}

/// Builder for DataLoaderConfig with method chaining
#[derive(Default)]
pub struct DataLoaderConfigBuilder {
    config: DataLoaderConfig,
}

impl DataLoaderConfigBuilder {
    /// Set the batch size (must be > 0)
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the number of workers
    pub fn num_workers(mut self, workers: usize) -> Self {
        self.config.num_workers = workers;
        self
    }

    /// Set whether to drop_last
    pub fn drop_last(mut self, drop: bool) -> Self {
        self.config.drop_last = drop;
        self
    }

    /// Set whether to shuffle dataset every epoch
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.config.shuffle = shuffle;
        self
    }

    /// Set the random seed for reproducible data loading.
    ///
    /// When set, this seed controls:
    /// - Data shuffling (if shuffle = true)
    /// - Random augmentations in workers
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn prefetch_factor(mut self, factor: usize) -> Self {
        self.config.prefetch_factor = factor;
        self
    }

    /// Set the timeout for receiving a batch.
    ///
    /// - Too low: May fail batches during legitimate heavy processing
    /// - Too high: Delays detection of stuck workers.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn worker_timeout(mut self, worker_timeout: Duration) -> Self {
        self.config.worker_timeout = worker_timeout;
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> DataLoaderConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_validation() {
        let config = DataLoaderConfig::default();
        assert_eq!(config.batch_size, 1);
        assert!(config.validate().is_ok());

        assert!(DataLoaderConfig::builder().batch_size(0).build().validate().is_err());
        assert!(DataLoaderConfig::builder()
            .num_workers(2)
            .prefetch_factor(0)
            .build()
            .validate()
            .is_err());
        assert!(DataLoaderConfig::builder()
            .prefetch_factor(0)
            .build()
            .validate()
            .is_ok());
    }
}
