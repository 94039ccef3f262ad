pub mod collator;
pub mod config;
pub mod dataloader;
pub mod dataset;
pub mod error;
pub mod minibatch;
pub mod readers;
pub mod record_table;
pub mod sample;
pub mod transforms;

pub use collator::{Collator, StackCollator};
pub use config::{DatasetConfig, DEFAULT_TARGET_COLUMNS};
pub use dataloader::{DataLoader, DataLoaderConfig};
pub use dataset::{Dataset, ImageDataset, Mode, Preprocess};
pub use error::DatasetError;
pub use minibatch::MiniBatch;
pub use record_table::{Record, RecordTable};
pub use sample::Sample;
pub use transforms::vision::{Normalize, Pipeline, PipelineBuilder};
pub use transforms::Transform;
