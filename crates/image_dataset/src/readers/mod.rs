//! Readers for the tabular sources a [`RecordTable`](crate::RecordTable) is
//! built from.

pub mod jsonl;
pub mod parquet;

pub use jsonl::JsonlSource;
pub use parquet::ParquetSource;

use anyhow::Result;

/// A source that streams items of type `T` from storage.
///
/// Each item is a `Result` so a single malformed line or row group
/// surfaces at the position where it occurs.
pub trait DataSource<T>: Send + Sync {
    fn stream(&self) -> Result<Box<dyn Iterator<Item = Result<T>> + Send>>;
}
