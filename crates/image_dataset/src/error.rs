use std::path::PathBuf;
use thiserror::Error;

/// Failures a dataset access or table construction can report.
///
/// These travel inside `anyhow::Error`; callers that need to branch on the
/// kind recover them with `err.downcast_ref::<DatasetError>()`.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("failed to decode image at {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("row {row} has {found} label values but {expected} target columns are configured")]
    LabelLength {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("column '{column}' not found in {source_name}")]
    MissingColumn { column: String, source_name: String },

    #[error("column '{column}' at row {row} is not usable: {reason}")]
    InvalidColumn {
        column: String,
        row: usize,
        reason: String,
    },
}
