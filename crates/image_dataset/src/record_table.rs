//! The table of `(file_path, label)` rows a dataset indexes into.

use crate::error::DatasetError;
use crate::readers::{DataSource, JsonlSource, ParquetSource};
use anyhow::{Context, Result};
use arrow::array::{Array, Float32Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Column holding the image location in every source format.
pub const FILE_PATH_COLUMN: &str = "file_path";

/// One row: where the image lives and its target values, in the order of
/// the table's target columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub file_path: PathBuf,
    pub label: Vec<f32>,
}

impl Record {
    pub fn new(file_path: impl Into<PathBuf>, label: Vec<f32>) -> Self {
        Self {
            file_path: file_path.into(),
            label,
        }
    }
}

/// Immutable, zero-indexed rows sharing one set of target columns.
///
/// Cloning is cheap (two `Arc` bumps), so a table can be handed to several
/// datasets and worker threads.
#[derive(Debug, Clone)]
pub struct RecordTable {
    target_columns: Arc<[String]>,
    records: Arc<[Record]>,
}

impl RecordTable {
    /// Builds a table from in-memory rows.
    ///
    /// Fails with [`DatasetError::LabelLength`] if any row's label does not
    /// have one value per target column.
    pub fn new(target_columns: Vec<String>, records: Vec<Record>) -> Result<Self> {
        for (row, record) in records.iter().enumerate() {
            if record.label.len() != target_columns.len() {
                return Err(DatasetError::LabelLength {
                    row,
                    expected: target_columns.len(),
                    found: record.label.len(),
                }
                .into());
            }
        }
        Ok(Self {
            target_columns: target_columns.into(),
            records: records.into(),
        })
    }

    /// Reads a JSONL file with one object per row carrying `file_path` and
    /// every target column as a number.
    pub fn from_jsonl(path: impl AsRef<Path>, target_columns: &[String]) -> Result<Self> {
        let path = path.as_ref();
        let source_name = path.display().to_string();
        let mut records = Vec::new();

        for (row, value) in JsonlSource::new(path).stream_values()?.enumerate() {
            let value = value?;
            let file_path = match value.get(FILE_PATH_COLUMN) {
                Some(Value::String(p)) => PathBuf::from(p),
                Some(other) => {
                    return Err(invalid(FILE_PATH_COLUMN, row, format!("expected a string, got {}", other)))
                }
                None => return Err(missing(FILE_PATH_COLUMN, &source_name)),
            };
            let label = target_columns
                .iter()
                .map(|column| match value.get(column) {
                    Some(Value::Number(n)) => n
                        .as_f64()
                        .map(|v| v as f32)
                        .ok_or_else(|| invalid(column, row, format!("{} is not representable", n))),
                    Some(other) => Err(invalid(column, row, format!("expected a number, got {}", other))),
                    None => Err(missing(column, &source_name)),
                })
                .collect::<Result<Vec<f32>>>()?;
            records.push(Record { file_path, label });
        }

        log::info!("loaded {} rows from {}", records.len(), source_name);
        Self::new(target_columns.to_vec(), records)
    }

    /// Reads a Parquet file, projecting `file_path` and the target columns.
    /// Target columns of any integer or float type are cast to `f32`.
    pub fn from_parquet(path: impl AsRef<Path>, target_columns: &[String]) -> Result<Self> {
        let path = path.as_ref();
        let source_name = path.display().to_string();
        let projection: Vec<String> = std::iter::once(FILE_PATH_COLUMN.to_string())
            .chain(target_columns.iter().cloned())
            .collect();

        let mut records = Vec::new();
        for batch in ParquetSource::new(path, 4096, Some(projection)).stream()? {
            let batch = batch.with_context(|| format!("Failed to read row group of {}", source_name))?;
            records.extend(records_from_batch(&batch, target_columns, &source_name, records.len())?);
        }

        log::info!("loaded {} rows from {}", records.len(), source_name);
        Self::new(target_columns.to_vec(), records)
    }

    /// Returns a new table holding the given rows in the given order,
    /// re-indexed from zero.
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        let records = indices
            .iter()
            .map(|&index| self.get(index).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            target_columns: Arc::clone(&self.target_columns),
            records: records.into(),
        })
    }

    /// Prefixes every relative `file_path` with `root`.
    pub fn with_root(&self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let records: Vec<Record> = self
            .records
            .iter()
            .map(|r| Record {
                file_path: if r.file_path.is_relative() {
                    root.join(&r.file_path)
                } else {
                    r.file_path.clone()
                },
                label: r.label.clone(),
            })
            .collect();
        Self {
            target_columns: Arc::clone(&self.target_columns),
            records: records.into(),
        }
    }

    pub fn get(&self, index: usize) -> Result<&Record> {
        self.records.get(index).ok_or_else(|| {
            DatasetError::IndexOutOfRange {
                index,
                len: self.records.len(),
            }
            .into()
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn target_columns(&self) -> &[String] {
        &self.target_columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

fn missing(column: &str, source_name: &str) -> anyhow::Error {
    DatasetError::MissingColumn {
        column: column.to_string(),
        source_name: source_name.to_string(),
    }
    .into()
}

fn invalid(column: &str, row: usize, reason: String) -> anyhow::Error {
    DatasetError::InvalidColumn {
        column: column.to_string(),
        row,
        reason,
    }
    .into()
}

/// Converts one record batch; `row_offset` is the number of rows read before it.
fn records_from_batch(
    batch: &RecordBatch,
    target_columns: &[String],
    source_name: &str,
    row_offset: usize,
) -> Result<Vec<Record>> {
    let paths = batch
        .column_by_name(FILE_PATH_COLUMN)
        .ok_or_else(|| missing(FILE_PATH_COLUMN, source_name))?;
    let paths = cast(paths, &DataType::Utf8)
        .with_context(|| format!("Column '{}' cannot be read as text", FILE_PATH_COLUMN))?;
    let paths = paths
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| invalid(FILE_PATH_COLUMN, row_offset, "not a string column".to_string()))?;

    let mut labels: Vec<Float32Array> = Vec::with_capacity(target_columns.len());
    for column in target_columns {
        let array = batch
            .column_by_name(column)
            .ok_or_else(|| missing(column, source_name))?;
        ensure_numeric(column, array.data_type(), row_offset)?;
        let array = cast(array, &DataType::Float32)
            .with_context(|| format!("Column '{}' cannot be cast to f32", column))?;
        let array = array
            .as_any()
            .downcast_ref::<Float32Array>()
            .cloned()
            .ok_or_else(|| invalid(column, row_offset, "cast did not yield f32".to_string()))?;
        labels.push(array);
    }

    (0..batch.num_rows())
        .map(|i| {
            let row = row_offset + i;
            if paths.is_null(i) {
                return Err(invalid(FILE_PATH_COLUMN, row, "null path".to_string()));
            }
            let label = labels
                .iter()
                .zip(target_columns)
                .map(|(array, column)| {
                    if array.is_null(i) {
                        Err(invalid(column, row, "null value".to_string()))
                    } else {
                        Ok(array.value(i))
                    }
                })
                .collect::<Result<Vec<f32>>>()?;
            Ok(Record::new(paths.value(i), label))
        })
        .collect()
}

fn ensure_numeric(column: &str, data_type: &DataType, row: usize) -> Result<()> {
    if data_type.is_numeric() || matches!(data_type, DataType::Boolean) {
        Ok(())
    } else {
        Err(invalid(column, row, format!("expected a numeric column, got {}", data_type)))
    }
}
