use super::DataSource;
use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use parquet::arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ProjectionMask};
use std::path::PathBuf;

/// Parquet file reader for Arrow RecordBatches.
///
/// # Example
/// ```ignore
/// // Read 1024-row batches holding only the path and two target columns
/// let source = ParquetSource::new(
///     "train.parquet",
///     1024,
///     Some(vec!["file_path".into(), "ETT - Abnormal".into(), "NGT - Normal".into()]),
/// );
///
/// for batch_res in source.stream()? {
///     let batch: RecordBatch = batch_res?;
/// }
/// ```
pub struct ParquetSource {
    path: PathBuf,
    batch_size: usize,
    projection: Vec<String>,
}

impl ParquetSource {
    /// Creates a new Parquet reader.
    ///
    /// # Arguments
    /// - `path`: Path to Parquet file
    /// - `batch_size`: Rows per RecordBatch
    /// - `projection`: Optional column names to read (empty = all columns)
    pub fn new(
        path: impl Into<PathBuf>,
        batch_size: usize,
        projection: Option<Vec<String>>,
    ) -> Self {
        Self {
            path: path.into(),
            batch_size,
            projection: projection.unwrap_or_default(),
        }
    }
}
impl DataSource<RecordBatch> for ParquetSource {
    /// Stream RecordBatches from the Parquet file.
    ///
    /// # Errors
    /// 1. Yields per-batch errors for corrupt row groups.
    /// 2. Fails immediately if:
    /// - File does not exist or is not a valid Parquet
    fn stream(&self) -> Result<Box<dyn Iterator<Item = Result<RecordBatch>> + Send>> {
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Failed to open Parquet file: {}", self.path.display()))?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("Not a valid Parquet file: {}", self.path.display()))?;

        // Set batch size
        let builder = builder.with_batch_size(self.batch_size);

        // Apply column projection if specified (for reading only selected columns)
        let builder = if !self.projection.is_empty() {
            let field_indices: Vec<usize> = builder
                .schema()
                .fields()
                .iter()
                .enumerate()
                // Keep only fields that match our projection list
                .filter(|(_, field_def)| self.projection.contains(&field_def.name().to_string()))
                // Extract the field indices (Parquet needs numeric indices)
                .map(|(field_index, _)| field_index)
                .collect();

            // Verify the projection was valid before creating mask
            if field_indices.is_empty() {
                let valid_columns: Vec<_> = builder
                    .schema()
                    .fields()
                    .iter()
                    .map(|f| f.name().to_string())
                    .collect();
                return Err(anyhow::anyhow!(
                    "Invalid projection columns. Available: {:?}, Requested: {:?}",
                    valid_columns,
                    self.projection
                ));
            }

            // Create and apply projection mask
            let projection_mask = ProjectionMask::roots(builder.parquet_schema(), field_indices);
            builder.with_projection(projection_mask)
        } else {
            builder
        };
        Ok(Box::new(
            builder.build()?.into_iter().map(|batch| Ok(batch?)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::{
        array::{ArrayRef, Float64Array, StringArray},
        datatypes::{DataType, Field, Schema},
    };
    use parquet::arrow::arrow_writer::ArrowWriter;
    use std::{fs::File, sync::Arc};
    use tempfile::NamedTempFile;

    fn write_table() -> Result<NamedTempFile> {
        let schema = Arc::new(Schema::new(vec![
            Field::new("file_path", DataType::Utf8, false),
            Field::new("score", DataType::Float64, false),
            Field::new("notes", DataType::Utf8, true),
        ]));
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec!["a.png", "b.png", "c.png"])),
            Arc::new(Float64Array::from(vec![0.5, 1.0, 0.0])),
            Arc::new(StringArray::from(vec![Some("x"), None, None])),
        ];
        let batch = RecordBatch::try_new(schema.clone(), columns)?;

        let tmp = NamedTempFile::new()?;
        let mut writer = ArrowWriter::try_new(File::create(tmp.path())?, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(tmp)
    }

    #[test]
    fn test_parquet_file_streaming() -> Result<()> {
        let tmp = write_table()?;
        let src = ParquetSource::new(tmp.path(), 2, None);
        let batches: Vec<RecordBatch> = src.stream()?.collect::<Result<_>>()?;
        assert_eq!(batches.len(), 2);
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 3);
        Ok(())
    }

    #[test]
    fn test_parquet_projection() -> Result<()> {
        let tmp = write_table()?;
        let src = ParquetSource::new(
            tmp.path(),
            16,
            Some(vec!["file_path".into(), "score".into()]),
        );
        let batch = src.stream()?.next().transpose()?;
        let names: Vec<String> = batch
            .map(|b| b.schema().fields().iter().map(|f| f.name().clone()).collect())
            .unwrap_or_default();
        assert_eq!(names, vec!["file_path".to_string(), "score".to_string()]);

        let bad = ParquetSource::new(tmp.path(), 16, Some(vec!["nope".into()]));
        assert!(bad.stream().is_err());
        Ok(())
    }

    #[test]
    fn test_parquet_file_missing_error() {
        let src = ParquetSource::new("no_such.parquet", 16, None);
        assert!(src.stream().is_err());
    }
}
