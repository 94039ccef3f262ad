use super::DataSource;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{fs::File, io::BufRead, path::PathBuf};

/// A line-by-line JSONL reader that supports both untyped (`Value`) and
/// typed (`T: DeserializeOwned`) parsing. Blank lines are skipped.
///
/// # Example
/// ```ignore
/// #[derive(serde::Deserialize)]
/// struct Row {
///     file_path: String,
///     score: f32,
/// }
///
/// let source = JsonlSource::new("train.jsonl");
/// for row in source.stream::<Row>()? {
///     let row = row?;
///     println!("{} -> {}", row.file_path, row.score);
/// }
/// ```
pub struct JsonlSource {
    path: PathBuf,
}

impl JsonlSource {
    /// Creates a new reader for a JSONL file at the given path.
    ///
    /// # Arguments
    /// - `path`: Accepts `String`, `&str`, or `PathBuf`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Streams lines as Rust types. Prefer this for type-safe workflows.
    ///
    /// # Type Parameter
    /// - `T`: Must implement `serde::Deserialize` (use `#[derive(Deserialize)]`).
    ///
    /// # Errors
    /// - Fails if the file cannot be opened or any line is invalid JSON for `T`.
    /// - Includes line numbers in errors (e.g., "Invalid JSON at line 3").
    pub fn stream<T: DeserializeOwned>(
        &self,
    ) -> Result<Box<dyn Iterator<Item = Result<T>> + Send>> {
        self.stream_impl()
    }

    /// Streams lines as `serde_json::Value`. Used when the columns are only
    /// known at runtime, as with configurable target columns.
    pub fn stream_values(&self) -> Result<Box<dyn Iterator<Item = Result<Value>> + Send>> {
        self.stream_impl()
    }

    /// Shared implementation for both typed and untyped streaming.
    fn stream_impl<T: DeserializeOwned>(
        &self,
    ) -> Result<Box<dyn Iterator<Item = Result<T>> + Send>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let reader = std::io::BufReader::new(file);

        let iter = reader.lines().enumerate().filter_map(|(line_num, line)| {
            let line = match line {
                Ok(l) if l.trim().is_empty() => return None, // Skip blanks
                Ok(l) => l,
                Err(e) => return Some(Err(e.into())),
            };
            Some(
                serde_json::from_str::<T>(&line)
                    .with_context(|| format!("Invalid JSON at line {}", line_num + 1)),
            )
        });
        Ok(Box::new(iter))
    }
}

// Implement `DataSource` for `Value` (untyped as default)
impl DataSource<Value> for JsonlSource {
    fn stream(&self) -> Result<Box<dyn Iterator<Item = Result<Value>> + Send>> {
        self.stream_values()
    }
}
