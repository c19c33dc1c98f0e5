//! Data loading utilities

use crate::error::{HorizonError, Result};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Table reader for the formats the pipeline accepts as raw input
#[derive(Debug, Clone)]
pub struct DataLoader {
    /// Field separator for delimited text
    separator: u8,
    /// Rows used to infer column types; `Some(0)` reads every column as text
    infer_schema_length: Option<usize>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            separator: b',',
            infer_schema_length: Some(100),
        }
    }

    /// Set the CSV field separator
    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    /// Set the number of rows used for type inference
    pub fn with_infer_schema_length(mut self, rows: Option<usize>) -> Self {
        self.infer_schema_length = rows;
        self
    }

    /// Read every column as raw text, leaving casting to the caller
    pub fn as_text(self) -> Self {
        self.with_infer_schema_length(Some(0))
    }

    /// Load a CSV file
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| HorizonError::DataError(format!("{}: {}", path.display(), e)))?;

        let parse_opts = CsvParseOptions::default().with_separator(self.separator);

        CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| HorizonError::DataError(e.to_string()))
    }

    /// Load a Parquet file
    pub fn load_parquet(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| HorizonError::DataError(format!("{}: {}", path.display(), e)))?;

        ParquetReader::new(file)
            .finish()
            .map_err(|e| HorizonError::DataError(e.to_string()))
    }

    /// Load a JSON file
    pub fn load_json(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| HorizonError::DataError(format!("{}: {}", path.display(), e)))?;

        JsonReader::new(file)
            .finish()
            .map_err(|e| HorizonError::DataError(e.to_string()))
    }

    /// Detect file format from extension and load
    pub fn load_auto(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let start = Instant::now();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let df = match ext.as_str() {
            "parquet" | "pq" => self.load_parquet(path)?,
            "json" | "jsonl" => self.load_json(path)?,
            "tsv" => self.clone().with_separator(b'\t').load_csv(path)?,
            "xlsx" | "xls" => {
                return Err(HorizonError::DataError(format!(
                    "{}: spreadsheet sources must be exported to CSV first",
                    path.display()
                )))
            }
            _ => self.load_csv(path)?,
        };

        debug!(
            path = %path.display(),
            rows = df.height(),
            cols = df.width(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded table"
        );
        Ok(df)
    }
}

/// Table writer
pub struct DataSaver;

impl DataSaver {
    /// Save to CSV, creating parent directories as needed
    pub fn save_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = File::create(path)?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(df)
            .map_err(|e| HorizonError::DataError(e.to_string()))
    }
}
