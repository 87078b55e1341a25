//! Error handling for the agroclima pipeline.
//!
//! Two layers: [`PipelineError`] covers fatal failures that abort the run,
//! while [`FileParseError`] describes why a single atmospheric export was
//! skipped. Per-file failures never abort the batch; the loader logs the
//! reason and moves on.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Input not found: {}", .path.display())]
    InputNotFound { path: PathBuf },

    #[error("Not a directory: {}", .path.display())]
    NotADirectory { path: PathBuf },

    #[error("No .csv data files found in {}", .path.display())]
    NoInputFiles { path: PathBuf },

    #[error("No valid data: all {} candidate files in {} failed to parse", .failed, .path.display())]
    NoValidData { path: PathBuf, failed: usize },

    #[error("Yield table is missing required column: {column}")]
    MissingYieldColumn { column: String },

    #[error("Merge input on the {side} side is missing key column '{column}'")]
    MissingKeyColumn { side: &'static str, column: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Why a single atmospheric export file could not be parsed.
#[derive(Error, Debug)]
pub enum FileParseError {
    #[error("no header line starting with 'PARAMETER,YEAR' found")]
    MissingHeader,

    #[error("missing required columns: {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    #[error("no data rows after the header")]
    EmptyTable,

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed delimited data: {0}")]
    Csv(#[from] csv::Error),

    #[error("table assembly failed: {0}")]
    Polars(#[from] polars::error::PolarsError),
}
