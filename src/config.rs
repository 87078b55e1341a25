//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::{DEFAULT_OUTPUT_DIR, DEFAULT_OUTPUT_FILENAME};

/// How null cells in a wide yield row are treated before pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NullHandling {
    /// Keep every cell in its calendar slot; missing months stay missing.
    #[default]
    PreservePosition,
    /// Drop null cells before pairing, shifting later values into earlier
    /// slots. Reproduces the historical spreadsheet-script output, where a
    /// gap month pulls every following month forward. Only useful for
    /// comparing against legacy exports.
    CompactLegacy,
}

/// Join semantics of the final merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JoinStrategy {
    /// Keep only (canton, anio, mes) keys present on both sides.
    #[default]
    Inner,
    /// Keep every atmospheric row; yield columns are null when unmatched.
    Left,
}

/// Runtime configuration for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Wide-format yield table, a CSV export of the source spreadsheet.
    pub papa_path: PathBuf,
    /// Directory holding one atmospheric export file per canton.
    pub clima_dir: PathBuf,
    /// Output directory, created if absent.
    pub output_dir: PathBuf,
    /// Final artifact filename inside `output_dir`.
    pub output_filename: String,
    /// Optional canton filter for the yield table, matched on the
    /// normalized key.
    pub region_filter: Option<String>,
    pub null_handling: NullHandling,
    pub join_strategy: JoinStrategy,
    /// Upper bound on concurrently parsed atmospheric files.
    pub max_concurrent_files: usize,
    /// When set, the consolidated atmospheric table is also written to
    /// `output_dir` under this name.
    pub clima_export_filename: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            papa_path: PathBuf::new(),
            clima_dir: PathBuf::new(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            output_filename: DEFAULT_OUTPUT_FILENAME.to_string(),
            region_filter: None,
            null_handling: NullHandling::default(),
            join_strategy: JoinStrategy::default(),
            max_concurrent_files: default_concurrency(),
            clima_export_filename: None,
        }
    }
}

/// Worker bound for the batch loader. Exports are small, so more workers
/// than cores buys nothing.
pub fn default_concurrency() -> usize {
    num_cpus::get().clamp(1, 8)
}
