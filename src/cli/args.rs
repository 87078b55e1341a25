//! Command-line argument definitions.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::{JoinStrategy, NullHandling, PipelineConfig};
use crate::constants::DEFAULT_OUTPUT_DIR;
use crate::error::{PipelineError, Result};

/// CLI arguments for the agro-climate dataset builder.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "agroclima-processor",
    version,
    about = "Merge potato yield statistics with per-canton atmospheric exports into a long-format modeling dataset"
)]
pub struct Args {
    /// CSV export of the wide-format potato yield spreadsheet
    #[arg(short = 'p', long = "papa", value_name = "FILE")]
    pub papa_path: PathBuf,

    /// Directory containing one atmospheric export file per canton
    #[arg(short = 'c', long = "clima", value_name = "DIR")]
    pub clima_dir: PathBuf,

    /// Output directory for the final dataset
    #[arg(
        short = 'o',
        long = "output",
        value_name = "DIR",
        default_value = DEFAULT_OUTPUT_DIR
    )]
    pub output_dir: PathBuf,

    /// Only convert yield rows for this canton (case/whitespace-insensitive)
    #[arg(long = "region", value_name = "NAME")]
    pub region: Option<String>,

    /// Join semantics for the final merge
    #[arg(long = "join", value_enum, default_value = "inner")]
    pub join: JoinArg,

    /// Reproduce the legacy null-compacting pairing of the historical
    /// spreadsheet script
    #[arg(long = "compact-nulls")]
    pub compact_nulls: bool,

    /// Also write the consolidated atmospheric table under this filename
    #[arg(long = "save-clima", value_name = "FILE")]
    pub save_clima: Option<String>,

    /// Maximum number of atmospheric files parsed concurrently
    #[arg(long = "max-concurrent", value_name = "N")]
    pub max_concurrent: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Directory for the timestamped run log file
    #[arg(long = "log-dir", value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Suppress the console summary
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

/// CLI surface of [`JoinStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum JoinArg {
    Inner,
    Left,
}

impl From<JoinArg> for JoinStrategy {
    fn from(arg: JoinArg) -> Self {
        match arg {
            JoinArg::Inner => JoinStrategy::Inner,
            JoinArg::Left => JoinStrategy::Left,
        }
    }
}

impl Args {
    /// Check argument consistency before running.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == Some(0) {
            return Err(PipelineError::Configuration {
                message: "--max-concurrent must be at least 1".to_string(),
            });
        }
        if let Some(region) = &self.region {
            if region.trim().is_empty() {
                return Err(PipelineError::Configuration {
                    message: "--region must not be blank".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Resolve the arguments into a pipeline configuration.
    pub fn to_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig {
            papa_path: self.papa_path.clone(),
            clima_dir: self.clima_dir.clone(),
            output_dir: self.output_dir.clone(),
            region_filter: self.region.clone(),
            join_strategy: self.join.into(),
            null_handling: if self.compact_nulls {
                NullHandling::CompactLegacy
            } else {
                NullHandling::PreservePosition
            },
            clima_export_filename: self.save_clima.clone(),
            ..PipelineConfig::default()
        };
        if let Some(limit) = self.max_concurrent {
            config.max_concurrent_files = limit;
        }
        config
    }
}
