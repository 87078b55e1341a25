//! Pipeline orchestration: input validation, staging, artifact writing.
//!
//! The stages run in a fixed order: yield conversion (papa), atmospheric
//! batch load (clima), then the keyed merge. A stage failure is logged
//! with its stage name and re-raised, aborting the run.

pub mod report;

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use polars::prelude::*;
use tracing::{error, info};

use self::report::QualityReport;
use crate::clima::AtmosphericBatchLoader;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::merge::DatasetMerger;
use crate::papa::{self, WideToLongConverter};

/// Outcome of a completed pipeline run.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub output_path: PathBuf,
    pub report: QualityReport,
    pub elapsed: Duration,
}

/// Sequences the papa, clima and merge stages and writes the artifact.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the full pipeline and return the artifact path, the quality
    /// report and the elapsed wall time.
    pub async fn run(&self) -> Result<PipelineOutcome> {
        let started = Instant::now();
        info!("starting pipeline run");

        self.validate_inputs()?;

        let papa = self.process_papa().map_err(|e| {
            error!("papa stage failed: {}", e);
            e
        })?;
        let clima = self.process_clima().await.map_err(|e| {
            error!("clima stage failed: {}", e);
            e
        })?;
        let merged = DatasetMerger::new(self.config.join_strategy)
            .merge(&clima, &papa)
            .map_err(|e| {
                error!("merge stage failed: {}", e);
                e
            })?;

        fs::create_dir_all(&self.config.output_dir)?;
        if let Some(name) = &self.config.clima_export_filename {
            let clima_path = self.config.output_dir.join(name);
            write_csv(&clima_path, clima.clone())?;
            info!(
                "consolidated atmospheric table written to {}",
                clima_path.display()
            );
        }
        let output_path = self.config.output_dir.join(&self.config.output_filename);
        write_csv(&output_path, merged.clone())?;
        info!("final dataset written to {}", output_path.display());

        let report = QualityReport::from_frame(&merged)?;
        info!("quality report: {}", report);

        Ok(PipelineOutcome {
            output_path,
            report,
            elapsed: started.elapsed(),
        })
    }

    fn validate_inputs(&self) -> Result<()> {
        if !self.config.papa_path.exists() {
            return Err(PipelineError::InputNotFound {
                path: self.config.papa_path.clone(),
            });
        }
        if !self.config.clima_dir.exists() {
            return Err(PipelineError::InputNotFound {
                path: self.config.clima_dir.clone(),
            });
        }
        if !self.config.clima_dir.is_dir() {
            return Err(PipelineError::NotADirectory {
                path: self.config.clima_dir.clone(),
            });
        }
        info!("input validation complete");
        Ok(())
    }

    fn process_papa(&self) -> Result<DataFrame> {
        info!(
            "processing yield table from {}",
            self.config.papa_path.display()
        );
        let rows = papa::read_wide_table(&self.config.papa_path)?;
        let mut converter =
            WideToLongConverter::new().with_null_handling(self.config.null_handling);
        if let Some(region) = &self.config.region_filter {
            converter = converter.with_region_filter(region.clone());
        }
        let records = converter.convert(&rows);
        let frame = papa::monthly_frame(&records)?;
        info!("yield table: {} monthly rows", frame.height());
        Ok(frame)
    }

    async fn process_clima(&self) -> Result<DataFrame> {
        info!(
            "processing atmospheric exports from {}",
            self.config.clima_dir.display()
        );
        let loader = AtmosphericBatchLoader::new(
            self.config.clima_dir.clone(),
            self.config.max_concurrent_files,
        );
        loader.load_all().await
    }
}

fn write_csv(path: &Path, mut frame: DataFrame) -> Result<()> {
    let file = File::create(path)?;
    CsvWriter::new(file).include_header(true).finish(&mut frame)?;
    Ok(())
}
