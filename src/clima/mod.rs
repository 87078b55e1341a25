//! Batch loading of the atmospheric export directory.
//!
//! Discovers `.csv` exports, derives each canton identifier from the file
//! stem, parses the files concurrently and concatenates the survivors into
//! one consolidated table. A file that fails to parse is logged and
//! skipped; only a directory with no usable files at all aborts the run.

pub mod parser;

use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use polars::prelude::*;
use tokio::task;
use tracing::{debug, info, warn};

use self::parser::AtmosphericFileParser;
use crate::constants::DATA_FILE_EXTENSION;
use crate::error::{PipelineError, Result};

/// Loads and consolidates every atmospheric export in a directory.
#[derive(Debug, Clone)]
pub struct AtmosphericBatchLoader {
    source_dir: PathBuf,
    max_concurrent: usize,
}

impl AtmosphericBatchLoader {
    pub fn new(source_dir: PathBuf, max_concurrent: usize) -> Self {
        Self {
            source_dir,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Discover the export files, sorted for reproducible output.
    pub async fn discover_files(&self) -> Result<Vec<PathBuf>> {
        if !self.source_dir.is_dir() {
            return Err(PipelineError::NotADirectory {
                path: self.source_dir.clone(),
            });
        }

        let mut files = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.source_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_file() {
                let path = entry.path();
                if is_export_file(&path) {
                    files.push(path);
                }
            }
        }
        if files.is_empty() {
            return Err(PipelineError::NoInputFiles {
                path: self.source_dir.clone(),
            });
        }
        files.sort();
        debug!("discovered {} atmospheric export files", files.len());
        Ok(files)
    }

    /// Parse every export and concatenate the successful tables.
    ///
    /// Parameter columns differ per file; the concatenation takes their
    /// union and fills the gaps with nulls.
    pub async fn load_all(&self) -> Result<DataFrame> {
        let files = self.discover_files().await?;
        let total = files.len();
        info!(
            "processing {} atmospheric export files from {}",
            total,
            self.source_dir.display()
        );

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_message("Parsing atmospheric files");

        let parser = AtmosphericFileParser::new();
        let outcomes = stream::iter(files)
            .map(|path| {
                let pb = pb.clone();
                async move {
                    let region = region_id(&path);
                    let parse_path = path.clone();
                    let joined =
                        task::spawn_blocking(move || parser.parse(&parse_path, &region)).await;
                    pb.inc(1);
                    (path, joined)
                }
            })
            .buffered(self.max_concurrent)
            .collect::<Vec<_>>()
            .await;
        pb.finish_and_clear();

        let mut frames = Vec::new();
        let mut failed = 0usize;
        for (path, joined) in outcomes {
            match joined {
                Ok(Ok(frame)) => {
                    info!("parsed {} ({} rows)", path.display(), frame.height());
                    frames.push(frame.lazy());
                }
                Ok(Err(reason)) => {
                    failed += 1;
                    warn!("skipping {}: {}", path.display(), reason);
                }
                Err(join_error) => {
                    failed += 1;
                    warn!("skipping {}: worker failed: {}", path.display(), join_error);
                }
            }
        }
        if frames.is_empty() {
            return Err(PipelineError::NoValidData {
                path: self.source_dir.clone(),
                failed,
            });
        }
        info!(
            "successfully parsed {} of {} atmospheric files",
            total - failed,
            total
        );

        let consolidated = concat_lf_diagonal(frames, UnionArgs::default())?.collect()?;
        Ok(consolidated)
    }
}

/// Canton identifier of an export file: its base name without extension.
fn region_id(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_export_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == DATA_FILE_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MONTH_COLUMNS;
    use std::fs;
    use tempfile::TempDir;

    fn export_body(parameter: &str) -> String {
        format!(
            "PARAMETER,YEAR,{}\n{},2020,1,2,3,4,5,6,7,8,9,10,11,12\n",
            MONTH_COLUMNS.join(","),
            parameter
        )
    }

    #[test]
    fn export_files_match_on_extension() {
        assert!(is_export_file(Path::new("Turrialba.csv")));
        assert!(!is_export_file(Path::new("Turrialba.txt")));
        assert!(!is_export_file(Path::new("Turrialba")));
        assert!(!is_export_file(Path::new("Turrialba.CSV")));
    }

    #[test]
    fn region_id_is_the_file_stem() {
        assert_eq!(region_id(Path::new("/data/clima/Turrialba.csv")), "Turrialba");
        assert_eq!(region_id(Path::new("El Guarco.csv")), "El Guarco");
    }

    #[tokio::test]
    async fn missing_directory_is_rejected() {
        let loader = AtmosphericBatchLoader::new(PathBuf::from("/nonexistent/clima"), 2);
        let err = loader.load_all().await.unwrap_err();
        assert!(matches!(err, PipelineError::NotADirectory { .. }));
    }

    #[tokio::test]
    async fn directory_without_exports_fails_with_no_input_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "not data").unwrap();

        let loader = AtmosphericBatchLoader::new(dir.path().to_path_buf(), 2);
        let err = loader.load_all().await.unwrap_err();
        assert!(matches!(err, PipelineError::NoInputFiles { .. }));
    }

    #[tokio::test]
    async fn all_invalid_exports_fail_with_no_valid_data() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.csv"), "no,marker,here\n1,2,3\n").unwrap();
        fs::write(dir.path().join("b.csv"), "also,not,valid\n").unwrap();

        let loader = AtmosphericBatchLoader::new(dir.path().to_path_buf(), 2);
        let err = loader.load_all().await.unwrap_err();
        match err {
            PipelineError::NoValidData { failed, .. } => assert_eq!(failed, 2),
            other => panic!("expected NoValidData, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn one_bad_file_does_not_abort_the_batch() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Turrialba.csv"), export_body("T2M")).unwrap();
        fs::write(dir.path().join("broken.csv"), "nothing useful\n").unwrap();

        let loader = AtmosphericBatchLoader::new(dir.path().to_path_buf(), 2);
        let frame = loader.load_all().await.unwrap();
        assert_eq!(frame.height(), 12);
        let cantons = frame.column("canton").unwrap().str().unwrap();
        assert_eq!(cantons.get(0), Some("TURRIALBA"));
    }

    #[tokio::test]
    async fn consolidation_takes_the_union_of_parameter_columns() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Alvarado.csv"), export_body("T2M")).unwrap();
        fs::write(dir.path().join("Zarcero.csv"), export_body("RH2M")).unwrap();

        let loader = AtmosphericBatchLoader::new(dir.path().to_path_buf(), 2);
        let frame = loader.load_all().await.unwrap();
        assert_eq!(frame.height(), 24);

        let names: Vec<&str> = frame.get_column_names().iter().map(|n| n.as_str()).collect();
        assert!(names.contains(&"T2M"));
        assert!(names.contains(&"RH2M"));

        // Alvarado sorts first and has no RH2M values.
        let rh2m = frame.column("RH2M").unwrap().f64().unwrap();
        assert_eq!(rh2m.get(0), None);
        let t2m = frame.column("T2M").unwrap().f64().unwrap();
        assert_eq!(t2m.get(0), Some(1.0));
    }
}
