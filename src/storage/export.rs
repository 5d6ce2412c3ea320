//! Dataset hand-off files
//!
//! The merged details of a run are written as a single JSON array of detail
//! payloads, next to a JSON run report. Downstream flattening and loading
//! read these files.

use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::OutputConfig;
use crate::error::{Error, Result};
use crate::models::DetailRecord;

/// Writes the dataset and report files of a run
#[derive(Debug, Clone)]
pub struct DatasetWriter {
    dataset_path: PathBuf,
    report_path: PathBuf,
}

impl DatasetWriter {
    pub fn new(dataset_path: impl Into<PathBuf>, report_path: impl Into<PathBuf>) -> Self {
        Self {
            dataset_path: dataset_path.into(),
            report_path: report_path.into(),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(config.dataset_path.clone(), config.report_path.clone())
    }

    pub fn dataset_path(&self) -> &Path {
        &self.dataset_path
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    /// Write the detail payloads as one JSON array
    pub fn write_dataset(&self, details: &[DetailRecord]) -> Result<&Path> {
        let payloads: Vec<&Value> = details.iter().map(|d| &d.payload).collect();
        write_json(&self.dataset_path, &payloads)?;

        tracing::info!(
            path = %self.dataset_path.display(),
            records = details.len(),
            "Dataset written"
        );
        Ok(&self.dataset_path)
    }

    pub fn write_report<T: Serialize>(&self, report: &T) -> Result<&Path> {
        write_json(&self.report_path, report)?;
        tracing::info!(path = %self.report_path.display(), "Report written");
        Ok(&self.report_path)
    }
}

/// Serialize `value` as pretty JSON into `path`, creating parent directories
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            Error::with_source(format!("Failed to create directory {}", parent.display()), e)
        })?;
    }

    let file = File::create(path)
        .map_err(|e| Error::with_source(format!("Failed to create {}", path.display()), e))?;

    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_write_dataset_creates_parents() {
        let dir = TempDir::new().unwrap();
        let writer = DatasetWriter::new(
            dir.path().join("out").join("dataset.json"),
            dir.path().join("out").join("report.json"),
        );

        let details = vec![
            DetailRecord::new("2".into(), json!({"numero": 2})),
            DetailRecord::new("1".into(), json!({"numero": 1})),
        ];
        let path = writer.write_dataset(&details).unwrap();

        let written: Vec<Value> =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written, vec![json!({"numero": 2}), json!({"numero": 1})]);
    }

    #[test]
    fn test_write_report() {
        let dir = TempDir::new().unwrap();
        let writer = DatasetWriter::new(dir.path().join("d.json"), dir.path().join("r.json"));
        writer.write_report(&json!({"outcome": "done"})).unwrap();

        let written: Value =
            serde_json::from_str(&fs::read_to_string(writer.report_path()).unwrap()).unwrap();
        assert_eq!(written["outcome"], "done");
    }
}
