use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::model::WeatherRecord;

/// Writes records as single-line JSON artifacts under the data directory.
///
/// The artifact is the durable fallback for the whole pipeline: a write
/// failure here is fatal, since every later stage depends on the file.
#[derive(Debug, Clone)]
pub struct LocalStore {
    data_dir: PathBuf,
}

impl LocalStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Write one artifact named after the record's fetch second and return
    /// its path. Directory creation is idempotent.
    pub fn write(&self, record: &WeatherRecord) -> Result<PathBuf> {
        fs::create_dir_all(&self.data_dir).with_context(|| {
            format!("Failed to create data directory: {}", self.data_dir.display())
        })?;

        let path = self.data_dir.join(record.artifact_basename());

        let json =
            serde_json::to_string(record).context("Failed to serialize weather record to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write artifact: {}", path.display()))?;

        info!(path = %path.display(), "saved local artifact");
        Ok(path)
    }

    /// Read a record back from an existing artifact, e.g. for re-staging.
    pub fn read(path: &Path) -> Result<WeatherRecord> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact: {}", path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse artifact as a weather record: {}", path.display()))
    }
}
