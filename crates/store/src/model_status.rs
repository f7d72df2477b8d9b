//! Per-model current-state files.

use std::fs;
use std::path::{Path, PathBuf};

use modelwatch_core::results::{model_to_filename, ModelStatus, RECORD_EXTENSION};

use crate::error::StoreError;
use crate::fsutil;

/// Directory of `{model_to_filename(model)}` records. Writes are
/// last-writer-wins.
#[derive(Debug, Clone)]
pub struct ModelStatusStore {
    dir: PathBuf,
}

impl ModelStatusStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, model: &str) -> PathBuf {
        self.dir.join(model_to_filename(model))
    }

    /// Load a model's record. Missing or corrupt files yield `None`.
    pub fn load(&self, model: &str) -> Result<Option<ModelStatus>, StoreError> {
        read_record(&self.path_for(model))
    }

    /// Overwrite the model's record. Returns the written path.
    pub fn save(&self, status: &ModelStatus) -> Result<PathBuf, StoreError> {
        let path = self.path_for(&status.model);
        let json = serde_json::to_vec_pretty(status)?;
        fsutil::write_atomic(&path, &json)?;
        Ok(path)
    }

    /// Every readable record, sorted by model. Hidden files and run logs are
    /// skipped.
    pub fn list(&self) -> Result<Vec<ModelStatus>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir)(e)),
        };

        let mut statuses = Vec::new();
        for entry in entries {
            let entry = entry.map_err(StoreError::io(&self.dir))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_record_name(&name) || !entry.path().is_file() {
                continue;
            }
            if let Some(status) = read_record(&entry.path())? {
                statuses.push(status);
            }
        }

        statuses.sort_by(|a, b| a.model.cmp(&b.model));
        Ok(statuses)
    }
}

fn is_record_name(name: &str) -> bool {
    name.ends_with(RECORD_EXTENSION) && !name.starts_with('.') && !name.starts_with("run_")
}

fn read_record(path: &Path) -> Result<Option<ModelStatus>, StoreError> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path)(e)),
    };

    match serde_json::from_slice(&raw) {
        Ok(status) => Ok(Some(status)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt model record");
            Ok(None)
        }
    }
}
