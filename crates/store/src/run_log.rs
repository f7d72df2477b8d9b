//! Optional per-invocation run logs (`run_YYYYMMDD_HHMMSS.json`).

use std::path::{Path, PathBuf};

use modelwatch_core::results::MonitorRun;

use crate::error::StoreError;
use crate::fsutil;

/// Write `run` into `dir`, under `filename` or the run's default name.
pub fn write_run_log(
    dir: &Path,
    run: &MonitorRun,
    filename: Option<&str>,
) -> Result<PathBuf, StoreError> {
    let path = dir.join(filename.map_or_else(|| run.default_filename(), str::to_string));
    let json = run.to_json()?;
    fsutil::write_atomic(&path, json.as_bytes())?;
    tracing::info!(path = %path.display(), tests = run.tests.len(), "Run log saved");
    Ok(path)
}
