//! Append-only history log.
//!
//! One compact JSON object per line with short keys. Entries are never
//! modified in place; [`HistoryStore::prune`] is the only rewrite and drops
//! whole lines.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use modelwatch_core::config::MonitorConfig;
use modelwatch_core::results::TestResult;
use modelwatch_core::status::{ErrorCategory, Status};
use modelwatch_core::types::{DurationMs, Timestamp};

use crate::error::StoreError;
use crate::fsutil;
use crate::summary::{summarize_daily, DailySummary};

/// Maximum characters of details kept per history line.
pub const MAX_HISTORY_DETAILS_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// HistoryEntry
// ---------------------------------------------------------------------------

/// One immutable historical outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "ts")]
    pub timestamp: Timestamp,
    #[serde(rename = "m")]
    pub model: String,
    #[serde(rename = "s")]
    pub scenario: String,
    #[serde(rename = "st")]
    pub status: Status,
    #[serde(rename = "d")]
    pub duration_ms: DurationMs,
    #[serde(rename = "ec", default, skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
    #[serde(rename = "det", default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl HistoryEntry {
    /// Entry for a finished test, stamped with the machine that ran it.
    pub fn from_result(result: &TestResult, host: Option<String>, user: Option<String>) -> Self {
        Self {
            timestamp: result.timestamp,
            model: result.model.clone(),
            scenario: result.scenario.clone(),
            status: result.status,
            duration_ms: result.duration_ms,
            error_category: result.error_category,
            details: result
                .details
                .as_deref()
                .filter(|d| !d.is_empty())
                .map(|d| d.chars().take(MAX_HISTORY_DETAILS_CHARS).collect()),
            host,
            user,
        }
    }

    fn to_line(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// HistoryStore
// ---------------------------------------------------------------------------

/// JSONL history log plus the presentation settings used to summarize it.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    timezone: Tz,
    slow_threshold_ms: Option<DurationMs>,
}

impl HistoryStore {
    /// A store at `path`, bucketing by `America/New_York` with no speed
    /// threshold.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timezone: chrono_tz::America::New_York,
            slow_threshold_ms: None,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.history_path())
            .with_timezone(config.timezone)
            .with_slow_threshold(config.slow_threshold_ms)
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_slow_threshold(mut self, threshold_ms: Option<DurationMs>) -> Self {
        self.slow_threshold_ms = threshold_ms;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn slow_threshold_ms(&self) -> Option<DurationMs> {
        self.slow_threshold_ms
    }

    // -- writes --

    /// Append one entry as a single self-delimited line.
    pub fn append(&self, entry: &HistoryEntry) -> Result<(), StoreError> {
        self.append_many(std::slice::from_ref(entry))
    }

    /// Append entries one line at a time.
    ///
    /// Each line is a single `write_all` on an append-mode handle, so lines
    /// from concurrent writers never interleave. The batch as a whole is not
    /// atomic.
    pub fn append_many(&self, entries: &[HistoryEntry]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        fsutil::ensure_parent(&self.path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(StoreError::io(&self.path))?;

        let mut isolate_tail =
            lacks_trailing_newline(&mut file).map_err(StoreError::io(&self.path))?;
        if isolate_tail {
            tracing::warn!(
                path = %self.path.display(),
                "History log has a truncated tail; isolating it"
            );
        }

        for entry in entries {
            let mut line = String::new();
            if isolate_tail {
                line.push('\n');
                isolate_tail = false;
            }
            line.push_str(&entry.to_line()?);
            line.push('\n');
            file.write_all(line.as_bytes())
                .map_err(StoreError::io(&self.path))?;
        }

        file.sync_data().map_err(StoreError::io(&self.path))
    }

    // -- reads --

    /// Entries from the last `days` days, optionally filtered by exact model
    /// and scenario.
    pub fn load(
        &self,
        days: u32,
        model: Option<&str>,
        scenario: Option<&str>,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        self.load_since(cutoff(days), model, scenario)
    }

    /// Entries at or after `cutoff`. Malformed lines are skipped and logged;
    /// a missing file is an empty history.
    pub fn load_since(
        &self,
        cutoff: Timestamp,
        model: Option<&str>,
        scenario: Option<&str>,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let mut entries = Vec::new();
        self.scan(|_, parsed| {
            if let Some(entry) = parsed {
                let wanted = entry.timestamp >= cutoff
                    && model.is_none_or(|m| entry.model == m)
                    && scenario.is_none_or(|s| entry.scenario == s);
                if wanted {
                    entries.push(entry);
                }
            }
        })?;
        Ok(entries)
    }

    /// Drop entries older than `keep_days`. Returns the number removed.
    ///
    /// Must not run concurrently with other writers.
    pub fn prune(&self, keep_days: u32) -> Result<usize, StoreError> {
        self.prune_before(cutoff(keep_days))
    }

    /// Drop entries before `cutoff`, keeping the remaining lines
    /// byte-for-byte. Malformed lines are dropped as well.
    pub fn prune_before(&self, cutoff: Timestamp) -> Result<usize, StoreError> {
        let mut kept: Vec<u8> = Vec::new();
        let mut removed = 0usize;
        let mut malformed = 0usize;

        let found = self.scan(|raw, parsed| match parsed {
            Some(entry) if entry.timestamp >= cutoff => {
                kept.extend_from_slice(raw);
                kept.push(b'\n');
            }
            Some(_) => removed += 1,
            None => malformed += 1,
        })?;

        if !found || (removed == 0 && malformed == 0) {
            return Ok(0);
        }

        fsutil::write_atomic(&self.path, &kept)?;
        tracing::info!(
            path = %self.path.display(),
            removed,
            malformed,
            "Pruned history log",
        );
        Ok(removed)
    }

    /// Walk every non-blank line. Returns `false` when the file is missing.
    fn scan<F>(&self, mut visit: F) -> Result<bool, StoreError>
    where
        F: FnMut(&[u8], Option<HistoryEntry>),
    {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(StoreError::io(&self.path)(e)),
        };

        for (index, line) in BufReader::new(file).split(b'\n').enumerate() {
            let line = line.map_err(StoreError::io(&self.path))?;
            let raw = trim_ascii(&line);
            if raw.is_empty() {
                continue;
            }
            match serde_json::from_slice::<HistoryEntry>(raw) {
                Ok(entry) => visit(raw, Some(entry)),
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = index + 1,
                        error = %e,
                        "Skipping malformed history line",
                    );
                    visit(raw, None);
                }
            }
        }
        Ok(true)
    }

    // -- aggregation --

    /// Day-by-model rollup of the last `days` days in the store's timezone.
    pub fn get_daily_summary(&self, days: u32) -> Result<DailySummary, StoreError> {
        let entries = self.load(days, None, None)?;
        Ok(summarize_daily(&entries, self.timezone, self.slow_threshold_ms))
    }

    /// Most recent `FAILED`, `UNAVAILABLE` and `DEGRADED` entries, newest
    /// first.
    pub fn get_recent_failures(
        &self,
        days: u32,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let mut failures: Vec<HistoryEntry> = self
            .load(days, None, None)?
            .into_iter()
            .filter(|e| e.status.is_failure())
            .collect();
        failures.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        failures.truncate(limit);
        Ok(failures)
    }

    /// Models with at least one entry in the last `days` days.
    pub fn models_seen(&self, days: u32) -> Result<BTreeSet<String>, StoreError> {
        Ok(self
            .load(days, None, None)?
            .into_iter()
            .map(|e| e.model)
            .collect())
    }
}

fn cutoff(days: u32) -> Timestamp {
    Utc::now() - Duration::days(i64::from(days))
}

fn lacks_trailing_newline(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace());
    match (start, end) {
        (Some(s), Some(e)) => &bytes[s..=e],
        _ => &[],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
