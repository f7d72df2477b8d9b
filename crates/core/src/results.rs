//! Per-model current-state records and run-level reports.
//!
//! [`ModelStatus`] is the durable "current state" of one model: one
//! [`ScenarioResult`] per scenario, overwritten in place whenever a new
//! outcome arrives. [`ModelStatus::apply`] is the only mutation path and
//! owns the last-success watermark rule.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::status::{fold_worst, ErrorCategory, Status};
use crate::types::{DurationMs, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum characters of error details kept on a current-state record.
pub const MAX_RECORD_DETAILS_CHARS: usize = 500;

/// Marker appended to truncated details.
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// Version tag used when the client library version cannot be determined.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Truncate `text` to at most `max_chars` characters, appending
/// [`TRUNCATION_MARKER`] when anything was cut.
pub fn truncate_details(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// TestResult
// ---------------------------------------------------------------------------

/// Outcome of one scenario run against one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub model: String,
    pub scenario: String,
    pub status: Status,
    pub duration_ms: DurationMs,
    pub error_category: Option<ErrorCategory>,
    pub details: Option<String>,
    /// Captured output; kept in memory for the run log only.
    #[serde(skip)]
    pub output: Option<String>,
    pub timestamp: Timestamp,
}

// ---------------------------------------------------------------------------
// ScenarioResult
// ---------------------------------------------------------------------------

/// Latest known state of one scenario for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub status: Status,
    pub duration_ms: DurationMs,
    pub last_checked: Timestamp,
    #[serde(default)]
    pub last_success: Option<Timestamp>,
    #[serde(default)]
    pub error_category: Option<ErrorCategory>,
    #[serde(default)]
    pub details: Option<String>,
}

// ---------------------------------------------------------------------------
// ModelStatus
// ---------------------------------------------------------------------------

/// Durable current-state record for a single model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ModelStatusRecord", from = "ModelStatusRecord")]
pub struct ModelStatus {
    pub model: String,
    pub last_updated: Timestamp,
    pub service_version: String,
    pub scenarios: BTreeMap<String, ScenarioResult>,
}

impl ModelStatus {
    /// An empty record, created on the first result for `model`.
    pub fn new(model: impl Into<String>, at: Timestamp, service_version: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            last_updated: at,
            service_version: service_version.into(),
            scenarios: BTreeMap::new(),
        }
    }

    /// Worst status across all scenarios; `UNAVAILABLE` when there are none.
    pub fn overall_status(&self) -> Status {
        fold_worst(self.scenarios.values().map(|s| s.status)).unwrap_or(Status::Unavailable)
    }

    /// Earliest last-success across scenarios.
    ///
    /// Defined only once every scenario has succeeded at least once: the point
    /// by which all of them had passed, assuming none has regressed since.
    pub fn last_all_ok(&self) -> Option<Timestamp> {
        if self.scenarios.is_empty() {
            return None;
        }
        self.scenarios
            .values()
            .map(|s| s.last_success)
            .collect::<Option<Vec<_>>>()?
            .into_iter()
            .min()
    }

    /// Fold a new outcome into the record.
    ///
    /// The scenario's last-success watermark moves to the result's timestamp
    /// when the status is passing and is carried forward otherwise. A result
    /// older than the scenario's `last_checked` is stale and left out, so
    /// neither timestamp ever moves backwards. Details are truncated to
    /// [`MAX_RECORD_DETAILS_CHARS`]. Returns whether the record changed.
    pub fn apply(&mut self, result: &TestResult, service_version: &str) -> bool {
        let at = result.timestamp;
        let existing = self.scenarios.get(&result.scenario);
        if existing.is_some_and(|s| s.last_checked > at) {
            return false;
        }

        let carried = existing.and_then(|s| s.last_success);
        let last_success = if result.status.is_passing() {
            carried.max(Some(at))
        } else {
            carried
        };

        self.scenarios.insert(
            result.scenario.clone(),
            ScenarioResult {
                status: result.status,
                duration_ms: result.duration_ms,
                last_checked: at,
                last_success,
                error_category: result.error_category,
                details: result
                    .details
                    .as_deref()
                    .map(|d| truncate_details(d, MAX_RECORD_DETAILS_CHARS)),
            },
        );
        self.last_updated = self.last_updated.max(at);
        self.service_version = service_version.to_string();
        true
    }
}

/// Persisted shape of [`ModelStatus`]: the stored fields plus the derived
/// `overall_status` and `last_all_ok`, which are ignored on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelStatusRecord {
    model: String,
    last_updated: Timestamp,
    #[serde(default = "unknown_version")]
    service_version: String,
    #[serde(default)]
    overall_status: Option<Status>,
    #[serde(default)]
    last_all_ok: Option<Timestamp>,
    #[serde(default)]
    scenarios: BTreeMap<String, ScenarioResult>,
}

fn unknown_version() -> String {
    UNKNOWN_VERSION.to_string()
}

impl From<ModelStatus> for ModelStatusRecord {
    fn from(status: ModelStatus) -> Self {
        Self {
            overall_status: Some(status.overall_status()),
            last_all_ok: status.last_all_ok(),
            model: status.model,
            last_updated: status.last_updated,
            service_version: status.service_version,
            scenarios: status.scenarios,
        }
    }
}

impl From<ModelStatusRecord> for ModelStatus {
    fn from(record: ModelStatusRecord) -> Self {
        Self {
            model: record.model,
            last_updated: record.last_updated,
            service_version: record.service_version,
            scenarios: record.scenarios,
        }
    }
}

// ---------------------------------------------------------------------------
// MonitorRun
// ---------------------------------------------------------------------------

/// Per-status counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub ok: usize,
    pub slow: usize,
    pub degraded: usize,
    pub failed: usize,
    pub unavailable: usize,
    pub cold: usize,
    pub total: usize,
}

/// Report of one monitoring invocation, independent of the durable records.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorRun {
    pub timestamp: Timestamp,
    pub service_version: String,
    pub duration_seconds: f64,
    pub tests: Vec<TestResult>,
}

impl MonitorRun {
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.tests.len(),
            ..Default::default()
        };
        for test in &self.tests {
            match test.status {
                Status::Ok => summary.ok += 1,
                Status::Slow => summary.slow += 1,
                Status::Degraded => summary.degraded += 1,
                Status::Failed => summary.failed += 1,
                Status::Unavailable => summary.unavailable += 1,
                Status::Cold => summary.cold += 1,
            }
        }
        summary
    }

    /// True when any scenario ended `FAILED` or `UNAVAILABLE`.
    pub fn has_failures(&self) -> bool {
        self.tests.iter().any(|t| t.status.is_fatal())
    }

    /// Default run-log file name, e.g. `run_20250101_120000.json`.
    pub fn default_filename(&self) -> String {
        format!("run_{}.json", self.timestamp.format("%Y%m%d_%H%M%S"))
    }

    /// Pretty JSON including the computed summary.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct RunLog<'a> {
            #[serde(flatten)]
            run: &'a MonitorRun,
            summary: RunSummary,
        }

        serde_json::to_string_pretty(&RunLog {
            run: self,
            summary: self.summary(),
        })
    }
}

// ---------------------------------------------------------------------------
// File names
// ---------------------------------------------------------------------------

/// Extension of per-model record files.
pub const RECORD_EXTENSION: &str = ".json";

/// Map a model identifier to a filesystem-safe record file name.
///
/// `/` becomes `--` and `:` becomes `_`. Literal `%` and `_`, and any `-`
/// touching another `-` or a `/`, are percent-escaped so the mapping stays
/// reversible via [`filename_to_model`]. Typical keys such as
/// `meta-llama/Llama-3.1-8B` map to `meta-llama--Llama-3.1-8B.json`.
pub fn model_to_filename(model: &str) -> String {
    let chars: Vec<char> = model.chars().collect();
    let mut out = String::with_capacity(model.len() + RECORD_EXTENSION.len());

    for (i, &c) in chars.iter().enumerate() {
        match c {
            '/' => out.push_str("--"),
            ':' => out.push('_'),
            '%' => out.push_str("%25"),
            '_' => out.push_str("%5F"),
            '-' => {
                let touches = |n: Option<&char>| matches!(n, Some('-') | Some('/'));
                let prev = i.checked_sub(1).and_then(|p| chars.get(p));
                if touches(prev) || touches(chars.get(i + 1)) {
                    out.push_str("%2D");
                } else {
                    out.push('-');
                }
            }
            other => out.push(other),
        }
    }

    out.push_str(RECORD_EXTENSION);
    out
}

/// Inverse of [`model_to_filename`].
pub fn filename_to_model(filename: &str) -> String {
    let stem = filename.strip_suffix(RECORD_EXTENSION).unwrap_or(filename);
    let mut out = String::with_capacity(stem.len());
    let mut rest = stem;

    while let Some(c) = rest.chars().next() {
        if let Some(tail) = rest.strip_prefix("--") {
            out.push('/');
            rest = tail;
        } else if let Some(decoded) = rest
            .strip_prefix('%')
            .and_then(|r| r.get(..2))
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        {
            out.push(decoded as char);
            rest = &rest[3..];
        } else if c == '_' {
            out.push(':');
            rest = &rest[1..];
        } else {
            out.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
