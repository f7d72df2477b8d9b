//! Aggregated status feed consumed by the dashboard page.

use std::path::Path;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use modelwatch_core::results::ModelStatus;
use modelwatch_core::status::{ErrorCategory, Status};
use modelwatch_core::types::{DurationMs, Timestamp};

use crate::error::StoreError;
use crate::fsutil;
use crate::history::{HistoryEntry, HistoryStore};
use crate::identity;
use crate::model_status::ModelStatusStore;
use crate::summary::DailySummary;

/// Window for the recent-failures list.
pub const RECENT_FAILURE_DAYS: u32 = 7;

/// Maximum entries in the recent-failures list.
pub const RECENT_FAILURE_LIMIT: usize = 10;

/// A failure as shown in the feed, with full field names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub timestamp: Timestamp,
    pub model: String,
    pub scenario: String,
    pub status: Status,
    pub error_category: Option<ErrorCategory>,
    pub details: Option<String>,
}

impl From<HistoryEntry> for FailureRecord {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            timestamp: entry.timestamp,
            model: entry.model,
            scenario: entry.scenario,
            status: entry.status,
            error_category: entry.error_category,
            details: entry.details,
        }
    }
}

/// Contents of `data/status.json`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusFeed {
    pub generated: Timestamp,
    pub host: String,
    pub user: String,
    pub days: u32,
    /// Local dates of the window, oldest first.
    pub dates: Vec<String>,
    pub timezone: String,
    pub slow_threshold_ms: Option<DurationMs>,
    /// Models with history in the window, sorted.
    pub models: Vec<String>,
    pub daily: DailySummary,
    pub current: Vec<ModelStatus>,
    pub failures: Vec<FailureRecord>,
}

impl StatusFeed {
    /// Assemble the feed from the history log and current-state records.
    pub fn build(
        history: &HistoryStore,
        records: &ModelStatusStore,
        days: u32,
        now: Timestamp,
    ) -> Result<Self, StoreError> {
        let daily = history.get_daily_summary(days)?;

        let mut models: Vec<String> = daily
            .values()
            .flat_map(|by_model| by_model.keys().cloned())
            .collect();
        models.sort();
        models.dedup();

        let failures = history
            .get_recent_failures(RECENT_FAILURE_DAYS, RECENT_FAILURE_LIMIT)?
            .into_iter()
            .map(FailureRecord::from)
            .collect();

        let today = now.with_timezone(&history.timezone()).date_naive();

        Ok(Self {
            generated: now,
            host: identity::hostname(),
            user: identity::username(),
            days,
            dates: window_dates(today, days),
            timezone: history.timezone().name().to_string(),
            slow_threshold_ms: history.slow_threshold_ms(),
            models,
            daily,
            current: records.list()?,
            failures,
        })
    }

    /// Write the feed as pretty JSON, replacing any previous file.
    pub fn write(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(self)?;
        fsutil::write_atomic(path, &json)?;
        tracing::info!(
            path = %path.display(),
            models = self.models.len(),
            current = self.current.len(),
            "Status feed written",
        );
        Ok(())
    }
}

/// The `days` local dates ending at `today`, oldest first.
fn window_dates(today: NaiveDate, days: u32) -> Vec<String> {
    (0..i64::from(days))
        .rev()
        .map(|back| (today - Duration::days(back)).format("%Y-%m-%d").to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_oldest_first_and_ends_today() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 2).expect("date");
        assert_eq!(
            window_dates(today, 3),
            ["2025-02-28", "2025-03-01", "2025-03-02"]
        );
        assert!(window_dates(today, 0).is_empty());
    }
}
