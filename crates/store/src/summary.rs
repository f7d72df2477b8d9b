//! Calendar rollups of history entries.
//!
//! Every entry is converted into the configured timezone before bucketing,
//! so a run at 23:30 UTC and one at 00:30 UTC the next day land on the same
//! Eastern date. Statuses are combined with [`fold_worst`], the same fold
//! that drives live overall status.

use std::collections::BTreeMap;

use chrono::Timelike;
use chrono_tz::Tz;
use serde::Serialize;

use modelwatch_core::status::{fold_worst, Status};
use modelwatch_core::types::{DurationMs, Timestamp};

use crate::history::HistoryEntry;

/// One model's rollup for one local date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayModelSummary {
    /// Fold of the per-scenario statuses.
    pub status: Status,
    /// Latest status of each scenario that day.
    pub scenarios: BTreeMap<String, Status>,
    /// Local hour (0-23) to the fold of every entry in that hour.
    pub hours: BTreeMap<u32, Status>,
}

/// Local date (`YYYY-MM-DD`) to model to rollup. Dates and models with no
/// entries are absent.
pub type DailySummary = BTreeMap<String, BTreeMap<String, DayModelSummary>>;

#[derive(Default)]
struct DayModelBuilder {
    latest: BTreeMap<String, (Timestamp, Status)>,
    hours: BTreeMap<u32, Status>,
}

impl DayModelBuilder {
    fn add(&mut self, scenario: &str, at: Timestamp, hour: u32, status: Status) {
        match self.latest.get_mut(scenario) {
            Some((seen_at, seen)) if at == *seen_at => {
                *seen = worse(*seen, status);
            }
            Some((seen_at, seen)) if at > *seen_at => {
                *seen_at = at;
                *seen = status;
            }
            Some(_) => {}
            None => {
                self.latest.insert(scenario.to_string(), (at, status));
            }
        }

        self.hours
            .entry(hour)
            .and_modify(|existing| *existing = worse(*existing, status))
            .or_insert(status);
    }

    fn finish(self) -> Option<DayModelSummary> {
        let scenarios: BTreeMap<String, Status> = self
            .latest
            .into_iter()
            .map(|(name, (_, status))| (name, status))
            .collect();
        let status = fold_worst(scenarios.values().copied())?;
        Some(DayModelSummary {
            status,
            scenarios,
            hours: self.hours,
        })
    }
}

fn worse(a: Status, b: Status) -> Status {
    fold_worst([a, b]).unwrap_or(a)
}

/// Roll `entries` up by local date and model.
///
/// With a slow threshold, `OK` entries slower than it count as `SLOW`.
pub fn summarize_daily(
    entries: &[HistoryEntry],
    timezone: Tz,
    slow_threshold_ms: Option<DurationMs>,
) -> DailySummary {
    let mut builders: BTreeMap<(String, String), DayModelBuilder> = BTreeMap::new();

    for entry in entries {
        let local = entry.timestamp.with_timezone(&timezone);
        let date = local.format("%Y-%m-%d").to_string();
        let status = entry
            .status
            .with_speed_threshold(entry.duration_ms, slow_threshold_ms);

        builders
            .entry((date, entry.model.clone()))
            .or_default()
            .add(&entry.scenario, entry.timestamp, local.hour(), status);
    }

    let mut summary = DailySummary::new();
    for ((date, model), builder) in builders {
        if let Some(day) = builder.finish() {
            summary.entry(date).or_default().insert(model, day);
        }
    }
    summary
}
