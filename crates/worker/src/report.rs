//! Console tables for the `run` and `status` commands.

use std::fmt::Write;

use chrono::Duration;

use modelwatch_core::results::{ModelStatus, MonitorRun};
use modelwatch_core::types::Timestamp;

/// End-of-run summary: counts, duration and one line per test.
pub fn format_run_summary(run: &MonitorRun) -> String {
    let summary = run.summary();
    let mut out = String::new();

    let _ = writeln!(out, "{}", "=".repeat(60));
    let _ = writeln!(out, "SUMMARY (client {})", run.service_version);
    let _ = writeln!(out, "{}", "=".repeat(60));
    for test in &run.tests {
        let _ = write!(
            out,
            "{} {:<45} {:<14} {:<11} {:>6.1}s",
            test.status.symbol(),
            test.model,
            test.scenario,
            test.status.as_str(),
            test.duration_ms as f64 / 1000.0,
        );
        if let Some(category) = test.error_category {
            let _ = write!(out, " [{category}]");
        }
        out.push('\n');
    }
    let _ = writeln!(
        out,
        "Total: {} | OK: {} | SLOW: {} | DEGRADED: {} | FAILED: {} | UNAVAILABLE: {} | COLD: {}",
        summary.total,
        summary.ok,
        summary.slow,
        summary.degraded,
        summary.failed,
        summary.unavailable,
        summary.cold,
    );
    let _ = writeln!(out, "Duration: {:.1}s", run.duration_seconds);
    out
}

/// Every tracked model with its overall status, age and per-scenario
/// last success.
pub fn format_tracked_statuses(statuses: &[ModelStatus], now: Timestamp) -> String {
    if statuses.is_empty() {
        return "No model status files found.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "Tracked Models: {}", statuses.len());
    let _ = writeln!(out, "{}", "-".repeat(70));

    for status in statuses {
        let overall = status.overall_status();
        let _ = writeln!(
            out,
            "{} {:<45} {:<11} ({} ago)",
            overall.symbol(),
            status.model,
            overall.as_str(),
            format_age(now - status.last_updated),
        );
        for (name, scenario) in &status.scenarios {
            let last_ok = scenario
                .last_success
                .map(|at| format!(" last OK {} ago", format_age(now - at)))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "    {} {}: {}{last_ok}",
                scenario.status.symbol(),
                name,
                scenario.status.as_str(),
            );
        }
    }
    out
}

/// Minutes under an hour, fractional hours under a day, whole days beyond.
fn format_age(age: Duration) -> String {
    let seconds = age.num_seconds().max(0);
    if seconds < 3600 {
        format!("{}m", seconds / 60)
    } else if seconds < 86_400 {
        format!("{:.1}h", seconds as f64 / 3600.0)
    } else {
        format!("{}d", seconds / 86_400)
    }
}
