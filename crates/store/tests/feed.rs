use chrono::{Duration, Utc};

use modelwatch_core::results::{ModelStatus, TestResult};
use modelwatch_core::status::{ErrorCategory, Status};
use modelwatch_store::feed::StatusFeed;
use modelwatch_store::history::{HistoryEntry, HistoryStore};
use modelwatch_store::model_status::ModelStatusStore;

fn result(model: &str, scenario: &str, status: Status, age_minutes: i64) -> TestResult {
    TestResult {
        model: model.to_string(),
        scenario: scenario.to_string(),
        status,
        duration_ms: 2_000,
        error_category: status
            .is_failure()
            .then_some(ErrorCategory::ConnectionError),
        details: status
            .is_failure()
            .then(|| "ConnectionError: refused".to_string()),
        output: None,
        timestamp: Utc::now() - Duration::minutes(age_minutes),
    }
}

#[test]
fn feed_combines_history_and_current_records() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let history = HistoryStore::new(dir.path().join("history.jsonl"))
        .with_timezone(chrono_tz::UTC)
        .with_slow_threshold(Some(30_000));
    let records = ModelStatusStore::new(dir.path());

    let results = [
        result("org/alpha", "basic_trace", Status::Ok, 30),
        result("org/alpha", "generation", Status::Failed, 20),
        result("org/beta", "basic_trace", Status::Ok, 10),
    ];

    for r in &results {
        let mut status = records
            .load(&r.model)
            .expect("load")
            .unwrap_or_else(|| ModelStatus::new(&r.model, r.timestamp, "0.4.2"));
        status.apply(r, "0.4.2");
        records.save(&status).expect("save");
        history
            .append(&HistoryEntry::from_result(r, Some("host".into()), Some("ci".into())))
            .expect("append");
    }

    let now = Utc::now();
    let feed = StatusFeed::build(&history, &records, 7, now).expect("build");

    assert_eq!(feed.days, 7);
    assert_eq!(feed.dates.len(), 7);
    assert_eq!(feed.dates.last(), Some(&now.format("%Y-%m-%d").to_string()));
    assert_eq!(feed.timezone, "UTC");
    assert_eq!(feed.slow_threshold_ms, Some(30_000));
    assert_eq!(feed.models, ["org/alpha", "org/beta"]);
    assert_eq!(feed.current.len(), 2);
    assert_eq!(feed.current[0].overall_status(), Status::Failed);
    assert_eq!(feed.failures.len(), 1);
    assert_eq!(feed.failures[0].scenario, "generation");

    let path = dir.path().join("data").join("status.json");
    feed.write(&path).expect("write");
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
    assert_eq!(value["current"][0]["overall_status"], "FAILED");
    assert_eq!(value["failures"][0]["error_category"], "CONNECTION_ERROR");
    assert!(value["daily"].as_object().is_some_and(|d| !d.is_empty()));
}

#[test]
fn history_window_excludes_old_entries_from_summary() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let history = HistoryStore::new(dir.path().join("history.jsonl"));

    let old = result("org/old", "basic_trace", Status::Ok, 60 * 24 * 10);
    let new = result("org/new", "basic_trace", Status::Ok, 5);
    history
        .append_many(&[
            HistoryEntry::from_result(&old, None, None),
            HistoryEntry::from_result(&new, None, None),
        ])
        .expect("append");

    let summary = history.get_daily_summary(3).expect("summary");
    let models: Vec<&String> = summary.values().flat_map(|m| m.keys()).collect();
    assert_eq!(models, ["org/new"]);
}
