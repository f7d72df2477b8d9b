use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use assert_matches::assert_matches;
use async_trait::async_trait;

use modelwatch_catalog::{CatalogError, CatalogSnapshot, ModelCatalog};
use modelwatch_core::architecture::Architecture;
use modelwatch_core::config::MonitorConfig;
use modelwatch_core::scenario::Scenario;
use modelwatch_core::scripting::executor::{ExecutionOutcome, TestExecutor, TestRequest};
use modelwatch_core::status::{ErrorCategory, Status};
use modelwatch_store::cycle::CycleState;
use modelwatch_store::history::HistoryStore;
use modelwatch_store::model_status::ModelStatusStore;
use modelwatch_worker::orchestrator::{MonitorRunner, RunError, RunMode, RunOptions};

const GPT2: &str = "openai-community/gpt2";
const LLAMA: &str = "meta-llama/Llama-3.1-8B";

/// Succeeds unless a canned outcome is registered for the scenario.
#[derive(Default)]
struct ScriptedExecutor {
    outcomes: HashMap<String, ExecutionOutcome>,
    calls: Mutex<Vec<TestRequest>>,
}

impl ScriptedExecutor {
    fn failing(scenario: &str, error: &str) -> Self {
        let mut outcomes = HashMap::new();
        outcomes.insert(scenario.to_string(), ExecutionOutcome::failure(900, error));
        Self {
            outcomes,
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .map(|r| (r.model.clone(), r.scenario.clone()))
            .collect()
    }
}

impl TestExecutor for &ScriptedExecutor {
    async fn execute(&self, request: TestRequest) -> ExecutionOutcome {
        let outcome = self
            .outcomes
            .get(&request.scenario)
            .cloned()
            .unwrap_or_else(|| ExecutionOutcome::success(1_200, "ok".to_string()));
        self.calls.lock().expect("calls lock").push(request);
        outcome
    }

    async fn client_version(&self) -> String {
        "0.5.0-test".to_string()
    }
}

struct StaticCatalog(Option<CatalogSnapshot>);

#[async_trait]
impl ModelCatalog for StaticCatalog {
    async fn fetch_status(&self) -> Result<CatalogSnapshot, CatalogError> {
        self.0.clone().ok_or_else(|| CatalogError::ApiError {
            status: 503,
            body: "maintenance".to_string(),
        })
    }
}

fn snapshot() -> CatalogSnapshot {
    serde_json::from_value(serde_json::json!({
        "deployments": {
            GPT2: {"deployment_level": "HOT", "application_state": "RUNNING", "n_params": 124000000},
            LLAMA: {"deployment_level": "COLD", "application_state": "NOT_DEPLOYED"}
        }
    }))
    .expect("valid snapshot")
}

fn config(dir: &Path) -> MonitorConfig {
    let results = dir.to_string_lossy().into_owned();
    MonitorConfig::from_lookup(|key| match key {
        "MONITOR_RESULTS_DIR" => Some(results.clone()),
        "MONITOR_BASELINE_MODELS" => Some(format!("{GPT2},{LLAMA}")),
        "MONITOR_TIMEZONE" => Some("UTC".to_string()),
        _ => None,
    })
    .expect("valid config")
}

fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new("basic_trace", "trace", 90),
        Scenario::new("generation", "generate", 90),
        Scenario::new("llama_only", "llama specifics", 60).restricted_to(&[Architecture::Llama]),
    ]
}

fn options(mode: RunMode) -> RunOptions {
    RunOptions {
        mode,
        max_per_architecture: 0,
        env: vec![("HF_TOKEN".to_string(), "hf_test".to_string())],
    }
}

#[tokio::test]
async fn full_sweep_tests_hot_models_and_marks_cold_ones() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = config(dir.path());
    let executor = ScriptedExecutor::failing("generation", "ConnectionError: connection refused");

    let runner = MonitorRunner::new(&config, &executor, StaticCatalog(Some(snapshot())))
        .with_scenarios(scenarios());
    let run = runner.run(&options(RunMode::Full)).await.expect("run");

    // Only the hot model reaches the executor, and only applicable scenarios.
    assert_eq!(
        executor.calls(),
        [
            (GPT2.to_string(), "basic_trace".to_string()),
            (GPT2.to_string(), "generation".to_string()),
        ]
    );
    let forwarded = executor.calls.lock().expect("calls lock")[0].env.clone();
    assert_eq!(forwarded, [("HF_TOKEN".to_string(), "hf_test".to_string())]);

    assert_eq!(run.service_version, "0.5.0-test");
    let summary = run.summary();
    assert_eq!(summary.total, 5);
    assert_eq!(summary.ok, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.cold, 3);
    assert!(run.has_failures());

    let failed = run
        .tests
        .iter()
        .find(|t| t.status == Status::Failed)
        .expect("failed test");
    assert_eq!(failed.error_category, Some(ErrorCategory::ConnectionError));
    assert_eq!(failed.duration_ms, 900);

    let cold: Vec<_> = run.tests.iter().filter(|t| t.model == LLAMA).collect();
    assert_eq!(cold.len(), 3);
    assert!(cold.iter().all(|t| t.status == Status::Cold && t.duration_ms == 0));
    assert_eq!(
        cold[0].details.as_deref(),
        Some("Model is COLD (intentionally offline)")
    );
}

#[tokio::test]
async fn every_outcome_is_persisted_and_appended() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = config(dir.path());
    let executor = ScriptedExecutor::default();

    let runner = MonitorRunner::new(&config, &executor, StaticCatalog(Some(snapshot())))
        .with_scenarios(scenarios());
    let run = runner.run(&options(RunMode::Full)).await.expect("run");
    assert!(!run.has_failures());

    let records = ModelStatusStore::new(dir.path());
    let gpt2 = records.load(GPT2).expect("load").expect("gpt2 record");
    assert_eq!(gpt2.overall_status(), Status::Ok);
    assert_eq!(gpt2.service_version, "0.5.0-test");
    assert_eq!(gpt2.scenarios.len(), 2);
    assert!(gpt2.last_all_ok().is_some());

    let llama = records.load(LLAMA).expect("load").expect("llama record");
    assert_eq!(llama.overall_status(), Status::Cold);
    assert_eq!(llama.last_all_ok(), None);

    let history = HistoryStore::from_config(&config);
    let entries = history.load(1, None, None).expect("load history");
    assert_eq!(entries.len(), run.tests.len());
    assert!(entries.iter().all(|e| e.host.is_some() && e.user.is_some()));
    assert_eq!(history.load(1, Some(LLAMA), None).expect("load").len(), 3);
}

#[tokio::test]
async fn later_failure_keeps_last_success() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = config(dir.path());

    let passing = ScriptedExecutor::default();
    MonitorRunner::new(&config, &passing, StaticCatalog(Some(snapshot())))
        .with_scenarios(scenarios())
        .run(&options(RunMode::Full))
        .await
        .expect("first run");
    let first = ModelStatusStore::new(dir.path())
        .load(GPT2)
        .expect("load")
        .expect("record");
    let first_success = first.scenarios["basic_trace"].last_success;

    let failing = ScriptedExecutor::failing("basic_trace", "Model meta-llama not loaded");
    MonitorRunner::new(&config, &failing, StaticCatalog(Some(snapshot())))
        .with_scenarios(scenarios())
        .run(&options(RunMode::Full))
        .await
        .expect("second run");
    let second = ModelStatusStore::new(dir.path())
        .load(GPT2)
        .expect("load")
        .expect("record");

    let trace = &second.scenarios["basic_trace"];
    assert_eq!(trace.status, Status::Unavailable);
    assert_eq!(trace.error_category, Some(ErrorCategory::ModelNotLoaded));
    assert_eq!(trace.last_success, first_success);
    assert_eq!(second.overall_status(), Status::Unavailable);
}

#[tokio::test]
async fn catalog_failure_aborts_without_touching_state() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = config(dir.path());
    let executor = ScriptedExecutor::default();

    for mode in [RunMode::Full, RunMode::Cycle] {
        let runner = MonitorRunner::new(&config, &executor, StaticCatalog(None));
        let err = runner.run(&options(mode)).await.unwrap_err();
        assert_matches!(
            err,
            RunError::CatalogUnavailable(CatalogError::ApiError { status: 503, .. })
        );
    }

    assert!(executor.calls().is_empty());
    assert!(!config.history_path().exists());
    assert!(!config.cycle_state_path().exists());
}

#[tokio::test]
async fn cycle_mode_tests_one_model_per_run() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = config(dir.path());

    let mut tested = Vec::new();
    for _ in 0..3 {
        let executor = ScriptedExecutor::default();
        let run = MonitorRunner::new(&config, &executor, StaticCatalog(Some(snapshot())))
            .with_scenarios(scenarios())
            .run(&options(RunMode::Cycle))
            .await
            .expect("run");

        let mut models: Vec<&str> = run.tests.iter().map(|t| t.model.as_str()).collect();
        models.dedup();
        assert_eq!(models.len(), 1);
        tested.push(models[0].to_string());
    }

    assert_eq!(tested, [GPT2, LLAMA, GPT2]);
    assert_eq!(CycleState::load(config.cycle_state_path()).last_index(), 0);
}

#[tokio::test]
async fn run_log_is_written_on_request() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = config(dir.path());
    let executor = ScriptedExecutor::default();

    let runner = MonitorRunner::new(&config, &executor, StaticCatalog(Some(snapshot())))
        .with_scenarios(scenarios());
    let run = runner.run(&options(RunMode::Full)).await.expect("run");

    let path = runner.save_result(&run, None).expect("save");
    assert_eq!(path, dir.path().join(run.default_filename()));

    // Run logs never show up as model records.
    let listed = ModelStatusStore::new(dir.path()).list().expect("list");
    assert_eq!(listed.len(), 2);
}
