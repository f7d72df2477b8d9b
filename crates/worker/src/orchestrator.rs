//! Test orchestration.
//!
//! [`MonitorRunner`] fetches the catalog, picks the models to test, runs
//! every applicable scenario through a [`TestExecutor`] and persists each
//! outcome as soon as it is known: the model's current-state record is
//! rewritten and one history entry is appended. Test failures are data;
//! only an unreachable catalog aborts a run.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;

use modelwatch_catalog::selection::select_models;
use modelwatch_catalog::{CatalogError, ModelCatalog, ModelInfo};
use modelwatch_core::config::MonitorConfig;
use modelwatch_core::results::{MonitorRun, ModelStatus, TestResult};
use modelwatch_core::scenario::{default_scenarios, Scenario};
use modelwatch_core::scripting::executor::{TestExecutor, TestRequest};
use modelwatch_core::status::{classify_error, determine_status, Status};
use modelwatch_store::cycle::CycleState;
use modelwatch_store::history::{HistoryEntry, HistoryStore};
use modelwatch_store::identity;
use modelwatch_store::model_status::ModelStatusStore;
use modelwatch_store::run_log;
use modelwatch_store::StoreError;

/// How a run chooses its models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Every selected model.
    Full,
    /// One model per invocation, round-robin across invocations.
    Cycle,
}

/// Per-invocation knobs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: RunMode,
    /// Extra hot models per architecture beyond the baseline.
    pub max_per_architecture: usize,
    /// Environment forwarded to every executor call.
    pub env: Vec<(String, String)>,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(#[from] CatalogError),
}

/// Drives one monitoring run.
pub struct MonitorRunner<E, C> {
    executor: E,
    catalog: C,
    scenarios: Vec<Scenario>,
    baseline_models: Vec<String>,
    records: ModelStatusStore,
    history: HistoryStore,
    results_dir: PathBuf,
    cycle_state_path: PathBuf,
    host: String,
    user: String,
}

impl<E: TestExecutor, C: ModelCatalog> MonitorRunner<E, C> {
    /// A runner using the default scenarios and the configured stores.
    pub fn new(config: &MonitorConfig, executor: E, catalog: C) -> Self {
        Self {
            executor,
            catalog,
            scenarios: default_scenarios(),
            baseline_models: config.baseline_models.clone(),
            records: ModelStatusStore::new(&config.results_dir),
            history: HistoryStore::from_config(config),
            results_dir: config.results_dir.clone(),
            cycle_state_path: config.cycle_state_path(),
            host: identity::hostname(),
            user: identity::username(),
        }
    }

    pub fn with_scenarios(mut self, scenarios: Vec<Scenario>) -> Self {
        self.scenarios = scenarios;
        self
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Run the selected models through every applicable scenario.
    pub async fn run(&self, options: &RunOptions) -> Result<MonitorRun, RunError> {
        let started = Instant::now();
        let timestamp = Utc::now();

        let snapshot = self.catalog.fetch_status().await?;
        let candidates = select_models(
            &snapshot,
            &self.baseline_models,
            options.max_per_architecture,
        );
        let models = match options.mode {
            RunMode::Full => candidates,
            RunMode::Cycle => self.next_in_cycle(candidates).into_iter().collect(),
        };

        let service_version = self.executor.client_version().await;
        tracing::info!(
            models = models.len(),
            scenarios = self.scenarios.len(),
            service_version = %service_version,
            mode = ?options.mode,
            "Starting test run",
        );

        let mut tests = Vec::new();
        for model in &models {
            tests.extend(self.test_model(model, &service_version, &options.env).await);
        }

        let run = MonitorRun {
            timestamp,
            service_version,
            duration_seconds: started.elapsed().as_secs_f64(),
            tests,
        };

        let summary = run.summary();
        tracing::info!(
            total = summary.total,
            ok = summary.ok,
            failed = summary.failed,
            unavailable = summary.unavailable,
            cold = summary.cold,
            duration_s = run.duration_seconds,
            "Test run finished",
        );
        Ok(run)
    }

    /// Advance the round-robin index over `candidates` and take that model.
    fn next_in_cycle(&self, mut candidates: Vec<ModelInfo>) -> Option<ModelInfo> {
        let mut state = CycleState::load(&self.cycle_state_path);
        let index = match state.advance(candidates.len()) {
            Ok(index) => index,
            Err(e) => {
                // The in-memory position still advanced; only persistence failed.
                tracing::warn!(error = %e, "Failed to persist cycle state");
                usize::try_from(state.last_index()).ok()
            }
        }?;
        let model = candidates.swap_remove(index);
        tracing::info!(model = %model.model_key, index, "Cycle mode selected model");
        Some(model)
    }

    /// Run every applicable scenario for one model, recording each outcome.
    async fn test_model(
        &self,
        model: &ModelInfo,
        service_version: &str,
        env: &[(String, String)],
    ) -> Vec<TestResult> {
        let applicable = self
            .scenarios
            .iter()
            .filter(|s| s.applies_to(model.architecture));

        let mut results = Vec::new();
        if !model.is_available() {
            tracing::info!(
                model = %model.model_key,
                level = model.deployment_level.as_str(),
                state = %model.application_state,
                "Model is offline, recording COLD",
            );
            for scenario in applicable {
                let result = TestResult {
                    model: model.model_key.clone(),
                    scenario: scenario.name.clone(),
                    status: Status::Cold,
                    duration_ms: 0,
                    error_category: None,
                    details: Some(format!(
                        "Model is {} (intentionally offline)",
                        model.deployment_level.as_str()
                    )),
                    output: None,
                    timestamp: Utc::now(),
                };
                self.record(&result, service_version);
                results.push(result);
            }
            return results;
        }

        for scenario in applicable {
            let request = TestRequest {
                scenario: scenario.name.clone(),
                model: model.model_key.clone(),
                timeout: scenario.timeout,
                env: env.to_vec(),
            };
            let outcome = self.executor.execute(request).await;

            let status = determine_status(outcome.succeeded, outcome.error.as_deref());
            let error_category = if outcome.succeeded {
                None
            } else {
                Some(classify_error(outcome.error.as_deref().unwrap_or_default()))
            };
            let result = TestResult {
                model: model.model_key.clone(),
                scenario: scenario.name.clone(),
                status,
                duration_ms: outcome.duration_ms,
                error_category,
                details: outcome.error,
                output: Some(outcome.output).filter(|o| !o.is_empty()),
                timestamp: Utc::now(),
            };

            match result.error_category {
                Some(category) => tracing::warn!(
                    model = %result.model,
                    scenario = %result.scenario,
                    status = %result.status,
                    category = %category,
                    duration_ms = result.duration_ms,
                    details = first_line(result.details.as_deref()),
                    "Scenario failed",
                ),
                None => tracing::info!(
                    model = %result.model,
                    scenario = %result.scenario,
                    status = %result.status,
                    duration_ms = result.duration_ms,
                    "Scenario passed",
                ),
            }

            self.record(&result, service_version);
            results.push(result);
        }
        results
    }

    /// Persist one outcome. Storage failures are logged, never propagated.
    fn record(&self, result: &TestResult, service_version: &str) {
        if let Err(e) = self.update_record(result, service_version) {
            tracing::error!(
                model = %result.model,
                scenario = %result.scenario,
                error = %e,
                "Failed to save model status",
            );
        }

        let entry = HistoryEntry::from_result(
            result,
            Some(self.host.clone()),
            Some(self.user.clone()),
        );
        if let Err(e) = self.history.append(&entry) {
            tracing::error!(
                model = %result.model,
                scenario = %result.scenario,
                error = %e,
                "Failed to append history entry",
            );
        }
    }

    fn update_record(&self, result: &TestResult, service_version: &str) -> Result<(), StoreError> {
        let mut status = self
            .records
            .load(&result.model)?
            .unwrap_or_else(|| ModelStatus::new(&result.model, result.timestamp, service_version));
        if !status.apply(result, service_version) {
            tracing::warn!(
                model = %result.model,
                scenario = %result.scenario,
                "Stored record is newer than this result, leaving it unchanged",
            );
            return Ok(());
        }
        self.records.save(&status)?;
        Ok(())
    }

    /// Write the run log into the results directory.
    pub fn save_result(
        &self,
        run: &MonitorRun,
        filename: Option<&str>,
    ) -> Result<PathBuf, StoreError> {
        run_log::write_run_log(&self.results_dir, run, filename)
    }
}

fn first_line(details: Option<&str>) -> &str {
    details.and_then(|d| d.lines().next()).unwrap_or_default()
}
