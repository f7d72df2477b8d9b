//! Notebook scenario executor.
//!
//! Each scenario is a notebook at `{scenarios_dir}/{model_dir}/{scenario}.ipynb`,
//! executed headless through `nbconvert` in a scratch directory. Error cells
//! in the executed notebook are the primary source of failure text.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::fs;
use tokio::process::Command;

use super::executor::{ExecutionOutcome, ScriptError, TestExecutor, TestRequest};
use super::subprocess::{self, CommandInput};
use crate::config::MonitorConfig;
use crate::results::UNKNOWN_VERSION;

/// Time allowed on top of the scenario timeout for interpreter and kernel
/// startup.
pub const STARTUP_OVERHEAD: Duration = Duration::from_secs(30);

/// File stem of the executed notebook inside the scratch directory.
const EXECUTED_STEM: &str = "executed_notebook";

/// Timeout for the version probe.
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Executor running scenario notebooks with a Python interpreter.
pub struct NotebookExecutor {
    python: String,
    scenarios_dir: PathBuf,
    client_package: String,
}

impl NotebookExecutor {
    pub fn new(
        python: impl Into<String>,
        scenarios_dir: impl Into<PathBuf>,
        client_package: impl Into<String>,
    ) -> Self {
        Self {
            python: python.into(),
            scenarios_dir: scenarios_dir.into(),
            client_package: client_package.into(),
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(
            config.python.clone(),
            config.scenarios_dir.clone(),
            config.client_package.clone(),
        )
    }

    /// Location of a model's notebook for `scenario`.
    pub fn notebook_path(&self, model: &str, scenario: &str) -> PathBuf {
        self.scenarios_dir
            .join(model.replace('/', "--"))
            .join(format!("{scenario}.ipynb"))
    }

    async fn run_notebook(
        &self,
        notebook: &Path,
        scratch: &Path,
        request: &TestRequest,
    ) -> ExecutionOutcome {
        let runtime_dir = scratch.join("jupyter_runtime");
        if let Err(e) = fs::create_dir_all(&runtime_dir).await {
            return ExecutionOutcome::failure(0, ScriptError::IoError(e).to_string());
        }

        let mut env_vars = with_key_alias(request.env.clone());
        env_vars.push(("MODEL_NAME".to_string(), request.model.clone()));
        env_vars.push((
            "JUPYTER_RUNTIME_DIR".to_string(),
            runtime_dir.to_string_lossy().into_owned(),
        ));

        let mut cmd = Command::new(&self.python);
        cmd.args(["-m", "nbconvert", "--to", "notebook", "--execute"])
            .args(["--output", EXECUTED_STEM])
            .arg("--output-dir")
            .arg(scratch)
            .arg("--ExecutePreprocessor.timeout")
            .arg(request.timeout.as_secs().to_string())
            .arg("--KernelManager.ip=127.0.0.1")
            .arg(notebook);

        let input = CommandInput {
            env_vars,
            working_directory: None,
            timeout: request.timeout + STARTUP_OVERHEAD,
        };

        let start = Instant::now();
        let output = match subprocess::run_command(&mut cmd, input).await {
            Ok(output) => output,
            Err(ScriptError::Timeout { elapsed_ms }) => {
                return ExecutionOutcome::failure(
                    elapsed_ms,
                    format!(
                        "Notebook execution timed out after {}s",
                        request.timeout.as_secs()
                    ),
                );
            }
            Err(e) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                return ExecutionOutcome::failure(elapsed_ms, e.to_string());
            }
        };

        let executed = scratch.join(format!("{EXECUTED_STEM}.ipynb"));
        let notebook_json = match fs::read_to_string(&executed).await {
            Ok(raw) => serde_json::from_str::<Value>(&raw).ok(),
            Err(_) => None,
        };
        let (cell_output, cell_error) = notebook_json
            .as_ref()
            .map(extract_cell_outputs)
            .unwrap_or_default();

        let output_text = if cell_output.is_empty() {
            format!("{}{}", output.stdout, output.stderr)
        } else {
            cell_output
        };

        if output.success() && cell_error.is_none() {
            return ExecutionOutcome::success(output.duration_ms, output_text);
        }

        let error = cell_error.unwrap_or_else(|| {
            let stderr = output.stderr.trim();
            if stderr.is_empty() {
                format!("nbconvert exited with code {}", output.exit_code)
            } else {
                stderr.to_string()
            }
        });

        ExecutionOutcome {
            succeeded: false,
            duration_ms: output.duration_ms,
            output: output_text,
            error: Some(error),
        }
    }
}

impl TestExecutor for NotebookExecutor {
    async fn execute(&self, request: TestRequest) -> ExecutionOutcome {
        let notebook = self.notebook_path(&request.model, &request.scenario);
        if fs::metadata(&notebook).await.is_err() {
            let name = notebook
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            return ExecutionOutcome::failure(0, ScriptError::NotFound(name).to_string());
        }

        let scratch = std::env::temp_dir()
            .join(format!("nbexec_{}", uuid::Uuid::new_v4().simple()));
        let outcome = self.run_notebook(&notebook, &scratch, &request).await;

        if let Err(e) = fs::remove_dir_all(&scratch).await {
            tracing::debug!(
                path = %scratch.display(),
                error = %e,
                "Failed to remove scratch directory"
            );
        }

        outcome
    }

    async fn client_version(&self) -> String {
        let mut cmd = Command::new(&self.python);
        cmd.args(["-m", "pip", "show", &self.client_package]);

        let input = CommandInput::with_timeout(VERSION_PROBE_TIMEOUT);
        match subprocess::run_command(&mut cmd, input).await {
            Ok(output) if output.success() => {
                parse_pip_version(&output.stdout).unwrap_or_else(|| UNKNOWN_VERSION.to_string())
            }
            Ok(output) => {
                tracing::warn!(
                    package = %self.client_package,
                    exit_code = output.exit_code,
                    "Client package not installed",
                );
                UNKNOWN_VERSION.to_string()
            }
            Err(e) => {
                tracing::warn!(package = %self.client_package, error = %e, "Version probe failed");
                UNKNOWN_VERSION.to_string()
            }
        }
    }
}

/// Collect the named variables from the current process environment.
pub fn collect_passthrough_env(keys: &[String]) -> Vec<(String, String)> {
    keys.iter()
        .filter_map(|key| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .map(|v| (key.clone(), v))
        })
        .collect()
}

/// The client library reads `NDIF_API_KEY`; export `NDIF_API` under that
/// name too unless it is already set.
fn with_key_alias(mut env: Vec<(String, String)>) -> Vec<(String, String)> {
    let has_alias = env.iter().any(|(k, _)| k == "NDIF_API_KEY");
    let api = env
        .iter()
        .find(|(k, _)| k == "NDIF_API")
        .map(|(_, v)| v.clone());
    if let (false, Some(value)) = (has_alias, api) {
        env.push(("NDIF_API_KEY".to_string(), value));
    }
    env
}

fn parse_pip_version(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Version:"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Combined text output and first error (`ename: evalue`) of an executed
/// notebook's code cells.
pub fn extract_cell_outputs(notebook: &Value) -> (String, Option<String>) {
    let mut outputs = Vec::new();
    let mut first_error = None;

    let code_cells = notebook
        .get("cells")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|cell| cell.get("cell_type").and_then(Value::as_str) == Some("code"));

    for cell in code_cells {
        let cell_outputs = cell.get("outputs").and_then(Value::as_array);
        for output in cell_outputs.into_iter().flatten() {
            match output.get("output_type").and_then(Value::as_str) {
                Some("stream") => outputs.push(joined_text(output.get("text"))),
                Some("error") => {
                    let ename = output.get("ename").and_then(Value::as_str).unwrap_or("Error");
                    let evalue = output.get("evalue").and_then(Value::as_str).unwrap_or("");
                    let error_text = format!("{ename}: {evalue}");

                    let traceback = joined_lines(output.get("traceback"));
                    outputs.push(if traceback.is_empty() {
                        error_text.clone()
                    } else {
                        traceback
                    });
                    first_error.get_or_insert(error_text);
                }
                Some("execute_result") | Some("display_data") => {
                    if let Some(text) = output.get("data").and_then(|d| d.get("text/plain")) {
                        outputs.push(joined_text(Some(text)));
                    }
                }
                _ => {}
            }
        }
    }

    (outputs.join("\n"), first_error)
}

/// Notebook text fields are either a string or a list of line fragments.
fn joined_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}

fn joined_lines(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
