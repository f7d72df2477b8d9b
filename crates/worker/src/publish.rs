//! Publication of generated artifacts.
//!
//! [`deploy`] copies the status feed and per-model records into a web
//! directory. [`GitSync`] commits and pushes generated files, retrying the
//! pull-rebase/push step when another monitor pushed first. Neither ever
//! touches the local results.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;

use modelwatch_core::results::RECORD_EXTENSION;
use modelwatch_core::scripting::subprocess::{self, CommandInput, CommandOutput};

/// Attempts for the pull-rebase/push step.
pub const MAX_PUSH_ATTEMPTS: u32 = 3;

/// Pause between push attempts.
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Wall-clock limit for a single git command.
const GIT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`git {command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("Push failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PublishError + '_ {
    move |source| PublishError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Deploy
// ---------------------------------------------------------------------------

/// What [`deploy`] copied.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DeployReport {
    pub feed: bool,
    pub models: usize,
}

/// Copy the published artifacts from `results_dir` into `target`:
///
/// - `data/status.json`, when the feed has been written
/// - every model record as `data/models/{file}`
pub fn deploy(results_dir: &Path, target: &Path) -> Result<DeployReport, PublishError> {
    let models_dir = target.join("data").join("models");
    fs::create_dir_all(&models_dir).map_err(io_error(&models_dir))?;

    let mut report = DeployReport {
        feed: copy_if_exists(
            &results_dir.join("data").join("status.json"),
            &target.join("data").join("status.json"),
        )?,
        models: 0,
    };

    for entry in fs::read_dir(results_dir).map_err(io_error(results_dir))? {
        let entry = entry.map_err(io_error(results_dir))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_model_record(&name) || !entry.path().is_file() {
            continue;
        }
        let dest = models_dir.join(&name);
        fs::copy(entry.path(), &dest).map_err(io_error(&dest))?;
        report.models += 1;
    }

    tracing::info!(
        dest = %target.display(),
        feed = report.feed,
        models = report.models,
        "Dashboard deployed",
    );
    Ok(report)
}

fn is_model_record(name: &str) -> bool {
    name.ends_with(RECORD_EXTENSION) && !name.starts_with('.') && !name.starts_with("run_")
}

fn copy_if_exists(src: &Path, dest: &Path) -> Result<bool, PublishError> {
    if !src.is_file() {
        return Ok(false);
    }
    fs::copy(src, dest).map_err(io_error(dest))?;
    Ok(true)
}

// ---------------------------------------------------------------------------
// Git sync
// ---------------------------------------------------------------------------

/// Commits and pushes files inside one git working tree.
#[derive(Debug, Clone)]
pub struct GitSync {
    repo_dir: PathBuf,
}

impl GitSync {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    /// Stage `paths`, commit when anything is staged and push.
    ///
    /// Returns `false` when there was nothing to commit. A failed pull is
    /// logged and the push attempted anyway; the push is retried up to
    /// [`MAX_PUSH_ATTEMPTS`] times. The local commit is kept on failure.
    pub async fn push(&self, paths: &[PathBuf], message: &str) -> Result<bool, PublishError> {
        let paths: Vec<String> = paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let mut add = vec!["add", "--"];
        add.extend(paths.iter().map(String::as_str));
        self.git_checked(&add).await?;

        let staged = self.git_checked(&["diff", "--cached", "--name-only"]).await?;
        if staged.stdout.trim().is_empty() {
            tracing::debug!(repo = %self.repo_dir.display(), "Nothing to commit");
            return Ok(false);
        }

        self.git_checked(&["commit", "-m", message]).await?;

        let mut last_error = String::new();
        for attempt in 1..=MAX_PUSH_ATTEMPTS {
            let pull = self.git(&["pull", "--rebase"]).await?;
            if !pull.success() {
                tracing::warn!(
                    attempt,
                    stderr = %pull.stderr.trim(),
                    "Pull failed, attempting push anyway",
                );
            }

            let push = self.git(&["push"]).await?;
            if push.success() {
                tracing::info!(repo = %self.repo_dir.display(), attempt, "Pushed changes");
                return Ok(true);
            }

            last_error = push.stderr.trim().to_string();
            tracing::warn!(attempt, stderr = %last_error, "Push failed");
            if attempt < MAX_PUSH_ATTEMPTS {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }

        Err(PublishError::RetriesExhausted {
            attempts: MAX_PUSH_ATTEMPTS,
            message: last_error,
        })
    }

    /// Run `git` in the repository, returning output regardless of exit code.
    async fn git(&self, args: &[&str]) -> Result<CommandOutput, PublishError> {
        let mut cmd = Command::new("git");
        cmd.args(args);

        let input = CommandInput {
            working_directory: Some(self.repo_dir.to_string_lossy().into_owned()),
            ..CommandInput::with_timeout(GIT_TIMEOUT)
        };
        subprocess::run_command(&mut cmd, input)
            .await
            .map_err(|e| PublishError::Command {
                command: args.join(" "),
                message: e.to_string(),
            })
    }

    /// Like [`GitSync::git`] but a non-zero exit is an error.
    async fn git_checked(&self, args: &[&str]) -> Result<CommandOutput, PublishError> {
        let output = self.git(args).await?;
        if !output.success() {
            return Err(PublishError::Command {
                command: args.join(" "),
                message: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}
