//! Test executor interface and shared types.
//!
//! Defines [`TestExecutor`], the seam between the orchestrator and whatever
//! actually runs a scenario, along with [`TestRequest`], [`ExecutionOutcome`]
//! and the subprocess-level [`ScriptError`].

use std::fmt;
use std::time::Duration;

/// One scenario run requested by the orchestrator.
#[derive(Debug, Clone)]
pub struct TestRequest {
    pub scenario: String,
    pub model: String,
    /// Scenario budget; executors may add their own startup overhead.
    pub timeout: Duration,
    /// Extra environment variables for the run.
    pub env: Vec<(String, String)>,
}

/// What an executor observed. Failures are data here, never errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub succeeded: bool,
    pub duration_ms: u64,
    /// Captured output for the run log.
    pub output: String,
    /// Error text used for status mapping and classification.
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn success(duration_ms: u64, output: String) -> Self {
        Self {
            succeeded: true,
            duration_ms,
            output,
            error: None,
        }
    }

    pub fn failure(duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            duration_ms,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Errors raised while driving a child process.
#[derive(Debug)]
pub enum ScriptError {
    /// The script or notebook was not found at the specified path.
    NotFound(String),
    /// The process exceeded its configured timeout and was killed.
    Timeout {
        /// Elapsed wall-clock time before the process was killed.
        elapsed_ms: u64,
    },
    /// An I/O error occurred while spawning or communicating with the process.
    IoError(std::io::Error),
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "Notebook not found: {path}"),
            Self::Timeout { elapsed_ms } => {
                write!(f, "Process timed out after {elapsed_ms}ms")
            }
            Self::IoError(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for ScriptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError(err) => Some(err),
            _ => None,
        }
    }
}

/// Runs one scenario against one model.
///
/// Implementations must not return errors for test failures: timeouts,
/// crashes and missing scenarios are reported through
/// [`ExecutionOutcome::error`].
pub trait TestExecutor: Send + Sync {
    fn execute(
        &self,
        request: TestRequest,
    ) -> impl std::future::Future<Output = ExecutionOutcome> + Send;

    /// Version of the client library the scenarios exercise.
    fn client_version(&self) -> impl std::future::Future<Output = String> + Send;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_not_found() {
        let err = ScriptError::NotFound("basic_trace.ipynb".to_string());
        assert_eq!(err.to_string(), "Notebook not found: basic_trace.ipynb");
    }

    #[test]
    fn display_timeout() {
        let err = ScriptError::Timeout { elapsed_ms: 5000 };
        assert_eq!(err.to_string(), "Process timed out after 5000ms");
    }

    #[test]
    fn error_source_io() {
        let err = ScriptError::IoError(std::io::Error::other("boom"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("I/O error:"));
    }

    #[test]
    fn failure_outcome_carries_error() {
        let outcome = ExecutionOutcome::failure(12, "ConnectionError: refused");
        assert!(!outcome.succeeded);
        assert_eq!(outcome.error.as_deref(), Some("ConnectionError: refused"));
        assert!(ExecutionOutcome::success(5, String::new()).error.is_none());
    }
}
