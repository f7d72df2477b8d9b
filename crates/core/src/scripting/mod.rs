//! Scenario execution.
//!
//! [`executor::TestExecutor`] is the seam the orchestrator drives;
//! [`notebook::NotebookExecutor`] is the shipped implementation, built on the
//! shared subprocess runner.

pub mod executor;
pub mod notebook;
pub mod subprocess;
