//! Monitoring worker: runs scenarios against catalog models, records the
//! outcomes and publishes the status feed.

pub mod orchestrator;
pub mod publish;
pub mod report;
