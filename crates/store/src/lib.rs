//! File-backed persistence: the append-only history log, per-model
//! current-state records, round-robin cycle state and the status feed.

pub mod cycle;
pub mod error;
pub mod feed;
mod fsutil;
pub mod history;
pub mod identity;
pub mod model_status;
pub mod run_log;
pub mod summary;

pub use error::StoreError;
