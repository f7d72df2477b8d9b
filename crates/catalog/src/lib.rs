//! Remote model catalog: deployment snapshot, architecture grouping and
//! test-subset selection.

pub mod api;
pub mod models;
pub mod selection;

pub use api::{CatalogApi, CatalogError, ModelCatalog};
pub use models::{CatalogSnapshot, DeploymentLevel, ModelInfo};
