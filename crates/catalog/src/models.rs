//! Catalog snapshot wire types and the derived [`ModelInfo`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use modelwatch_core::architecture::{classify_architecture, Architecture};

/// Application state reported for a model that is serving requests.
pub const RUNNING_STATE: &str = "RUNNING";

/// Deployment tier of a hosted model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeploymentLevel {
    /// Actively running, immediately available.
    Hot,
    /// Offline; unknown levels are treated the same way.
    #[default]
    #[serde(other)]
    Cold,
}

impl DeploymentLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentLevel::Hot => "HOT",
            DeploymentLevel::Cold => "COLD",
        }
    }
}

/// Raw per-deployment record in the catalog response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    #[serde(default)]
    pub repo_id: Option<String>,
    #[serde(default)]
    pub deployment_level: DeploymentLevel,
    #[serde(default)]
    pub application_state: Option<String>,
    /// Parameter count; some deployments report it as a float.
    #[serde(default)]
    pub n_params: Option<f64>,
    #[serde(default)]
    pub dedicated: bool,
    /// Model config, either a JSON string or an inline object.
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

/// Catalog response: deployment key to deployment record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub deployments: BTreeMap<String, Deployment>,
}

/// A catalog model as the orchestrator sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    /// Identifier used for testing and records (the repo id when present).
    pub model_key: String,
    pub repo_id: String,
    pub deployment_level: DeploymentLevel,
    pub application_state: String,
    pub n_params: Option<u64>,
    pub dedicated: bool,
    pub architecture: Architecture,
}

impl ModelInfo {
    /// Build from a deployment entry. Architecture is classified from the
    /// deployment key, falling back to the config.
    pub fn from_deployment(key: &str, deployment: &Deployment) -> Self {
        let repo_id = deployment.repo_id.clone().unwrap_or_else(|| key.to_string());
        let config = deployment.config.as_ref().map(|c| match c {
            serde_json::Value::String(raw) => raw.clone(),
            other => other.to_string(),
        });

        Self {
            model_key: repo_id.clone(),
            repo_id,
            deployment_level: deployment.deployment_level,
            application_state: deployment
                .application_state
                .clone()
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            n_params: deployment
                .n_params
                .filter(|n| n.is_finite() && *n >= 0.0)
                .map(|n| n as u64),
            dedicated: deployment.dedicated,
            architecture: classify_architecture(key, config.as_deref()),
        }
    }

    /// Hot and running; anything else is intentionally offline.
    pub fn is_available(&self) -> bool {
        self.deployment_level == DeploymentLevel::Hot && self.application_state == RUNNING_STATE
    }

    /// Model name without the organization prefix.
    pub fn short_name(&self) -> &str {
        self.model_key
            .rsplit_once('/')
            .map_or(self.model_key.as_str(), |(_, name)| name)
    }
}

/// Models in the snapshot, optionally only the `HOT` ones.
pub fn available_models(snapshot: &CatalogSnapshot, hot_only: bool) -> Vec<ModelInfo> {
    snapshot
        .deployments
        .iter()
        .filter(|(_, d)| !hot_only || d.deployment_level == DeploymentLevel::Hot)
        .map(|(key, d)| ModelInfo::from_deployment(key, d))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> CatalogSnapshot {
        serde_json::from_value(serde_json::json!({
            "deployments": {
                "meta-llama/Llama-3.1-8B": {
                    "repo_id": "meta-llama/Llama-3.1-8B",
                    "deployment_level": "HOT",
                    "application_state": "RUNNING",
                    "n_params": 8030261248u64,
                    "dedicated": true
                },
                "acme/mystery": {
                    "deployment_level": "COLD",
                    "application_state": "NOT_STARTED",
                    "n_params": 1.5e9,
                    "config": "{\"model_type\": \"qwen2\"}"
                },
                "acme/inline": {
                    "deployment_level": "WARM",
                    "config": {"model_type": "gemma"}
                }
            }
        }))
        .expect("valid snapshot")
    }

    #[test]
    fn parses_snapshot_leniently() {
        let models = available_models(&snapshot(), false);
        assert_eq!(models.len(), 3);

        let mystery = models.iter().find(|m| m.model_key == "acme/mystery").expect("present");
        assert_eq!(mystery.architecture, Architecture::Qwen);
        assert_eq!(mystery.n_params, Some(1_500_000_000));
        assert!(!mystery.is_available());

        let inline = models.iter().find(|m| m.model_key == "acme/inline").expect("present");
        assert_eq!(inline.deployment_level, DeploymentLevel::Cold);
        assert_eq!(inline.architecture, Architecture::Gemma);
        assert_eq!(inline.application_state, "UNKNOWN");
    }

    #[test]
    fn hot_only_filters_cold() {
        let models = available_models(&snapshot(), true);
        assert_eq!(models.len(), 1);
        assert!(models[0].is_available());
        assert_eq!(models[0].short_name(), "Llama-3.1-8B");
    }

    #[test]
    fn hot_but_not_running_is_unavailable() {
        let deployment = Deployment {
            deployment_level: DeploymentLevel::Hot,
            application_state: Some("DEPLOYING".to_string()),
            ..Default::default()
        };
        let model = ModelInfo::from_deployment("openai-community/gpt2", &deployment);
        assert!(!model.is_available());
        assert_eq!(model.architecture, Architecture::Gpt2);
        assert_eq!(model.model_key, "openai-community/gpt2");
    }
}
