use std::path::PathBuf;
use std::str::FromStr;

use chrono_tz::Tz;

use crate::error::CoreError;

/// Models always tested when present in the catalog, in display order.
pub const DEFAULT_BASELINE_MODELS: &[&str] = &[
    "openai-community/gpt2",
    "EleutherAI/gpt-j-6b",
    "meta-llama/Llama-2-7b-hf",
    "meta-llama/Llama-3.1-8B",
    "allenai/Olmo-3-1025-7B",
    "meta-llama/Llama-3.1-70B",
    "meta-llama/Llama-3.1-70B-Instruct",
    "meta-llama/Llama-3.3-70B-Instruct",
    "meta-llama/Llama-3.1-405B-Instruct",
];

/// Monitor configuration loaded from environment variables.
///
/// Passed explicitly into every component that needs it; nothing reads the
/// environment after startup.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Root of current-state records, history log and run logs.
    pub results_dir: PathBuf,
    /// Root of scenario notebooks, one subdirectory per model.
    pub scenarios_dir: PathBuf,
    /// Remote catalog status endpoint.
    pub catalog_url: String,
    /// Zone used for day and hour bucketing.
    pub timezone: Tz,
    /// `OK` runs slower than this are presented as `SLOW`. `None` disables.
    pub slow_threshold_ms: Option<u64>,
    /// Extra hot models tested per architecture beyond the baseline.
    pub max_per_architecture: usize,
    /// Window, in days, for the published feed.
    pub history_days: u32,
    pub baseline_models: Vec<String>,
    /// Interpreter used to drive notebook execution.
    pub python: String,
    /// Client library whose version is reported as the service version.
    pub client_package: String,
    /// Variables forwarded from this process to each notebook run.
    pub passthrough_env: Vec<String>,
}

impl MonitorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                       |
    /// |--------------------------------|-------------------------------|
    /// | `MONITOR_RESULTS_DIR`          | `results`                     |
    /// | `MONITOR_SCENARIOS_DIR`        | `notebooks`                   |
    /// | `MONITOR_CATALOG_URL`          | `https://api.ndif.us/status`  |
    /// | `MONITOR_TIMEZONE`             | `America/New_York`            |
    /// | `MONITOR_SLOW_THRESHOLD_MS`    | `30000` (`0` disables)        |
    /// | `MONITOR_MAX_PER_ARCHITECTURE` | `2`                           |
    /// | `MONITOR_HISTORY_DAYS`         | `365`                         |
    /// | `MONITOR_BASELINE_MODELS`      | [`DEFAULT_BASELINE_MODELS`]   |
    /// | `MONITOR_PYTHON`               | `python3`                     |
    /// | `MONITOR_CLIENT_PACKAGE`       | `nnsight`                     |
    /// | `MONITOR_PASSTHROUGH_ENV`      | `NDIF_API,HF_TOKEN`           |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let timezone_name = var("MONITOR_TIMEZONE", "America/New_York");
        let timezone = Tz::from_str(timezone_name.trim()).map_err(|_| {
            CoreError::Validation(format!("MONITOR_TIMEZONE: unknown zone '{timezone_name}'"))
        })?;

        let slow_threshold_ms: u64 =
            parse_number("MONITOR_SLOW_THRESHOLD_MS", &var("MONITOR_SLOW_THRESHOLD_MS", "30000"))?;

        let baseline_models = match lookup("MONITOR_BASELINE_MODELS") {
            Some(raw) => split_list(&raw),
            None => DEFAULT_BASELINE_MODELS.iter().map(|m| m.to_string()).collect(),
        };

        Ok(Self {
            results_dir: PathBuf::from(var("MONITOR_RESULTS_DIR", "results")),
            scenarios_dir: PathBuf::from(var("MONITOR_SCENARIOS_DIR", "notebooks")),
            catalog_url: var("MONITOR_CATALOG_URL", "https://api.ndif.us/status"),
            timezone,
            slow_threshold_ms: (slow_threshold_ms > 0).then_some(slow_threshold_ms),
            max_per_architecture: parse_number(
                "MONITOR_MAX_PER_ARCHITECTURE",
                &var("MONITOR_MAX_PER_ARCHITECTURE", "2"),
            )?,
            history_days: parse_number("MONITOR_HISTORY_DAYS", &var("MONITOR_HISTORY_DAYS", "365"))?,
            baseline_models,
            python: var("MONITOR_PYTHON", "python3"),
            client_package: var("MONITOR_CLIENT_PACKAGE", "nnsight"),
            passthrough_env: split_list(&var("MONITOR_PASSTHROUGH_ENV", "NDIF_API,HF_TOKEN")),
        })
    }

    /// Path of the append-only history log.
    pub fn history_path(&self) -> PathBuf {
        self.results_dir.join("history.jsonl")
    }

    /// Path of the published status feed.
    pub fn feed_path(&self) -> PathBuf {
        self.results_dir.join("data").join("status.json")
    }

    /// Path of the round-robin cycle state.
    pub fn cycle_state_path(&self) -> PathBuf {
        self.results_dir.join(".cycle_state.json")
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T, CoreError> {
    raw.trim().parse().map_err(|_| {
        CoreError::Validation(format!("{key} must be a non-negative integer, got '{raw}'"))
    })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<MonitorConfig, CoreError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MonitorConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).expect("defaults are valid");
        assert_eq!(config.results_dir, PathBuf::from("results"));
        assert_eq!(config.timezone, chrono_tz::America::New_York);
        assert_eq!(config.slow_threshold_ms, Some(30_000));
        assert_eq!(config.max_per_architecture, 2);
        assert_eq!(config.history_days, 365);
        assert_eq!(config.baseline_models.len(), DEFAULT_BASELINE_MODELS.len());
        assert_eq!(config.passthrough_env, ["NDIF_API", "HF_TOKEN"]);
        assert_eq!(config.history_path(), PathBuf::from("results/history.jsonl"));
        assert_eq!(config.feed_path(), PathBuf::from("results/data/status.json"));
    }

    #[test]
    fn zero_threshold_disables_slow() {
        let config = config_from(&[("MONITOR_SLOW_THRESHOLD_MS", "0")]).expect("valid");
        assert_eq!(config.slow_threshold_ms, None);
    }

    #[test]
    fn baseline_list_is_comma_separated() {
        let config =
            config_from(&[("MONITOR_BASELINE_MODELS", "a/b, c/d ,,")]).expect("valid");
        assert_eq!(config.baseline_models, ["a/b", "c/d"]);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert_matches!(
            config_from(&[("MONITOR_TIMEZONE", "Mars/Olympus")]),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            config_from(&[("MONITOR_MAX_PER_ARCHITECTURE", "-1")]),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            config_from(&[("MONITOR_HISTORY_DAYS", "soon")]),
            Err(CoreError::Validation(_))
        );
    }
}
