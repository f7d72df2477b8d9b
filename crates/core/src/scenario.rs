//! Test scenario definitions.

use std::time::Duration;

use crate::architecture::Architecture;

/// A named notebook scenario run against each selected model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    /// Identifier; also the notebook file stem.
    pub name: String,
    pub description: String,
    /// Executor timeout for one run of this scenario.
    pub timeout: Duration,
    /// Restrict the scenario to these families. Empty means every model.
    pub architectures: Vec<Architecture>,
}

impl Scenario {
    pub fn new(name: &str, description: &str, timeout_secs: u64) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            timeout: Duration::from_secs(timeout_secs),
            architectures: Vec::new(),
        }
    }

    /// Limit the scenario to the given architecture families.
    pub fn restricted_to(mut self, architectures: &[Architecture]) -> Self {
        self.architectures = architectures.to_vec();
        self
    }

    pub fn applies_to(&self, architecture: Architecture) -> bool {
        self.architectures.is_empty() || self.architectures.contains(&architecture)
    }
}

/// The standard scenario set.
pub fn default_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new(
            "basic_trace",
            "Basic model.trace() with hidden state extraction",
            90,
        ),
        Scenario::new("generation", "Text generation with model.generate()", 90),
        Scenario::new("hidden_states", "Extract hidden states from all layers", 120),
    ]
}
