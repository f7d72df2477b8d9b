//! Model architecture families and key-based classification.

use serde::{Deserialize, Serialize};

/// Architecture family of a hosted model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    Llama,
    Mistral,
    Qwen,
    Gpt2,
    Gptj,
    GptNeox,
    Gemma,
    Olmo,
    Phi,
    Deepseek,
    Unknown,
}

impl Architecture {
    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Architecture::Llama => "llama",
            Architecture::Mistral => "mistral",
            Architecture::Qwen => "qwen",
            Architecture::Gpt2 => "gpt2",
            Architecture::Gptj => "gptj",
            Architecture::GptNeox => "gpt_neox",
            Architecture::Gemma => "gemma",
            Architecture::Olmo => "olmo",
            Architecture::Phi => "phi",
            Architecture::Deepseek => "deepseek",
            Architecture::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered keyword groups. The first group with a keyword contained in the
/// lower-cased input wins.
const ARCHITECTURE_RULES: &[(&[&str], Architecture)] = &[
    (&["llama", "llama-2", "llama-3"], Architecture::Llama),
    (&["mistral"], Architecture::Mistral),
    (&["qwen"], Architecture::Qwen),
    (&["gpt2", "gpt-2"], Architecture::Gpt2),
    (&["gptj", "gpt-j"], Architecture::Gptj),
    (&["pythia", "gpt-neox", "gpt_neox"], Architecture::GptNeox),
    (&["gemma"], Architecture::Gemma),
    (&["olmo"], Architecture::Olmo),
    (&["phi"], Architecture::Phi),
    (&["deepseek"], Architecture::Deepseek),
];

fn match_keywords(text: &str) -> Option<Architecture> {
    let lower = text.to_lowercase();
    ARCHITECTURE_RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|kw| lower.contains(kw)))
        .map(|(_, arch)| *arch)
}

/// Classify a model by its key, falling back to the `model_type` field of a
/// JSON config blob. Unparseable configs are ignored.
pub fn classify_architecture(model_key: &str, config: Option<&str>) -> Architecture {
    if let Some(arch) = match_keywords(model_key) {
        return arch;
    }

    config
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
        .and_then(|value| {
            value
                .get("model_type")
                .and_then(|t| t.as_str())
                .and_then(match_keywords)
        })
        .unwrap_or(Architecture::Unknown)
}
