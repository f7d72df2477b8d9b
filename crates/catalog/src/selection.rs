//! Choosing which catalog models a run tests.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt::Write;

use modelwatch_core::architecture::Architecture;

use crate::models::{available_models, CatalogSnapshot, ModelInfo};

/// Group models by architecture, groups in first-seen order.
pub fn group_by_architecture(models: &[ModelInfo]) -> Vec<(Architecture, Vec<&ModelInfo>)> {
    let mut groups: Vec<(Architecture, Vec<&ModelInfo>)> = Vec::new();
    for model in models {
        match groups.iter_mut().find(|(arch, _)| *arch == model.architecture) {
            Some((_, members)) => members.push(model),
            None => groups.push((model.architecture, vec![model])),
        }
    }
    groups
}

/// Up to `max_per_architecture` models from each architecture.
///
/// Within a group models are stably sorted by parameter count, ascending
/// when `prefer_smaller`. Unknown counts sort last ascending and first
/// descending.
pub fn select_test_subset(
    models: &[ModelInfo],
    max_per_architecture: usize,
    prefer_smaller: bool,
) -> Vec<ModelInfo> {
    let mut selected = Vec::new();
    for (_, mut members) in group_by_architecture(models) {
        members.sort_by(|a, b| {
            let ascending = compare_params(a.n_params, b.n_params);
            if prefer_smaller {
                ascending
            } else {
                ascending.reverse()
            }
        });
        selected.extend(members.into_iter().take(max_per_architecture).cloned());
    }
    selected
}

/// Unknown counts compare as larger than any known count.
fn compare_params(a: Option<u64>, b: Option<u64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Allow-listed models present in the catalog, in allow-list order.
/// Entries missing from the catalog are silently omitted.
pub fn baseline_models(all: &[ModelInfo], allow_list: &[String]) -> Vec<ModelInfo> {
    allow_list
        .iter()
        .filter_map(|key| all.iter().find(|m| &m.model_key == key).cloned())
        .collect()
}

/// Full-sweep selection: baseline models regardless of state, then up to
/// `max_extra_per_architecture` hot models per architecture outside the
/// baseline, smallest first.
pub fn select_models(
    snapshot: &CatalogSnapshot,
    allow_list: &[String],
    max_extra_per_architecture: usize,
) -> Vec<ModelInfo> {
    let all = available_models(snapshot, false);
    let mut selected = baseline_models(&all, allow_list);
    let baseline_keys: HashSet<String> = selected.iter().map(|m| m.model_key.clone()).collect();

    let extra_hot: Vec<ModelInfo> = available_models(snapshot, true)
        .into_iter()
        .filter(|m| !baseline_keys.contains(&m.model_key))
        .collect();
    let extra = select_test_subset(&extra_hot, max_extra_per_architecture, true);

    tracing::info!(
        baseline = selected.len(),
        extra = extra.len(),
        "Selected models for testing",
    );

    selected.extend(extra);
    selected
}

/// Human-readable availability table, grouped by architecture.
pub fn format_summary(models: &[ModelInfo]) -> String {
    let mut groups = group_by_architecture(models);
    groups.sort_by_key(|(arch, _)| arch.as_str());

    let mut out = String::new();
    let _ = writeln!(out, "Catalog models: {}", models.len());
    let _ = writeln!(out, "{}", "-".repeat(50));

    for (arch, members) in groups {
        let available: Vec<&&ModelInfo> = members.iter().filter(|m| m.is_available()).collect();
        let _ = writeln!(out, "{:12} : {} available", arch.as_str(), available.len());
        for model in available.iter().take(3) {
            let params = model
                .n_params
                .map(|n| format!(" ({:.1}B)", n as f64 / 1e9))
                .unwrap_or_default();
            let _ = writeln!(out, "             - {}{params}", model.short_name());
        }
        if available.len() > 3 {
            let _ = writeln!(out, "             ... and {} more", available.len() - 3);
        }
    }
    out
}
