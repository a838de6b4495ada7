//! Whole-config checks that span trenches: name uniqueness and the fork graph.
//!
//! Paths are relative to the `trenches` array, so a fork issue on the first
//! step of the first trench reads `[0, "trench", 0, "fork"]`.

use std::collections::{HashMap, HashSet};

use trench_types::{issue_path, ConfigIssue};

use crate::config::{StepConfig, TrenchConfig};

/// Report every trench name used more than once.
pub fn check_unique_names(trenches: &[TrenchConfig]) -> Vec<ConfigIssue> {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    let mut issues = Vec::new();

    for trench in trenches {
        let name = trench.name.trim();
        if !seen.insert(name) && reported.insert(name) {
            issues.push(ConfigIssue::new(
                Vec::new(),
                format!("Trench names must be unique, '{name}' is defined more than once"),
            ));
        }
    }
    issues
}

/// Every fork must name an existing trench other than its own, and that
/// trench must not fork again.
pub fn check_fork_graph(trenches: &[TrenchConfig]) -> Vec<ConfigIssue> {
    let defined: HashMap<&str, &TrenchConfig> =
        trenches.iter().map(|t| (t.name.trim(), t)).collect();
    let mut issues = Vec::new();

    for (trench_index, trench) in trenches.iter().enumerate() {
        for (step_index, step) in trench.trench.iter().enumerate() {
            let StepConfig::Fork { fork } = step else {
                continue;
            };
            let target = fork.trim();
            let path = issue_path![trench_index, "trench", step_index, "fork"];

            if target == trench.name.trim() {
                issues.push(ConfigIssue::new(
                    path,
                    "Trench fork references itself, recursive trenches are not supported",
                ));
                continue;
            }

            let Some(forked) = defined.get(target) else {
                let mut listed = HashSet::new();
                let names: Vec<&str> = trenches
                    .iter()
                    .map(|t| t.name.trim())
                    .filter(|n| listed.insert(*n))
                    .collect();
                issues.push(ConfigIssue::new(
                    path,
                    format!(
                        "Unrecognised trench name, valid options are '{}'",
                        names.join("' | '")
                    ),
                ));
                continue;
            };

            if forked.trench.iter().any(|s| matches!(s, StepConfig::Fork { .. })) {
                issues.push(ConfigIssue::new(
                    path,
                    format!("Forked trench '{target}' should not fork another trench (no sub forks)"),
                ));
            }
        }
    }
    issues
}
