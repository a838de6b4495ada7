//! Config document: serde shapes, loading, and conversion into the rule model.
//!
//! Parsing happens in two passes. serde rejects structurally wrong JSON, then
//! [`ConfigFile::validate`] collects every semantic problem (cron, regex,
//! bounds, URLs, names, fork graph) before building anything. Loading is
//! all-or-nothing.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use trench_client::Connection;
use trench_types::{issue_path, ConfigIssue, PathSegment, Result, TrenchError};

use crate::cron::CronSchedule;
use crate::model::{Action, Filter, RangeCondition, Step, StringCondition, Trench, TrenchSet};
use crate::validation::{check_fork_graph, check_unique_names};

pub const CONFIG_FILE_NAME: &str = "torrent-trench.json";
pub const DEFAULT_SCHEDULE: &str = "*/30 * * * *";

const PROGRESS_MAX: f64 = 100.0;

// ---------------------------------------------------------------------------
// Document shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default = "default_version")]
    pub version: u32,
    pub connections: Vec<Connection>,
    pub trenches: Vec<TrenchConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrenchConfig {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_schedule")]
    pub schedule: String,
    pub trench: Vec<StepConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum StepConfig {
    Filter(FilterConfig),
    Action(ActionConfig),
    Fork { fork: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filter", content = "condition", rename_all = "camelCase", deny_unknown_fields)]
pub enum FilterConfig {
    Complete(bool),
    Label(StringConditionConfig),
    Tracker(StringConditionConfig),
    SavePath(StringConditionConfig),
    Name(StringConditionConfig),
    Progress(RangeConditionConfig),
    Ratio(RangeConditionConfig),
    SeedTime(RangeConditionConfig),
    TimeActive(RangeConditionConfig),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", deny_unknown_fields)]
pub enum ActionConfig {
    Pause,
    Resume,
    Recheck,
    Reannounce,
    IncreasePriority,
    DecreasePriority,
    MaximisePriority,
    MinimisePriority,
    Delete {
        #[serde(default)]
        options: Option<DeleteOptions>,
    },
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct DeleteOptions {
    #[serde(default)]
    pub delete_files: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct StringConditionConfig {
    #[serde(default)]
    pub case_insensitive: bool,
    pub starts_with: Option<String>,
    pub not_starts_with: Option<String>,
    pub ends_with: Option<String>,
    pub not_ends_with: Option<String>,
    pub includes: Option<String>,
    pub not_includes: Option<String>,
    #[serde(rename = "match")]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RangeConditionConfig {
    pub gte: Option<f64>,
    pub lte: Option<f64>,
}

fn default_version() -> u32 {
    1
}

fn default_schedule() -> String {
    DEFAULT_SCHEDULE.to_string()
}

// ---------------------------------------------------------------------------
// ValidatedConfig
// ---------------------------------------------------------------------------

/// A config that passed every check, with trenches built.
#[derive(Debug)]
pub struct ValidatedConfig {
    pub version: u32,
    pub connections: Vec<Connection>,
    pub trenches: Arc<TrenchSet>,
}

/// Read and validate `torrent-trench.json` from `dir`.
pub fn load_config(dir: &Path) -> Result<ValidatedConfig> {
    let path = dir.join(CONFIG_FILE_NAME);
    tracing::debug!("Attempting to read config json at {}", path.display());
    let source = std::fs::read_to_string(&path)?;
    parse_config(&source)
}

/// Parse and validate a config document.
pub fn parse_config(source: &str) -> Result<ValidatedConfig> {
    let document: Value = serde_json::from_str(source)
        .map_err(|e| TrenchError::Validation(vec![ConfigIssue::new(Vec::new(), e.to_string())]))?;

    let unrecognised = unrecognised_step_keys(&document);
    if !unrecognised.is_empty() {
        return Err(TrenchError::Validation(unrecognised));
    }

    let file: ConfigFile = serde_path_to_error::deserialize(document).map_err(|e| {
        let path = issue_path_of(e.path());
        TrenchError::Validation(vec![ConfigIssue::new(path, e.into_inner().to_string())])
    })?;
    file.validate()
}

/// Translate the location of a serde failure into issue path segments.
fn issue_path_of(path: &serde_path_to_error::Path) -> Vec<PathSegment> {
    path.iter()
        .filter_map(|segment| match segment {
            serde_path_to_error::Segment::Seq { index } => Some(PathSegment::Index(*index)),
            serde_path_to_error::Segment::Map { key } => Some(PathSegment::Key(key.clone())),
            _ => None,
        })
        .collect()
}

/// Every key on a step object that its shape does not define. Steps with an
/// unknown `type` are left to serde.
fn unrecognised_step_keys(document: &Value) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();
    let Some(trenches) = document.get("trenches").and_then(Value::as_array) else {
        return issues;
    };

    for (trench_index, trench) in trenches.iter().enumerate() {
        let Some(steps) = trench.get("trench").and_then(Value::as_array) else {
            continue;
        };
        for (step_index, step) in steps.iter().enumerate() {
            let Some(step) = step.as_object() else { continue };
            let Some(allowed) = step_keys(step) else { continue };
            for key in step.keys().filter(|k| !allowed.iter().any(|a| *a == k.as_str())) {
                issues.push(ConfigIssue::new(
                    issue_path!["trenches", trench_index, "trench", step_index, key.as_str()],
                    format!("Unrecognized key in object: '{key}'"),
                ));
            }
        }
    }
    issues
}

const FILTER_KEYS: &[&str] = &["type", "filter", "condition"];
const FORK_KEYS: &[&str] = &["type", "fork"];
const ACTION_KEYS: &[&str] = &["type", "action"];
const DELETE_KEYS: &[&str] = &["type", "action", "options"];

/// `options` belongs to `delete` alone.
fn step_keys(step: &Map<String, Value>) -> Option<&'static [&'static str]> {
    let action = step.get("action").and_then(Value::as_str);
    match step.get("type").and_then(Value::as_str)? {
        "filter" => Some(FILTER_KEYS),
        "fork" => Some(FORK_KEYS),
        "action" if action == Some("delete") => Some(DELETE_KEYS),
        "action" => Some(ACTION_KEYS),
        _ => None,
    }
}

impl ConfigFile {
    pub fn validate(self) -> Result<ValidatedConfig> {
        let mut issues = Vec::new();

        for (index, connection) in self.connections.iter().enumerate() {
            if let Some(problem) = connection.url_problem() {
                issues.push(ConfigIssue::new(issue_path!["connections", index, "url"], problem));
            }
        }

        let mut trenches = Vec::with_capacity(self.trenches.len());
        for (index, trench) in self.trenches.iter().enumerate() {
            if let Some(built) = build_trench(index, trench, &mut issues) {
                trenches.push(built);
            }
        }

        let cross_checks = check_unique_names(&self.trenches)
            .into_iter()
            .chain(check_fork_graph(&self.trenches));
        for issue in cross_checks {
            let mut path = issue_path!["trenches"];
            path.extend(issue.path);
            issues.push(ConfigIssue::new(path, issue.message));
        }

        if !issues.is_empty() {
            return Err(TrenchError::Validation(issues));
        }

        let trenches = TrenchSet::new(trenches);
        tracing::debug!(
            "Loaded trenches: {}",
            trenches.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ")
        );

        Ok(ValidatedConfig {
            version: self.version,
            connections: self.connections,
            trenches: Arc::new(trenches),
        })
    }
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

fn child(path: &[PathSegment], segment: impl Into<PathSegment>) -> Vec<PathSegment> {
    let mut path = path.to_vec();
    path.push(segment.into());
    path
}

fn build_trench(index: usize, config: &TrenchConfig, issues: &mut Vec<ConfigIssue>) -> Option<Trench> {
    let base = issue_path!["trenches", index];
    let before = issues.len();

    let name = config.name.trim();
    if name.is_empty() {
        issues.push(ConfigIssue::new(child(&base, "name"), "Trench name must not be empty"));
    }

    let schedule = match CronSchedule::parse(&config.schedule) {
        Ok(schedule) => Some(schedule),
        Err(message) => {
            issues.push(ConfigIssue::new(child(&base, "schedule"), message));
            None
        }
    };

    let steps_path = child(&base, "trench");
    let steps: Vec<Step> = config
        .trench
        .iter()
        .enumerate()
        .filter_map(|(step_index, step)| build_step(&child(&steps_path, step_index), step, issues))
        .collect();

    if issues.len() != before {
        return None;
    }
    Some(Trench::new(name, config.enabled, schedule?, steps))
}

fn build_step(path: &[PathSegment], config: &StepConfig, issues: &mut Vec<ConfigIssue>) -> Option<Step> {
    match config {
        StepConfig::Filter(filter) => build_filter(path, filter, issues).map(Step::Filter),
        StepConfig::Action(action) => Some(Step::Action(build_action(action))),
        StepConfig::Fork { fork } => Some(Step::Fork {
            target: fork.trim().to_string(),
        }),
    }
}

fn build_action(config: &ActionConfig) -> Action {
    match config {
        ActionConfig::Pause => Action::Pause,
        ActionConfig::Resume => Action::Resume,
        ActionConfig::Recheck => Action::Recheck,
        ActionConfig::Reannounce => Action::Reannounce,
        ActionConfig::IncreasePriority => Action::IncreasePriority,
        ActionConfig::DecreasePriority => Action::DecreasePriority,
        ActionConfig::MaximisePriority => Action::MaximisePriority,
        ActionConfig::MinimisePriority => Action::MinimisePriority,
        ActionConfig::Delete { options } => Action::Delete {
            delete_files: options.is_some_and(|o| o.delete_files),
        },
    }
}

fn build_filter(path: &[PathSegment], config: &FilterConfig, issues: &mut Vec<ConfigIssue>) -> Option<Filter> {
    let condition_path = child(path, "condition");
    let string = |c: &StringConditionConfig, issues: &mut Vec<ConfigIssue>| {
        string_condition(&condition_path, c, issues)
    };
    let range = |c: &RangeConditionConfig, max: Option<f64>, issues: &mut Vec<ConfigIssue>| {
        range_condition(&condition_path, c, max, issues)
    };

    match config {
        FilterConfig::Complete(expected) => Some(Filter::Complete(*expected)),
        FilterConfig::Label(c) => string(c, issues).map(Filter::Label),
        FilterConfig::Tracker(c) => string(c, issues).map(Filter::Tracker),
        FilterConfig::SavePath(c) => string(c, issues).map(Filter::SavePath),
        FilterConfig::Name(c) => string(c, issues).map(Filter::Name),
        FilterConfig::Progress(c) => range(c, Some(PROGRESS_MAX), issues).map(Filter::Progress),
        FilterConfig::Ratio(c) => range(c, None, issues).map(Filter::Ratio),
        FilterConfig::SeedTime(c) => range(c, None, issues).map(Filter::SeedTime),
        FilterConfig::TimeActive(c) => range(c, None, issues).map(Filter::TimeActive),
    }
}

fn string_condition(
    path: &[PathSegment],
    config: &StringConditionConfig,
    issues: &mut Vec<ConfigIssue>,
) -> Option<StringCondition> {
    match StringCondition::try_from(config) {
        Ok(condition) => Some(condition),
        Err(e) => {
            let path = match e.field {
                Some(field) => child(path, field),
                None => path.to_vec(),
            };
            issues.push(ConfigIssue::new(path, e.message));
            None
        }
    }
}

fn range_condition(
    path: &[PathSegment],
    config: &RangeConditionConfig,
    max: Option<f64>,
    issues: &mut Vec<ConfigIssue>,
) -> Option<RangeCondition> {
    let before = issues.len();
    for (key, bound) in [("gte", config.gte), ("lte", config.lte)] {
        let Some(bound) = bound else { continue };
        if bound < 0.0 {
            issues.push(ConfigIssue::new(
                child(path, key),
                "Number must be greater than or equal to 0",
            ));
        } else if let Some(max) = max.filter(|max| bound > *max) {
            issues.push(ConfigIssue::new(
                child(path, key),
                format!("Number must be less than or equal to {max}"),
            ));
        }
    }

    (issues.len() == before).then_some(RangeCondition {
        gte: config.gte,
        lte: config.lte,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issues_of(value: serde_json::Value) -> Vec<ConfigIssue> {
        match parse_config(&value.to_string()) {
            Err(TrenchError::Validation(issues)) => issues,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    fn document(trenches: serde_json::Value) -> serde_json::Value {
        json!({
            "connections": [{ "client": "qbit", "url": "http://localhost:8080" }],
            "trenches": trenches
        })
    }

    #[test]
    fn defaults_are_applied() {
        let config = parse_config(
            &document(json!([{ "name": "  tidy  ", "trench": [] }])).to_string(),
        )
        .unwrap();
        assert_eq!(config.version, 1);
        let trench = config.trenches.get("tidy").expect("name is trimmed");
        assert!(!trench.is_enabled());
        assert_eq!(trench.schedule.expression(), DEFAULT_SCHEDULE);
    }

    #[test]
    fn every_step_shape_parses() {
        let config = parse_config(
            &document(json!([
                {
                    "name": "all",
                    "enabled": true,
                    "schedule": "0 * * * *",
                    "trench": [
                        { "type": "filter", "filter": "complete", "condition": true },
                        { "type": "filter", "filter": "label", "condition": { "includes": "tv" } },
                        { "type": "filter", "filter": "tracker", "condition": { "match": "^udp://", "caseInsensitive": true } },
                        { "type": "filter", "filter": "savePath", "condition": { "startsWith": "/data" } },
                        { "type": "filter", "filter": "name", "condition": { "endsWith": ".mkv", "notIncludes": "sample" } },
                        { "type": "filter", "filter": "progress", "condition": { "gte": 0, "lte": 100 } },
                        { "type": "filter", "filter": "ratio", "condition": { "gte": 2 } },
                        { "type": "filter", "filter": "seedTime", "condition": { "gte": 86400 } },
                        { "type": "filter", "filter": "timeActive", "condition": { "lte": 3600.5 } },
                        { "type": "action", "action": "pause" },
                        { "type": "action", "action": "resume" },
                        { "type": "action", "action": "recheck" },
                        { "type": "action", "action": "reannounce" },
                        { "type": "action", "action": "increasePriority" },
                        { "type": "action", "action": "decreasePriority" },
                        { "type": "action", "action": "maximisePriority" },
                        { "type": "action", "action": "minimisePriority" },
                        { "type": "action", "action": "delete" },
                        { "type": "action", "action": "delete", "options": { "deleteFiles": true } },
                        { "type": "fork", "fork": " other " }
                    ]
                },
                { "name": "other", "trench": [] }
            ]))
            .to_string(),
        )
        .unwrap();

        let trench = config.trenches.get("all").unwrap();
        assert!(trench.is_enabled());
        assert_eq!(trench.steps.len(), 20);
        assert!(matches!(
            trench.steps[17],
            Step::Action(Action::Delete { delete_files: false })
        ));
        assert!(matches!(
            trench.steps[18],
            Step::Action(Action::Delete { delete_files: true })
        ));
        match &trench.steps[19] {
            Step::Fork { target } => assert_eq!(target, "other"),
            other => panic!("expected fork, got {other:?}"),
        }
        match &trench.steps[5] {
            Step::Filter(Filter::Progress(r)) => {
                assert_eq!(r.gte, Some(0.0));
                assert_eq!(r.lte, Some(100.0));
            }
            other => panic!("expected progress filter, got {other:?}"),
        }
    }

    #[test]
    fn unknown_step_type_is_rejected() {
        let issues = issues_of(document(json!([
            { "name": "x", "trench": [{ "type": "transcode" }] }
        ])));
        assert_eq!(issues.len(), 1);
        assert!(
            issues[0].dotted_path().starts_with("trenches.0.trench.0"),
            "got {}",
            issues[0].dotted_path()
        );
    }

    #[test]
    fn wrong_value_type_reports_its_path() {
        let issues = issues_of(document(json!([{ "name": "x", "enabled": "yes", "trench": [] }])));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].dotted_path(), "trenches.0.enabled");
    }

    #[test]
    fn unknown_filter_kind_reports_step_path() {
        let issues = issues_of(document(json!([
            { "name": "x", "trench": [{ "type": "filter", "filter": "size", "condition": {} }] }
        ])));
        assert_eq!(issues.len(), 1);
        assert!(issues[0].dotted_path().starts_with("trenches.0.trench.0"));
    }

    #[test]
    fn unrecognised_step_keys_are_rejected_with_paths() {
        let issues = issues_of(document(json!([{
            "name": "x",
            "trench": [
                { "type": "filter", "filter": "ratio", "condition": { "gte": 1 }, "bogus": 1 },
                { "type": "action", "action": "pause", "options": { "deleteFiles": true } },
                { "type": "action", "action": "delete", "typo": true },
                { "type": "action", "action": "delete", "option": { "deleteFiles": true } },
                { "type": "fork", "fork": "x", "extra": 1 }
            ]
        }])));
        let found: Vec<(String, String)> = issues
            .iter()
            .map(|i| (i.dotted_path(), i.message.clone()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("trenches.0.trench.0.bogus".into(), "Unrecognized key in object: 'bogus'".into()),
                ("trenches.0.trench.1.options".into(), "Unrecognized key in object: 'options'".into()),
                ("trenches.0.trench.2.typo".into(), "Unrecognized key in object: 'typo'".into()),
                ("trenches.0.trench.3.option".into(), "Unrecognized key in object: 'option'".into()),
                ("trenches.0.trench.4.extra".into(), "Unrecognized key in object: 'extra'".into()),
            ]
        );
    }

    #[test]
    fn step_shapes_are_strict_without_the_key_pass() {
        let step = |value: serde_json::Value| serde_json::from_value::<StepConfig>(value);
        assert!(step(json!({ "type": "fork", "fork": "x", "extra": 1 })).is_err());
        assert!(step(json!({ "type": "filter", "filter": "ratio", "condition": {}, "bogus": 1 })).is_err());
        assert!(step(json!({ "type": "action", "action": "delete", "typo": true })).is_err());
        assert!(step(json!({ "type": "action", "action": "delete", "options": { "deleteFiles": true } })).is_ok());
    }

    #[test]
    fn unknown_top_level_field_is_rejected() {
        let mut doc = document(json!([]));
        doc["extra"] = json!(true);
        assert_eq!(issues_of(doc).len(), 1);
    }

    #[test]
    fn semantic_issues_are_collected_with_paths() {
        let mut doc = document(json!([
            {
                "name": "bad",
                "schedule": "every tuesday",
                "trench": [
                    { "type": "filter", "filter": "name", "condition": { "notIncludes": "x" } },
                    { "type": "filter", "filter": "tracker", "condition": { "match": "([" } },
                    { "type": "filter", "filter": "progress", "condition": { "gte": 150 } },
                    { "type": "filter", "filter": "ratio", "condition": { "lte": -1 } }
                ]
            }
        ]));
        doc["connections"][0]["url"] = json!("localhost");

        let paths: Vec<String> = issues_of(doc).iter().map(ConfigIssue::dotted_path).collect();
        assert_eq!(
            paths,
            vec![
                "connections.0.url",
                "trenches.0.schedule",
                "trenches.0.trench.0.condition",
                "trenches.0.trench.1.condition.match",
                "trenches.0.trench.2.condition.gte",
                "trenches.0.trench.3.condition.lte",
            ]
        );
    }

    #[test]
    fn duplicate_names_fail_atomically() {
        let issues = issues_of(document(json!([
            { "name": "x", "enabled": true, "trench": [] },
            { "name": "x", "enabled": true, "trench": [] }
        ])));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].dotted_path(), "trenches");
        assert!(issues[0].message.contains("must be unique"));
    }

    #[test]
    fn fork_issues_are_prefixed_with_trenches() {
        let issues = issues_of(document(json!([
            { "name": "loop", "trench": [{ "type": "fork", "fork": "loop" }] }
        ])));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].dotted_path(), "trenches.0.trench.0.fork");
    }

    #[test]
    fn empty_name_is_rejected() {
        let issues = issues_of(document(json!([{ "name": "   ", "trench": [] }])));
        assert_eq!(issues[0].dotted_path(), "trenches.0.name");
    }

    #[test]
    fn load_config_reads_file_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            document(json!([{ "name": "a", "trench": [] }])).to_string(),
        )
        .unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.trenches.len(), 1);
        assert_eq!(config.connections[0].url, "http://localhost:8080");
    }

    #[test]
    fn load_config_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_config(dir.path()), Err(TrenchError::Io(_))));
    }
}
