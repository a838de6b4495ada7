//! Rule model: trenches, steps, and the conditions filters evaluate.
//!
//! Everything here is built once from a validated config and lives for the
//! process lifetime. The only mutable state is each trench's `enabled` flag,
//! which only ever goes from `true` to `false`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use regex::Regex;

use crate::config::StringConditionConfig;
use crate::cron::CronSchedule;

// ---------------------------------------------------------------------------
// Trench
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Trench {
    pub name: String,
    pub schedule: CronSchedule,
    pub steps: Vec<Step>,
    enabled: AtomicBool,
}

impl Trench {
    pub fn new(name: impl Into<String>, enabled: bool, schedule: CronSchedule, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            schedule,
            steps,
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Permanently disable the trench. Returns `true` if this call flipped it.
    pub fn disable(&self) -> bool {
        self.enabled.swap(false, Ordering::AcqRel)
    }

    /// Whether any step forks into another trench.
    pub fn has_fork(&self) -> bool {
        self.steps.iter().any(|s| matches!(s, Step::Fork { .. }))
    }
}

/// All configured trenches, addressable by name.
#[derive(Debug, Default)]
pub struct TrenchSet {
    trenches: Vec<Arc<Trench>>,
    by_name: HashMap<String, usize>,
}

impl TrenchSet {
    /// Names are assumed unique; a later duplicate shadows the earlier one by name.
    pub fn new(trenches: Vec<Trench>) -> Self {
        let trenches: Vec<Arc<Trench>> = trenches.into_iter().map(Arc::new).collect();
        let by_name = trenches
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        Self { trenches, by_name }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Trench>> {
        self.by_name.get(name).map(|&i| &self.trenches[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Trench>> {
        self.trenches.iter()
    }

    pub fn len(&self) -> usize {
        self.trenches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trenches.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Step {
    Filter(Filter),
    Action(Action),
    Fork { target: String },
}

/// A filter kind together with its condition.
#[derive(Debug, Clone)]
pub enum Filter {
    Complete(bool),
    Label(StringCondition),
    Tracker(StringCondition),
    SavePath(StringCondition),
    Name(StringCondition),
    /// Compared against progress as a percentage (`0..=100`).
    Progress(RangeCondition),
    Ratio(RangeCondition),
    SeedTime(RangeCondition),
    TimeActive(RangeCondition),
}

impl Filter {
    pub fn kind(&self) -> &'static str {
        match self {
            Filter::Complete(_) => "complete",
            Filter::Label(_) => "label",
            Filter::Tracker(_) => "tracker",
            Filter::SavePath(_) => "savePath",
            Filter::Name(_) => "name",
            Filter::Progress(_) => "progress",
            Filter::Ratio(_) => "ratio",
            Filter::SeedTime(_) => "seedTime",
            Filter::TimeActive(_) => "timeActive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Pause,
    Resume,
    Recheck,
    Reannounce,
    IncreasePriority,
    DecreasePriority,
    MaximisePriority,
    MinimisePriority,
    Delete { delete_files: bool },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Pause => "pause",
            Action::Resume => "resume",
            Action::Recheck => "recheck",
            Action::Reannounce => "reannounce",
            Action::IncreasePriority => "increasePriority",
            Action::DecreasePriority => "decreasePriority",
            Action::MaximisePriority => "maximisePriority",
            Action::MinimisePriority => "minimisePriority",
            Action::Delete { .. } => "delete",
        }
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// String predicates over one torrent property. All present sub-conditions
/// must hold. Literals are stored already lower-cased when `case_insensitive`.
#[derive(Debug, Clone)]
pub struct StringCondition {
    pub(crate) case_insensitive: bool,
    pub(crate) starts_with: Option<String>,
    pub(crate) not_starts_with: Option<String>,
    pub(crate) ends_with: Option<String>,
    pub(crate) not_ends_with: Option<String>,
    pub(crate) includes: Option<String>,
    pub(crate) not_includes: Option<String>,
    pub(crate) pattern: Option<Regex>,
}

impl StringCondition {
    pub fn case_insensitive(&self) -> bool {
        self.case_insensitive
    }
}

/// Why a [`StringConditionConfig`] could not become a [`StringCondition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringConditionError {
    /// Offending key, `None` when the condition as a whole is at fault.
    pub field: Option<&'static str>,
    pub message: String,
}

impl TryFrom<&StringConditionConfig> for StringCondition {
    type Error = StringConditionError;

    fn try_from(config: &StringConditionConfig) -> Result<Self, Self::Error> {
        if config.starts_with.is_none()
            && config.includes.is_none()
            && config.ends_with.is_none()
            && config.pattern.is_none()
        {
            return Err(StringConditionError {
                field: None,
                message: "At least one string condition must be provided".into(),
            });
        }

        let pattern = config
            .pattern
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| StringConditionError {
                field: Some("match"),
                message: format!("String must be a valid regular expression: {e}"),
            })?;

        let fold = |value: &Option<String>| {
            value.as_ref().map(|v| {
                if config.case_insensitive {
                    v.to_lowercase()
                } else {
                    v.clone()
                }
            })
        };

        Ok(Self {
            case_insensitive: config.case_insensitive,
            starts_with: fold(&config.starts_with),
            not_starts_with: fold(&config.not_starts_with),
            ends_with: fold(&config.ends_with),
            not_ends_with: fold(&config.not_ends_with),
            includes: fold(&config.includes),
            not_includes: fold(&config.not_includes),
            pattern,
        })
    }
}

/// Inclusive numeric bounds. Each bound is checked whenever present,
/// including a bound of `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RangeCondition {
    pub gte: Option<f64>,
    pub lte: Option<f64>,
}
