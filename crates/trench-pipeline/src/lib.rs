//! Trench rule engine: config validation, condition evaluation, the runner,
//! and the scheduling fan-out.
//!
//! A trench is a named, ordered list of filter, action and fork steps applied
//! to one torrent on one client. Configs are validated once at load; from then
//! on the rule model is immutable apart from each trench's `enabled` flag.

pub mod condition;
pub mod config;
pub mod cron;
pub mod model;
pub mod runner;
pub mod scheduler;
pub mod validation;

pub use condition::{evaluate_filter, evaluate_range, evaluate_string, FilterVerdict};
pub use config::{
    load_config, parse_config, ConfigFile, TrenchConfig, ValidatedConfig, CONFIG_FILE_NAME,
    DEFAULT_SCHEDULE,
};
pub use cron::{CronSchedule, CronScheduler, ScheduleHandle, Scheduler, TickCallback};
pub use model::{Action, Filter, RangeCondition, Step, StringCondition, Trench, TrenchSet};
pub use runner::{RunOutcome, TrenchRunner};
pub use scheduler::{TickReport, TrenchScheduler};
pub use validation::{check_fork_graph, check_unique_names};
