//! Cron schedules and the scheduler capability.
//!
//! [`CronSchedule`] is parsed once at config load so a bad expression never
//! reaches [`Scheduler::schedule`]. [`CronScheduler`] drives ticks on the tokio
//! runtime; tests substitute their own [`Scheduler`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use croner::Cron;

/// Called on every tick. Must not block; spawn work instead.
pub type TickCallback = Arc<dyn Fn() + Send + Sync>;

// ---------------------------------------------------------------------------
// CronSchedule
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct CronSchedule {
    expression: String,
    cron: Arc<Cron>,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, String> {
        let cron = Cron::new(expression)
            .with_seconds_optional()
            .parse()
            .map_err(|e| format!("Invalid cron expression: {e}"))?;
        Ok(Self {
            expression: expression.to_string(),
            cron: Arc::new(cron),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first occurrence strictly after `after`, if any.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.cron.find_next_occurrence(&after, false).ok()
    }
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.expression).finish()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub trait Scheduler: Send + Sync {
    fn schedule(&self, schedule: &CronSchedule, on_tick: TickCallback) -> ScheduleHandle;
}

/// Keeps a scheduled job addressable so it can be cancelled.
#[derive(Debug, Default)]
pub struct ScheduleHandle {
    task: Option<tokio::task::JoinHandle<()>>,
}

impl ScheduleHandle {
    pub fn new(task: tokio::task::JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// A handle with no backing task, for schedulers that fire externally.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }
}

/// Tokio-backed scheduler: one sleeping task per schedule, in UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct CronScheduler;

impl Scheduler for CronScheduler {
    fn schedule(&self, schedule: &CronSchedule, on_tick: TickCallback) -> ScheduleHandle {
        let schedule = schedule.clone();
        let task = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let Some(next) = schedule.next_after(now) else {
                    tracing::warn!(
                        schedule = schedule.expression(),
                        "Cron expression has no further occurrences"
                    );
                    break;
                };
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;
                on_tick();
            }
        });
        ScheduleHandle::new(task)
    }
}
