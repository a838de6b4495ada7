//! Trench runner: walks one trench's steps for one torrent on one client.
//!
//! Filters stop the walk with a skip, actions call the client, and forks run
//! the target trench to completion before the parent carries on. Any error
//! during a top-level run disables the owning trench.

use std::sync::Arc;

use tracing::Instrument;
use trench_client::TorrentClient;
use trench_types::{Result, Torrent, TrenchError};

use crate::condition::{evaluate_filter, FilterVerdict};
use crate::model::{Action, Step, Trench, TrenchSet};

/// How a top-level run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step passed.
    Completed,
    /// A filter stopped the run, or the trench was disabled.
    Skipped(String),
    /// An error stopped the run and the trench is now disabled.
    Failed(String),
}

/// Result of evaluating a single step.
enum StepFlow<'a> {
    Continue,
    Skip(String),
    Fork(&'a str),
}

pub struct TrenchRunner {
    trenches: Arc<TrenchSet>,
}

impl TrenchRunner {
    pub fn new(trenches: Arc<TrenchSet>) -> Self {
        Self { trenches }
    }

    pub fn trenches(&self) -> &Arc<TrenchSet> {
        &self.trenches
    }

    /// Run `trench` as a top-level invocation. Never returns an error: failures
    /// are logged and disable `trench`.
    pub async fn run(&self, trench: &Trench, torrent: &Torrent, client: &dyn TorrentClient) -> RunOutcome {
        let span = tracing::info_span!(
            "trench",
            trench = %trench.name,
            fork = false,
            client = client.identity(),
        );
        async {
            if !trench.is_enabled() {
                let reason = format!("Trench {} is disabled", trench.name);
                tracing::debug!("Skipped trench: {reason} - {}", torrent.name);
                return RunOutcome::Skipped(reason);
            }

            match self.run_steps(trench, torrent, client).await {
                Ok(RunOutcome::Skipped(reason)) => {
                    tracing::debug!("Skipped trench: {reason} - {}", torrent.name);
                    RunOutcome::Skipped(reason)
                }
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, torrent = %torrent.id, "Uncaught error running trench");
                    if trench.disable() {
                        tracing::warn!("Trench {} has been disabled due to a previous error", trench.name);
                    }
                    RunOutcome::Failed(e.to_string())
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_steps(&self, trench: &Trench, torrent: &Torrent, client: &dyn TorrentClient) -> Result<RunOutcome> {
        for step in &trench.steps {
            match execute_step(step, torrent, client).await? {
                StepFlow::Continue => {}
                StepFlow::Skip(reason) => return Ok(RunOutcome::Skipped(reason)),
                StepFlow::Fork(target) => self.run_fork(target, torrent, client).await?,
            }
        }
        Ok(RunOutcome::Completed)
    }

    /// Run a fork target regardless of its `enabled` flag. A skip inside the
    /// target ends the fork only; the parent continues.
    async fn run_fork(&self, target: &str, torrent: &Torrent, client: &dyn TorrentClient) -> Result<()> {
        let forked = self
            .trenches
            .get(target)
            .ok_or_else(|| TrenchError::Invariant(format!("Fork target '{target}' does not exist")))?;

        tracing::info!("Forking trench {} for torrent {}", forked.name, torrent.name);

        let span = tracing::info_span!(
            "trench",
            trench = %forked.name,
            fork = true,
            client = client.identity(),
        );
        async {
            for step in &forked.steps {
                match execute_step(step, torrent, client).await? {
                    StepFlow::Continue => {}
                    StepFlow::Skip(reason) => {
                        tracing::debug!("Skipped trench: {reason} - {}", torrent.name);
                        return Ok(());
                    }
                    StepFlow::Fork(nested) => {
                        return Err(TrenchError::Invariant(format!(
                            "Forked trench '{}' attempted to fork '{nested}'",
                            forked.name
                        )));
                    }
                }
            }
            Ok(())
        }
        .instrument(span)
        .await
    }
}

async fn execute_step<'a>(step: &'a Step, torrent: &Torrent, client: &dyn TorrentClient) -> Result<StepFlow<'a>> {
    match step {
        Step::Filter(filter) => Ok(match evaluate_filter(filter, torrent) {
            FilterVerdict::Matched => StepFlow::Continue,
            FilterVerdict::Skipped(reason) => StepFlow::Skip(reason),
        }),
        Step::Action(action) => {
            tracing::info!("Running action {} on torrent {}", action.name(), torrent.name);
            perform_action(*action, &torrent.id, client).await?;
            Ok(StepFlow::Continue)
        }
        Step::Fork { target } => Ok(StepFlow::Fork(target)),
    }
}

async fn perform_action(action: Action, id: &str, client: &dyn TorrentClient) -> Result<()> {
    match action {
        Action::Pause => client.pause(id).await,
        Action::Resume => client.resume(id).await,
        Action::Recheck => client.recheck(id).await,
        Action::Reannounce => client.reannounce(id).await,
        Action::IncreasePriority => client.increase_priority(id).await,
        Action::DecreasePriority => client.decrease_priority(id).await,
        Action::MaximisePriority => client.maximise_priority(id).await,
        Action::MinimisePriority => client.minimise_priority(id).await,
        Action::Delete { delete_files } => client.delete(id, delete_files).await,
    }
}
