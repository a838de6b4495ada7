//! Scheduling fan-out: per tick, fetch every client and run each torrent
//! through the ticking trench.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::Instrument;
use trench_client::{ClientManager, TorrentClient};
use trench_types::Torrent;

use crate::cron::{ScheduleHandle, Scheduler};
use crate::model::Trench;
use crate::runner::{RunOutcome, TrenchRunner};

/// Summary of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickReport {
    /// The trench was disabled before the tick started.
    Disabled,
    /// A client could not be listed; nothing ran.
    FetchFailed(String),
    Ran {
        completed: usize,
        skipped: usize,
        failed: usize,
    },
}

pub struct TrenchScheduler {
    runner: Arc<TrenchRunner>,
    clients: ClientManager,
}

impl TrenchScheduler {
    pub fn new(runner: Arc<TrenchRunner>, clients: ClientManager) -> Self {
        Self { runner, clients }
    }

    /// Register every enabled trench with `scheduler`. Disabled trenches are
    /// never scheduled.
    pub fn schedule_all(self: &Arc<Self>, scheduler: &dyn Scheduler) -> Vec<ScheduleHandle> {
        let mut handles = Vec::new();
        for trench in self.runner.trenches().iter() {
            if !trench.is_enabled() {
                tracing::debug!("Trench {} is disabled, not scheduling", trench.name);
                continue;
            }
            tracing::info!(
                "Scheduling trench {} to run on '{}'",
                trench.name,
                trench.schedule.expression()
            );

            let this = Arc::clone(self);
            let trench = Arc::clone(trench);
            let schedule = trench.schedule.clone();
            let on_tick = Arc::new(move || {
                let this = Arc::clone(&this);
                let trench = Arc::clone(&trench);
                tokio::spawn(async move {
                    this.tick(trench).await;
                });
            });
            handles.push(scheduler.schedule(&schedule, on_tick));
        }
        handles
    }

    /// Run one tick of `trench` across every client.
    pub async fn tick(&self, trench: Arc<Trench>) -> TickReport {
        let span = tracing::info_span!(
            "tick",
            tick = %uuid::Uuid::new_v4(),
            trench = %trench.name,
        );
        self.tick_inner(trench).instrument(span).await
    }

    async fn tick_inner(&self, trench: Arc<Trench>) -> TickReport {
        if !trench.is_enabled() {
            tracing::debug!("Trench {} is disabled, skipping tick", trench.name);
            return TickReport::Disabled;
        }

        let listings = match self.fetch_all().await {
            Ok(listings) => listings,
            Err(message) => {
                tracing::error!("Failed to fetch torrents: {message}");
                return TickReport::FetchFailed(message);
            }
        };

        let mut runs = JoinSet::new();
        for (client, torrents) in listings {
            for torrent in torrents {
                let runner = Arc::clone(&self.runner);
                let trench = Arc::clone(&trench);
                let client = Arc::clone(&client);
                runs.spawn(
                    async move { runner.run(&trench, &torrent, client.as_ref()).await }.in_current_span(),
                );
            }
        }

        let (mut completed, mut skipped, mut failed) = (0, 0, 0);
        while let Some(joined) = runs.join_next().await {
            match joined {
                Ok(RunOutcome::Completed) => completed += 1,
                Ok(RunOutcome::Skipped(_)) => skipped += 1,
                Ok(RunOutcome::Failed(_)) => failed += 1,
                Err(e) => {
                    tracing::error!("Trench run task failed: {e}");
                    failed += 1;
                }
            }
        }

        tracing::debug!(completed, skipped, failed, "Tick finished");
        TickReport::Ran {
            completed,
            skipped,
            failed,
        }
    }

    /// List every client concurrently. The first failure wins.
    async fn fetch_all(&self) -> Result<Vec<(Arc<dyn TorrentClient>, Vec<Torrent>)>, String> {
        let mut fetches = JoinSet::new();
        for (index, client) in self.clients.clients().iter().enumerate() {
            let client = Arc::clone(client);
            fetches.spawn(
                async move {
                    let listed = client.list_torrents().await;
                    (index, client, listed)
                }
                .in_current_span(),
            );
        }

        let mut listings = Vec::with_capacity(fetches.len());
        while let Some(joined) = fetches.join_next().await {
            let (index, client, listed) = joined.map_err(|e| e.to_string())?;
            let torrents = listed.map_err(|e| e.to_string())?;
            tracing::debug!(client = client.identity(), count = torrents.len(), "Fetched torrents");
            listings.push((index, client, torrents));
        }
        listings.sort_by_key(|(index, _, _)| *index);
        Ok(listings.into_iter().map(|(_, c, t)| (c, t)).collect())
    }
}
