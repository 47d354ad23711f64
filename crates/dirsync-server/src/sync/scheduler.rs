//! Periodic sync jobs, one per adapter type.
//!
//! A job ticks on a fixed interval until shutdown is signalled. Singleton
//! jobs ask their [`LeaderElection`] before every tick and stay idle on
//! standby nodes. A tick in progress always runs to completion.

use std::sync::Arc;
use std::time::Duration;

use dirsync_core::{AdapterType, LeaderElection};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::Discipline;
use crate::sync::orchestrator::{SyncOrchestrator, TickReport};
use crate::sync::status::StatusBoard;

/// Scheduled sync of one adapter type.
pub struct SyncJob {
    adapter: AdapterType,
    interval: Duration,
    leader: Option<Arc<dyn LeaderElection>>,
}

impl SyncJob {
    /// A job that runs on every node.
    pub fn concurrent(adapter: AdapterType, interval: Duration) -> Self {
        Self {
            adapter,
            interval,
            leader: None,
        }
    }

    /// A job that only runs on the node `leader` elects.
    pub fn singleton(
        adapter: AdapterType,
        interval: Duration,
        leader: Arc<dyn LeaderElection>,
    ) -> Self {
        Self {
            adapter,
            interval,
            leader: Some(leader),
        }
    }

    pub fn adapter(&self) -> AdapterType {
        self.adapter
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn discipline(&self) -> Discipline {
        if self.leader.is_some() {
            Discipline::Singleton
        } else {
            Discipline::Concurrent
        }
    }

    /// Runs a single tick, unless this node is on standby.
    pub async fn run_once(
        &self,
        orchestrator: &SyncOrchestrator,
        status: &StatusBoard,
    ) -> Option<TickReport> {
        if let Some(leader) = &self.leader {
            match leader.is_leader().await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(adapter = %self.adapter, "Not the leader; skipping tick");
                    status.record_standby(self.adapter);
                    return None;
                }
                Err(e) => {
                    warn!(adapter = %self.adapter, error = %e, "Leader election failed; skipping tick");
                    status.record_standby(self.adapter);
                    return None;
                }
            }
        }

        match orchestrator.run_tick(self.adapter).await {
            Ok(report) => {
                status.record_tick(&report);
                Some(report)
            }
            Err(e) => {
                error!(adapter = %self.adapter, error = %e, "Sync tick failed");
                status.record_error(self.adapter, e.to_string());
                None
            }
        }
    }

    /// Spawns the job loop. The first tick fires immediately.
    ///
    /// The loop exits when `shutdown` flips to `true` or its sender is
    /// dropped; a singleton job then resigns leadership.
    pub fn spawn(
        self,
        orchestrator: Arc<SyncOrchestrator>,
        status: StatusBoard,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        status.register(self.adapter, self.discipline(), self.interval.as_secs());

        tokio::spawn(async move {
            info!(
                adapter = %self.adapter,
                discipline = %self.discipline(),
                interval_secs = self.interval.as_secs(),
                "Sync job started"
            );

            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    _ = interval.tick() => {
                        self.run_once(&orchestrator, &status).await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            if let Some(leader) = &self.leader {
                if let Err(e) = leader.resign().await {
                    warn!(adapter = %self.adapter, error = %e, "Failed to resign leadership");
                }
            }
            info!(adapter = %self.adapter, "Sync job stopped");
        })
    }
}

impl std::fmt::Debug for SyncJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncJob")
            .field("adapter", &self.adapter)
            .field("interval", &self.interval)
            .field("discipline", &self.discipline())
            .finish()
    }
}
