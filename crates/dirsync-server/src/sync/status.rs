//! Last known state of every scheduled sync job, served by `/status`.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use dirsync_core::AdapterType;
use serde::Serialize;
use time::OffsetDateTime;

use crate::config::Discipline;
use crate::sync::orchestrator::{TickReport, TickSummary};

/// Snapshot of one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub adapter: AdapterType,
    pub discipline: Discipline,
    pub interval_secs: u64,
    /// Whether this node led the last singleton tick. Always `true` for
    /// concurrent jobs.
    pub leading: bool,
    pub ticks: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_tick_at: Option<OffsetDateTime>,
    pub last_tick: Option<TickSummary>,
    pub last_error: Option<String>,
}

/// Shared, cheaply clonable job status table.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    jobs: Arc<RwLock<BTreeMap<AdapterType, JobStatus>>>,
}

impl StatusBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, adapter: AdapterType, discipline: Discipline, interval_secs: u64) {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        jobs.insert(
            adapter,
            JobStatus {
                adapter,
                discipline,
                interval_secs,
                leading: discipline == Discipline::Concurrent,
                ticks: 0,
                last_tick_at: None,
                last_tick: None,
                last_error: None,
            },
        );
    }

    pub fn record_standby(&self, adapter: AdapterType) {
        self.update(adapter, |job| job.leading = false);
    }

    pub fn record_tick(&self, report: &TickReport) {
        self.update(report.adapter, |job| {
            job.leading = true;
            job.ticks += 1;
            job.last_tick_at = Some(report.finished_at);
            job.last_tick = Some(report.summary());
            job.last_error = None;
        });
    }

    pub fn record_error(&self, adapter: AdapterType, error: impl Into<String>) {
        let error = error.into();
        self.update(adapter, |job| {
            job.ticks += 1;
            job.last_tick_at = Some(OffsetDateTime::now_utc());
            job.last_error = Some(error);
        });
    }

    #[must_use]
    pub fn get(&self, adapter: AdapterType) -> Option<JobStatus> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&adapter)
            .cloned()
    }

    /// Every registered job, in scheduling order.
    #[must_use]
    pub fn jobs(&self) -> Vec<JobStatus> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn update(&self, adapter: AdapterType, f: impl FnOnce(&mut JobStatus)) {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(job) = jobs.get_mut(&adapter) {
            f(job);
        }
    }
}
