//! One sync tick: every eligible provider of an adapter type, one pass each.
//!
//! A pass gathers the remote directory, loads local state under the
//! provider lock, plans and applies the diff and records the outcome on
//! the provider. Failures are recorded and never abort the rest of the
//! tick.

use std::sync::Arc;

use dirsync_adapters::AdapterRegistry;
use dirsync_core::{
    AdapterType, ApplyOptions, DirectoryAdapter, DynStore, EffectCounts, FailureOutcome,
    FailurePolicy, FetchPool, Provider, ProviderPass, StoreError, SyncEffect, SyncErrorNotifier,
    SyncFailure, plan,
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// What happened to one provider during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    Synced(EffectCounts),
    Failed {
        failure: SyncFailure,
        /// `None` when the failure could not be recorded.
        outcome: Option<FailureOutcome>,
    },
    /// Locked by another node or no longer eligible.
    Skipped,
}

impl ProviderOutcome {
    #[must_use]
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced(_))
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Result of one tick over an adapter type.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub adapter: AdapterType,
    pub started_at: OffsetDateTime,
    pub finished_at: OffsetDateTime,
    pub outcomes: Vec<(Uuid, ProviderOutcome)>,
}

impl TickReport {
    /// Outcome for `provider_id`, if it was considered this tick.
    #[must_use]
    pub fn outcome(&self, provider_id: Uuid) -> Option<&ProviderOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| *id == provider_id)
            .map(|(_, outcome)| outcome)
    }

    #[must_use]
    pub fn summary(&self) -> TickSummary {
        let count = |f: fn(&ProviderOutcome) -> bool| {
            self.outcomes.iter().filter(|(_, outcome)| f(outcome)).count()
        };
        TickSummary {
            providers: self.outcomes.len(),
            synced: count(ProviderOutcome::is_synced),
            failed: count(ProviderOutcome::is_failed),
            skipped: count(|outcome| matches!(outcome, ProviderOutcome::Skipped)),
            duration_ms: u64::try_from((self.finished_at - self.started_at).whole_milliseconds())
                .unwrap_or(0),
        }
    }
}

/// Counts of a [`TickReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub providers: usize,
    pub synced: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

/// Drives provider passes for every adapter type.
pub struct SyncOrchestrator {
    store: DynStore,
    adapters: AdapterRegistry,
    notifier: Option<Arc<dyn SyncErrorNotifier>>,
    policy: FailurePolicy,
    apply_options: ApplyOptions,
    fetch_concurrency: usize,
}

impl SyncOrchestrator {
    pub fn new(store: DynStore, adapters: AdapterRegistry) -> Self {
        Self {
            store,
            adapters,
            notifier: None,
            policy: FailurePolicy::default(),
            apply_options: ApplyOptions::default(),
            fetch_concurrency: 10,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn SyncErrorNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_apply_options(mut self, options: ApplyOptions) -> Self {
        self.apply_options = options;
        self
    }

    pub fn with_fetch_concurrency(mut self, size: usize) -> Self {
        self.fetch_concurrency = size;
        self
    }

    pub fn store(&self) -> &DynStore {
        &self.store
    }

    /// Adapter types this orchestrator can sync.
    pub fn adapter_types(&self) -> Vec<AdapterType> {
        self.adapters.adapter_types()
    }

    /// Syncs every eligible provider of `adapter`, one after the other.
    ///
    /// Only listing the providers can fail the tick as a whole.
    #[instrument(skip_all, fields(adapter = %adapter))]
    pub async fn run_tick(&self, adapter: AdapterType) -> Result<TickReport, StoreError> {
        let started_at = OffsetDateTime::now_utc();
        let mut outcomes = Vec::new();

        let Some(directory) = self.adapters.get(adapter) else {
            warn!("No adapter registered; nothing to sync");
            return Ok(TickReport {
                adapter,
                started_at,
                finished_at: OffsetDateTime::now_utc(),
                outcomes,
            });
        };

        let providers = self.store.list_sync_providers(adapter).await?;
        debug!(providers = providers.len(), "Starting sync tick");

        let pool = FetchPool::new(self.fetch_concurrency);
        for provider in providers {
            let outcome = self.sync_provider(directory.as_ref(), provider.id, &pool).await;
            outcomes.push((provider.id, outcome));
        }

        let report = TickReport {
            adapter,
            started_at,
            finished_at: OffsetDateTime::now_utc(),
            outcomes,
        };
        let summary = report.summary();
        info!(
            providers = summary.providers,
            synced = summary.synced,
            failed = summary.failed,
            skipped = summary.skipped,
            duration_ms = summary.duration_ms,
            "Sync tick finished"
        );
        Ok(report)
    }

    /// Runs one pass over `provider_id`.
    #[instrument(skip_all, fields(%provider_id, adapter = %adapter.adapter_type()))]
    pub async fn sync_provider(
        &self,
        adapter: &dyn DirectoryAdapter,
        provider_id: Uuid,
        pool: &FetchPool,
    ) -> ProviderOutcome {
        let mut pass = match self.store.begin_pass(provider_id).await {
            Ok(Some(pass)) => pass,
            Ok(None) => {
                debug!("Provider locked elsewhere or no longer eligible; skipping");
                return ProviderOutcome::Skipped;
            }
            Err(e) => {
                error!(error = %e, "Failed to start sync pass");
                return ProviderOutcome::Failed {
                    failure: e.into(),
                    outcome: None,
                };
            }
        };

        match self.reconcile(adapter, pass.as_mut(), pool).await {
            Ok(effect) => {
                let counts = effect.counts();
                if let Err(e) = pass.finish().await {
                    error!(error = %e, "Failed to commit sync pass");
                    return ProviderOutcome::Failed {
                        failure: e.into(),
                        outcome: None,
                    };
                }
                info!(
                    identities_inserted = counts.identities_inserted,
                    identities_updated = counts.identities_updated,
                    identities_deleted = counts.identities_deleted,
                    groups_upserted = counts.groups_upserted,
                    groups_deleted = counts.groups_deleted,
                    memberships_inserted = counts.memberships_inserted,
                    memberships_deleted = counts.memberships_deleted,
                    "Provider synced"
                );
                ProviderOutcome::Synced(counts)
            }
            Err(failure) => self.fail(pass, failure).await,
        }
    }

    async fn reconcile(
        &self,
        adapter: &dyn DirectoryAdapter,
        pass: &mut dyn ProviderPass,
        pool: &FetchPool,
    ) -> Result<SyncEffect, SyncFailure> {
        let remote = adapter.gather(pass.provider(), pool).await?;
        let local = pass.load_local_state().await?;
        let plan = plan(&remote, &local);

        let now = OffsetDateTime::now_utc();
        let effect = match pass.apply(&plan, self.apply_options, now).await {
            Ok(effect) => effect,
            Err(e) => {
                error!(error = %e, plan = ?plan, "Failed to apply sync plan");
                return Err(e.into());
            }
        };
        pass.record_success(now).await?;
        Ok(effect)
    }

    /// Records `failure` on the provider and emails administrators when
    /// the policy asks for it.
    async fn fail(&self, mut pass: Box<dyn ProviderPass>, failure: SyncFailure) -> ProviderOutcome {
        let now = OffsetDateTime::now_utc();
        let outcome = self.policy.evaluate(pass.provider(), now);

        warn!(
            kind = %failure.kind,
            reason = %failure.reason,
            message = %failure.message,
            failures_in_streak = outcome.failures_in_streak,
            "Provider sync failed"
        );

        if let Err(e) = pass.record_failure(&failure, &outcome, now).await {
            error!(error = %e, "Failed to record sync failure");
            return ProviderOutcome::Failed {
                failure,
                outcome: None,
            };
        }

        let admins = if outcome.notify && self.notifier.is_some() {
            match pass.admin_emails().await {
                Ok(admins) => admins,
                Err(e) => {
                    warn!(error = %e, "Failed to load administrator emails");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        let provider = pass.provider().clone();

        if let Err(e) = pass.finish().await {
            error!(error = %e, "Failed to commit sync failure");
            return ProviderOutcome::Failed {
                failure,
                outcome: None,
            };
        }

        if outcome.disable {
            warn!(
                failures_in_streak = outcome.failures_in_streak,
                "Sync disabled for provider after repeated failures"
            );
        }
        if outcome.notify {
            self.notify_admins(provider, admins);
        }

        ProviderOutcome::Failed {
            failure,
            outcome: Some(outcome),
        }
    }

    /// Sends sync-error emails in the background, one task per administrator.
    fn notify_admins(&self, provider: Provider, admins: Vec<String>) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if admins.is_empty() {
            warn!(account_id = %provider.account_id, "No administrators to notify");
            return;
        }

        let provider = Arc::new(provider);
        for admin in admins {
            let notifier = Arc::clone(notifier);
            let provider = Arc::clone(&provider);
            tokio::spawn(async move {
                if let Err(e) = notifier.notify_sync_error(&provider, &admin).await {
                    warn!(provider_id = %provider.id, to = %admin, error = %e, "Failed to send sync error email");
                }
            });
        }
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("adapters", &self.adapters)
            .field("notifier", &self.notifier.is_some())
            .field("policy", &self.policy)
            .field("apply_options", &self.apply_options)
            .field("fetch_concurrency", &self.fetch_concurrency)
            .finish()
    }
}
