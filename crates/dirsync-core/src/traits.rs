//! Seams between the orchestrator and its collaborators.
//!
//! The orchestrator only ever sees these traits: adapters gather remote
//! data, stores hand out locked provider passes, leader elections gate
//! singleton jobs and notifiers deliver sync-error emails.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::StoreResult;
use crate::effect::SyncEffect;
use crate::error::SyncFailure;
use crate::failure::FailureOutcome;
use crate::fetch::FetchPool;
use crate::planner::SyncPlan;
use crate::types::{AdapterType, ApplyOptions, LocalState, Provider, RemoteSnapshot};

/// One external directory implementation.
///
/// Implementations fetch users, groups and memberships and map them to the
/// canonical attribute shapes. Everything after gathering is adapter-agnostic.
#[async_trait]
pub trait DirectoryAdapter: Send + Sync {
    /// The adapter type this implementation serves.
    fn adapter_type(&self) -> AdapterType;

    /// Gathers the provider's remote directory.
    ///
    /// All remote requests run under `pool`. If any one of them fails the
    /// whole gather fails and no partial snapshot is returned.
    async fn gather(
        &self,
        provider: &Provider,
        pool: &FetchPool,
    ) -> Result<RemoteSnapshot, SyncFailure>;
}

/// Persistent store for providers, identities, actors, groups and memberships.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Lists providers of `adapter` that are enabled and not sync-disabled.
    async fn list_sync_providers(&self, adapter: AdapterType) -> StoreResult<Vec<Provider>>;

    /// Stores `provider` unless one with the same id exists.
    ///
    /// Returns `true` if it was inserted. Used to seed providers from
    /// configuration.
    async fn register_provider(&self, provider: &Provider) -> StoreResult<bool>;

    /// Starts a pass over one provider.
    ///
    /// Takes a non-blocking lock on the provider visible to every node.
    /// Returns `None` when another node holds it or the provider is no
    /// longer eligible for sync; the caller skips it for this tick.
    async fn begin_pass(&self, provider_id: Uuid) -> StoreResult<Option<Box<dyn ProviderPass>>>;
}

/// A locked provider for the duration of one sync pass.
///
/// Dropping a pass without calling [`ProviderPass::finish`] releases the
/// lock. Transactional stores also roll back everything written through it.
#[async_trait]
pub trait ProviderPass: Send {
    /// The provider as read under the lock.
    fn provider(&self) -> &Provider;

    /// Loads the provider's live identities, groups and memberships.
    async fn load_local_state(&mut self) -> StoreResult<LocalState>;

    /// Applies `plan` as a single all-or-nothing unit.
    ///
    /// On error nothing from the plan is kept, but the pass remains usable
    /// for recording the failure.
    async fn apply(
        &mut self,
        plan: &SyncPlan,
        options: ApplyOptions,
        now: OffsetDateTime,
    ) -> StoreResult<SyncEffect>;

    /// Marks the provider as synced and clears its failure streak.
    async fn record_success(&mut self, now: OffsetDateTime) -> StoreResult<()>;

    /// Stores the failure on the provider and extends its streak.
    async fn record_failure(
        &mut self,
        failure: &SyncFailure,
        outcome: &FailureOutcome,
        now: OffsetDateTime,
    ) -> StoreResult<()>;

    /// Email addresses of the account's administrators.
    async fn admin_emails(&mut self) -> StoreResult<Vec<String>>;

    /// Commits the pass and releases the lock.
    async fn finish(self: Box<Self>) -> StoreResult<()>;
}

/// Cluster-wide leadership for singleton jobs.
#[async_trait]
pub trait LeaderElection: Send + Sync {
    /// Returns whether this node currently leads, trying to acquire
    /// leadership if nobody holds it. Called once per tick.
    async fn is_leader(&self) -> StoreResult<bool>;

    /// Gives up leadership if held.
    async fn resign(&self) -> StoreResult<()>;
}

/// Error type returned by notifiers.
pub type NotifyError = Box<dyn std::error::Error + Send + Sync>;

/// Sink for sync-error notifications.
#[async_trait]
pub trait SyncErrorNotifier: Send + Sync {
    /// Sends one sync-error email about `provider` to `admin_email`.
    async fn notify_sync_error(
        &self,
        provider: &Provider,
        admin_email: &str,
    ) -> Result<(), NotifyError>;
}
