//! [`DirectoryStore`] backed by PostgreSQL.
//!
//! A provider pass is one database transaction. It opens with a
//! `SELECT ... FOR NO KEY UPDATE SKIP LOCKED` on the provider row, so every
//! node in the cluster sees the provider as taken until the pass commits or
//! is dropped. The plan itself is applied inside a savepoint: if it fails,
//! the savepoint is rolled back and the outer transaction stays usable for
//! recording the failure on the provider.
//!
//! The lock is taken before the remote directory is gathered, so the
//! transaction sits idle for the whole fetch. Servers configured with
//! `idle_in_transaction_session_timeout` need it above the slowest gather;
//! a killed session surfaces as a transient store failure and the next
//! tick retries.

use async_trait::async_trait;
use sqlx_core::connection::Connection;
use sqlx_postgres::{PgPool, PgTransaction};
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use dirsync_core::{
    AdapterType, ApplyOptions, DirectoryStore, FailureOutcome, LocalState, Provider, ProviderPass,
    StoreError, StoreResult, SyncEffect, SyncFailure, SyncPlan,
};

use crate::config::PostgresConfig;
use crate::{migrations, pool, queries};

/// PostgreSQL implementation of [`DirectoryStore`].
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects, checks the connection and runs migrations if configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created or a migration fails.
    pub async fn connect(config: &PostgresConfig) -> StoreResult<Self> {
        let pool = pool::create_pool(config).await?;
        pool::test_connection(&pool).await?;

        if config.run_migrations {
            migrations::run(&pool).await?;
        }

        Ok(Self { pool })
    }

    /// Creates a store over an existing pool.
    ///
    /// Migrations are not run automatically when using this constructor.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DirectoryStore for PostgresStore {
    #[instrument(skip(self))]
    async fn list_sync_providers(&self, adapter: AdapterType) -> StoreResult<Vec<Provider>> {
        Ok(queries::providers::list_sync_enabled(&self.pool, adapter).await?)
    }

    #[instrument(skip(self, provider), fields(provider_id = %provider.id))]
    async fn register_provider(&self, provider: &Provider) -> StoreResult<bool> {
        Ok(queries::providers::insert_if_absent(&self.pool, provider).await?)
    }

    #[instrument(skip(self))]
    async fn begin_pass(&self, provider_id: Uuid) -> StoreResult<Option<Box<dyn ProviderPass>>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::transaction(format!("Failed to begin transaction: {e}")))?;

        let Some(provider) = queries::providers::lock_for_sync(&mut tx, provider_id).await? else {
            debug!("Provider is locked elsewhere or no longer eligible");
            return Ok(None);
        };

        Ok(Some(Box::new(PostgresPass { tx, provider })))
    }
}

/// One locked provider; see the module docs.
///
/// Dropping the pass rolls the transaction back, which also releases the
/// row lock.
pub struct PostgresPass {
    tx: PgTransaction<'static>,
    provider: Provider,
}

impl std::fmt::Debug for PostgresPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresPass")
            .field("provider_id", &self.provider.id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProviderPass for PostgresPass {
    fn provider(&self) -> &Provider {
        &self.provider
    }

    async fn load_local_state(&mut self) -> StoreResult<LocalState> {
        Ok(queries::directory::load_local_state(&mut self.tx, self.provider.id).await?)
    }

    #[instrument(skip_all, fields(provider_id = %self.provider.id))]
    async fn apply(
        &mut self,
        plan: &SyncPlan,
        options: ApplyOptions,
        now: OffsetDateTime,
    ) -> StoreResult<SyncEffect> {
        // Nested begin on an open transaction issues SAVEPOINT
        let mut savepoint = Connection::begin(&mut *self.tx)
            .await
            .map_err(|e| StoreError::transaction(format!("Failed to open savepoint: {e}")))?;

        match queries::apply::apply_plan(&mut savepoint, &self.provider, plan, options, now).await {
            Ok(()) => {
                savepoint.commit().await.map_err(|e| {
                    StoreError::transaction(format!("Failed to release savepoint: {e}"))
                })?;
                Ok(SyncEffect::from_plan(plan))
            }
            Err(err) => {
                if let Err(rollback_err) = savepoint.rollback().await {
                    warn!(error = %rollback_err, "Failed to roll back savepoint");
                }
                Err(err.into())
            }
        }
    }

    async fn record_success(&mut self, now: OffsetDateTime) -> StoreResult<()> {
        queries::providers::record_success(&mut self.tx, self.provider.id, now).await?;

        self.provider.last_synced_at = Some(now);
        self.provider.last_sync_error = None;
        self.provider.last_sync_error_reason = None;
        self.provider.last_syncs_failed = 0;
        self.provider.sync_error_emailed_at = None;
        Ok(())
    }

    async fn record_failure(
        &mut self,
        failure: &SyncFailure,
        outcome: &FailureOutcome,
        now: OffsetDateTime,
    ) -> StoreResult<()> {
        queries::providers::record_failure(&mut self.tx, self.provider.id, failure, outcome, now)
            .await?;

        self.provider.last_sync_error = Some(failure.message.clone());
        self.provider.last_sync_error_reason = Some(failure.reason.clone());
        self.provider.last_syncs_failed = outcome.failures_in_streak;
        if outcome.notify {
            self.provider.sync_error_emailed_at = Some(now);
        }
        if outcome.disable {
            self.provider.sync_disabled_at = Some(now);
        }
        Ok(())
    }

    async fn admin_emails(&mut self) -> StoreResult<Vec<String>> {
        Ok(queries::directory::admin_emails(&mut self.tx, self.provider.account_id).await?)
    }

    async fn finish(self: Box<Self>) -> StoreResult<()> {
        let PostgresPass { tx, provider } = *self;
        tx.commit()
            .await
            .map_err(|e| StoreError::transaction(format!("Failed to commit pass: {e}")))?;
        debug!(provider_id = %provider.id, "Provider pass committed");
        Ok(())
    }
}
