//! Cluster leadership through PostgreSQL session advisory locks.
//!
//! The leader holds `pg_try_advisory_lock` on a connection detached from
//! the pool. Postgres releases session locks when their connection ends,
//! so a crashed leader's lock disappears with its connection and another
//! node picks it up on its next tick.

use async_trait::async_trait;
use sqlx_core::connection::Connection;
use sqlx_core::query_as::query_as;
use sqlx_postgres::{PgConnection, PgPool};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use dirsync_core::{LeaderElection, StoreResult};

use crate::error::PostgresError;

/// Leadership for one named singleton job.
///
/// Jobs with different names elect leaders independently.
#[derive(Debug)]
pub struct PgLeaderElection {
    pool: PgPool,
    name: String,
    held: Mutex<Option<PgConnection>>,
}

impl PgLeaderElection {
    /// Creates an election for the job called `name`.
    ///
    /// The lock key is `hashtext(name)`, computed by the server.
    #[must_use]
    pub fn new(pool: PgPool, name: impl Into<String>) -> Self {
        Self {
            pool,
            name: name.into(),
            held: Mutex::new(None),
        }
    }

    /// The job name the lock key is derived from.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl LeaderElection for PgLeaderElection {
    #[instrument(skip(self), fields(job = %self.name))]
    async fn is_leader(&self) -> StoreResult<bool> {
        let mut held = self.held.lock().await;

        if let Some(conn) = held.as_mut() {
            // A dead connection means the server already dropped the lock
            match conn.ping().await {
                Ok(()) => return Ok(true),
                Err(e) => {
                    warn!(error = %e, "Lost leader connection");
                    *held = None;
                }
            }
        }

        let mut conn = self.pool.acquire().await.map_err(PostgresError::from)?;
        let (acquired,): (bool,) = query_as("SELECT pg_try_advisory_lock(hashtext($1))")
            .bind(&self.name)
            .fetch_one(&mut *conn)
            .await
            .map_err(PostgresError::from)?;

        if acquired {
            // Detached so pool recycling never closes it under us
            *held = Some(conn.detach());
            info!("Acquired leadership");
        }

        Ok(acquired)
    }

    #[instrument(skip(self), fields(job = %self.name))]
    async fn resign(&self) -> StoreResult<()> {
        let Some(mut conn) = self.held.lock().await.take() else {
            return Ok(());
        };

        let unlocked: Result<(bool,), _> = query_as("SELECT pg_advisory_unlock(hashtext($1))")
            .bind(&self.name)
            .fetch_one(&mut conn)
            .await;
        if let Err(e) = unlocked {
            warn!(error = %e, "Failed to release advisory lock; closing connection");
        }

        // Closing the session releases the lock in any case
        conn.close().await.map_err(PostgresError::from)?;
        info!("Resigned leadership");
        Ok(())
    }
}
