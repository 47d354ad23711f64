//! Bounded concurrent fetching.
//!
//! A [`FetchPool`] is created once per scheduled tick and shared by every
//! provider gathered during that tick, capping the number of in-flight
//! remote requests.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::SyncFailure;

/// Worker pool scoped to one sync tick.
#[derive(Debug, Clone)]
pub struct FetchPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl FetchPool {
    /// Creates a pool that lets at most `size` fetches run at once.
    #[must_use]
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Maximum number of concurrent fetches.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `fetch` once a worker slot is free.
    pub async fn run<F, T>(&self, fetch: F) -> Result<T, SyncFailure>
    where
        F: Future<Output = Result<T, SyncFailure>>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SyncFailure::transient("pool_closed", "Fetch pool was closed"))?;
        fetch.await
    }

    /// Runs every fetch under the pool and collects results in input order.
    ///
    /// The first error wins: remaining fetches are dropped and the error is
    /// returned.
    ///
    /// The futures are collected before streaming so the caller's iterator
    /// and closure never live across an await; callers inside `Send` trait
    /// methods rely on this.
    pub async fn run_all<I, F, T>(&self, fetches: I) -> Result<Vec<T>, SyncFailure>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, SyncFailure>>,
    {
        use futures_util::stream::{self, StreamExt, TryStreamExt};

        let fetches: Vec<_> = fetches.into_iter().map(|fetch| self.run(fetch)).collect();
        stream::iter(fetches)
            .buffered(self.size)
            .try_collect()
            .await
    }
}
