//! # dirsync-core
//!
//! Domain model and reconciliation logic for the directory sync engine.
//!
//! This crate knows nothing about HTTP or SQL. It defines:
//! - the canonical shapes adapters map remote users and groups into
//!   ([`IdentityAttrs`], [`GroupAttrs`], [`MembershipTuple`]);
//! - the pure three-way [`plan`] that diffs a [`RemoteSnapshot`] against
//!   a provider's [`LocalState`];
//! - the seams the orchestrator drives ([`DirectoryAdapter`],
//!   [`DirectoryStore`], [`ProviderPass`], [`LeaderElection`],
//!   [`SyncErrorNotifier`]);
//! - failure streak bookkeeping ([`FailurePolicy`]).
//!
//! An in-memory store lives in [`memory`] for local development and tests.
//!
//! ## Example
//!
//! ```ignore
//! use dirsync_core::{plan, LocalState, RemoteSnapshot};
//!
//! let remote: RemoteSnapshot = adapter.gather(&provider, &pool).await?;
//! let local: LocalState = pass.load_local_state().await?;
//! let plan = plan(&remote, &local);
//! if !plan.is_noop() {
//!     pass.apply(&plan, ApplyOptions::default(), now).await?;
//! }
//! ```

mod effect;
mod error;
mod failure;
mod fetch;
pub mod memory;
mod planner;
mod traits;
mod types;

pub use effect::{EffectCounts, SyncEffect};
pub use error::{ErrorCategory, FailureKind, StoreError, SyncFailure};
pub use failure::{FailureOutcome, FailurePolicy};
pub use fetch::FetchPool;
pub use planner::{SyncPlan, plan};
pub use traits::{
    DirectoryAdapter, DirectoryStore, LeaderElection, NotifyError, ProviderPass, SyncErrorNotifier,
};
pub use types::{
    ActorAttrs, ActorType, AdapterType, ApplyOptions, GroupAttrs, GroupDeletion, IdentityAttrs,
    LocalGroup, LocalIdentity, LocalState, MembershipTuple, Provider, ProviderState,
    RemoteSnapshot,
};

/// Type alias for a storage result.
pub type StoreResult<T> = Result<T, StoreError>;

/// Type alias for a shared store.
pub type DynStore = std::sync::Arc<dyn DirectoryStore>;
