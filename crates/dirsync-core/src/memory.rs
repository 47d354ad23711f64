//! In-memory store and leader election.
//!
//! Backs local development with the mock adapter and the orchestrator tests.
//! Every call on a pass commits on its own; `apply` is atomic because the
//! whole plan is applied to a staged copy under one lock and swapped in only
//! on success.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::StoreResult;
use crate::effect::SyncEffect;
use crate::error::{StoreError, SyncFailure};
use crate::failure::FailureOutcome;
use crate::planner::SyncPlan;
use crate::traits::{DirectoryStore, LeaderElection, ProviderPass};
use crate::types::{
    ActorAttrs, ActorType, AdapterType, ApplyOptions, GroupDeletion, LocalGroup, LocalIdentity,
    LocalState, MembershipTuple, Provider, ProviderState,
};

/// An actor row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: ActorType,
    pub name: String,
    pub deleted_at: Option<OffsetDateTime>,
}

/// An identity row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub provider_id: Uuid,
    pub provider_identifier: String,
    pub actor_id: Uuid,
    pub provider_state: ProviderState,
    pub last_synced_at: Option<OffsetDateTime>,
    pub deleted_at: Option<OffsetDateTime>,
}

/// A group row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub provider_id: Uuid,
    pub provider_identifier: String,
    pub name: String,
    pub deleted_at: Option<OffsetDateTime>,
}

/// Full contents of a [`MemoryStore`].
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshot {
    pub providers: BTreeMap<Uuid, Provider>,
    pub actors: BTreeMap<Uuid, ActorRow>,
    pub identities: BTreeMap<Uuid, IdentityRow>,
    pub groups: BTreeMap<Uuid, GroupRow>,
    /// `(actor_id, group_id)` pairs.
    pub memberships: BTreeSet<(Uuid, Uuid)>,
}

impl MemorySnapshot {
    /// Live identities of a provider.
    #[must_use]
    pub fn live_identities(&self, provider_id: Uuid) -> Vec<&IdentityRow> {
        self.identities
            .values()
            .filter(|row| row.provider_id == provider_id && row.deleted_at.is_none())
            .collect()
    }

    /// Live groups of a provider.
    #[must_use]
    pub fn live_groups(&self, provider_id: Uuid) -> Vec<&GroupRow> {
        self.groups
            .values()
            .filter(|row| row.provider_id == provider_id && row.deleted_at.is_none())
            .collect()
    }

    /// Returns `true` if every membership points at a live actor with a live
    /// identity and at a live group.
    #[must_use]
    pub fn memberships_are_consistent(&self) -> bool {
        self.memberships.iter().all(|(actor_id, group_id)| {
            let actor_live = self
                .actors
                .get(actor_id)
                .is_some_and(|actor| actor.deleted_at.is_none());
            let identity_live = self
                .identities
                .values()
                .any(|row| row.actor_id == *actor_id && row.deleted_at.is_none());
            let group_live = self
                .groups
                .get(group_id)
                .is_some_and(|group| group.deleted_at.is_none());
            actor_live && identity_live && group_live
        })
    }
}

/// Thread-safe in-memory [`DirectoryStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemorySnapshot>>,
    locks: Arc<Mutex<HashSet<Uuid>>>,
    fail_next_apply: Arc<AtomicBool>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemorySnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn locks(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds or replaces a provider.
    pub fn insert_provider(&self, provider: Provider) {
        self.state().providers.insert(provider.id, provider);
    }

    /// Returns the current provider record.
    #[must_use]
    pub fn provider(&self, id: Uuid) -> Option<Provider> {
        self.state().providers.get(&id).cloned()
    }

    /// Creates an administrator actor with an email identity.
    pub fn add_admin(&self, account_id: Uuid, name: &str, email: &str) -> Uuid {
        let mut state = self.state();
        let actor_id = Uuid::new_v4();
        state.actors.insert(
            actor_id,
            ActorRow {
                id: actor_id,
                account_id,
                kind: ActorType::AccountAdminUser,
                name: name.to_string(),
                deleted_at: None,
            },
        );
        let identity_id = Uuid::new_v4();
        state.identities.insert(
            identity_id,
            IdentityRow {
                id: identity_id,
                account_id,
                provider_id: Uuid::nil(),
                provider_identifier: email.to_string(),
                actor_id,
                provider_state: ProviderState {
                    email: Some(email.to_string()),
                    ..Default::default()
                },
                last_synced_at: None,
                deleted_at: None,
            },
        );
        actor_id
    }

    /// Returns a copy of everything in the store.
    #[must_use]
    pub fn snapshot(&self) -> MemorySnapshot {
        self.state().clone()
    }

    /// Returns `true` while a pass holds the provider.
    #[must_use]
    pub fn is_locked(&self, provider_id: Uuid) -> bool {
        self.locks().contains(&provider_id)
    }

    /// Makes the next `apply` fail after the group upserts, as a constraint
    /// violation would. Used to exercise rollback.
    pub fn fail_next_apply(&self) {
        self.fail_next_apply.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn list_sync_providers(&self, adapter: AdapterType) -> StoreResult<Vec<Provider>> {
        Ok(self
            .state()
            .providers
            .values()
            .filter(|provider| provider.adapter == adapter && provider.is_sync_enabled())
            .cloned()
            .collect())
    }

    async fn register_provider(&self, provider: &Provider) -> StoreResult<bool> {
        let mut state = self.state();
        if state.providers.contains_key(&provider.id) {
            return Ok(false);
        }
        state.providers.insert(provider.id, provider.clone());
        Ok(true)
    }

    async fn begin_pass(&self, provider_id: Uuid) -> StoreResult<Option<Box<dyn ProviderPass>>> {
        let Some(provider) = self
            .provider(provider_id)
            .filter(Provider::is_sync_enabled)
        else {
            return Ok(None);
        };

        if !self.locks().insert(provider_id) {
            return Ok(None);
        }

        Ok(Some(Box::new(MemoryPass {
            store: self.clone(),
            provider,
        })))
    }
}

struct MemoryPass {
    store: MemoryStore,
    provider: Provider,
}

impl Drop for MemoryPass {
    fn drop(&mut self) {
        self.store.locks().remove(&self.provider.id);
    }
}

#[async_trait]
impl ProviderPass for MemoryPass {
    fn provider(&self) -> &Provider {
        &self.provider
    }

    async fn load_local_state(&mut self) -> StoreResult<LocalState> {
        let state = self.store.state();
        let provider_id = self.provider.id;
        let mut local = LocalState::default();
        let mut identity_by_actor = BTreeMap::new();

        for row in state.live_identities(provider_id) {
            let actor = state
                .actors
                .get(&row.actor_id)
                .ok_or_else(|| StoreError::not_found("Actor", row.actor_id.to_string()))?;
            identity_by_actor.insert(row.actor_id, row.provider_identifier.clone());
            local.identities.insert(
                row.provider_identifier.clone(),
                LocalIdentity {
                    identity_id: row.id,
                    actor_id: row.actor_id,
                    provider_state: row.provider_state.clone(),
                    actor: ActorAttrs {
                        kind: actor.kind,
                        name: actor.name.clone(),
                    },
                },
            );
        }

        let mut group_keys = BTreeMap::new();
        for row in state.live_groups(provider_id) {
            group_keys.insert(row.id, row.provider_identifier.clone());
            local.groups.insert(
                row.provider_identifier.clone(),
                LocalGroup {
                    group_id: row.id,
                    name: row.name.clone(),
                },
            );
        }

        for (actor_id, group_id) in &state.memberships {
            if let (Some(identity), Some(group)) =
                (identity_by_actor.get(actor_id), group_keys.get(group_id))
            {
                local
                    .memberships
                    .insert(MembershipTuple::new(group.clone(), identity.clone()));
            }
        }

        Ok(local)
    }

    async fn apply(
        &mut self,
        plan: &SyncPlan,
        options: ApplyOptions,
        now: OffsetDateTime,
    ) -> StoreResult<SyncEffect> {
        let fail_after_groups = self.store.fail_next_apply.swap(false, Ordering::SeqCst);
        let mut state = self.store.state();
        let mut staged = state.clone();

        apply_plan(&mut staged, &self.provider, plan, options, now, fail_after_groups)?;

        *state = staged;
        Ok(SyncEffect::from_plan(plan))
    }

    async fn record_success(&mut self, now: OffsetDateTime) -> StoreResult<()> {
        let mut state = self.store.state();
        let provider = state
            .providers
            .get_mut(&self.provider.id)
            .ok_or_else(|| StoreError::not_found("Provider", self.provider.id.to_string()))?;
        provider.last_synced_at = Some(now);
        provider.last_sync_error = None;
        provider.last_sync_error_reason = None;
        provider.last_syncs_failed = 0;
        provider.sync_error_emailed_at = None;
        self.provider = provider.clone();
        Ok(())
    }

    async fn record_failure(
        &mut self,
        failure: &SyncFailure,
        outcome: &FailureOutcome,
        now: OffsetDateTime,
    ) -> StoreResult<()> {
        let mut state = self.store.state();
        let provider = state
            .providers
            .get_mut(&self.provider.id)
            .ok_or_else(|| StoreError::not_found("Provider", self.provider.id.to_string()))?;
        provider.last_sync_error = Some(failure.message.clone());
        provider.last_sync_error_reason = Some(failure.reason.clone());
        provider.last_syncs_failed = outcome.failures_in_streak;
        if outcome.notify {
            provider.sync_error_emailed_at = Some(now);
        }
        if outcome.disable {
            provider.sync_disabled_at = Some(now);
        }
        self.provider = provider.clone();
        Ok(())
    }

    async fn admin_emails(&mut self) -> StoreResult<Vec<String>> {
        let state = self.store.state();
        let account_id = self.provider.account_id;
        let emails: BTreeSet<String> = state
            .identities
            .values()
            .filter(|row| row.account_id == account_id && row.deleted_at.is_none())
            .filter(|row| {
                state.actors.get(&row.actor_id).is_some_and(|actor| {
                    actor.kind == ActorType::AccountAdminUser && actor.deleted_at.is_none()
                })
            })
            .filter_map(|row| row.provider_state.email.clone())
            .collect();
        Ok(emails.into_iter().collect())
    }

    async fn finish(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

fn apply_plan(
    state: &mut MemorySnapshot,
    provider: &Provider,
    plan: &SyncPlan,
    options: ApplyOptions,
    now: OffsetDateTime,
    fail_after_groups: bool,
) -> StoreResult<()> {
    let mut identity_rows: BTreeMap<String, Uuid> = state
        .live_identities(provider.id)
        .into_iter()
        .map(|row| (row.provider_identifier.clone(), row.id))
        .collect();
    let mut actor_by_key: BTreeMap<String, Uuid> = state
        .live_identities(provider.id)
        .into_iter()
        .map(|row| (row.provider_identifier.clone(), row.actor_id))
        .collect();
    let mut group_by_key: BTreeMap<String, Uuid> = state
        .live_groups(provider.id)
        .into_iter()
        .map(|row| (row.provider_identifier.clone(), row.id))
        .collect();

    // 1. Insert identities with their actors
    for key in &plan.identity_insert_ids {
        if identity_rows.contains_key(key) {
            return Err(StoreError::constraint(format!(
                "identity {key} already exists for provider {}",
                provider.id
            )));
        }
        let attrs = plan
            .identities
            .get(key)
            .ok_or_else(|| StoreError::internal(format!("plan has no attributes for {key}")))?;
        let actor_id = Uuid::new_v4();
        state.actors.insert(
            actor_id,
            ActorRow {
                id: actor_id,
                account_id: provider.account_id,
                kind: attrs.actor.kind,
                name: attrs.actor.name.clone(),
                deleted_at: None,
            },
        );
        let identity_id = Uuid::new_v4();
        state.identities.insert(
            identity_id,
            IdentityRow {
                id: identity_id,
                account_id: provider.account_id,
                provider_id: provider.id,
                provider_identifier: key.clone(),
                actor_id,
                provider_state: attrs.provider_state.clone(),
                last_synced_at: Some(now),
                deleted_at: None,
            },
        );
        identity_rows.insert(key.clone(), identity_id);
        actor_by_key.insert(key.clone(), actor_id);
    }

    // 2. Update identities and propagate to actors
    for key in &plan.identity_update_ids {
        let identity_id = identity_rows
            .get(key)
            .ok_or_else(|| StoreError::not_found("Identity", key.clone()))?;
        let attrs = plan
            .identities
            .get(key)
            .ok_or_else(|| StoreError::internal(format!("plan has no attributes for {key}")))?;
        let row = state
            .identities
            .get_mut(identity_id)
            .ok_or_else(|| StoreError::not_found("Identity", key.clone()))?;
        row.last_synced_at = Some(now);
        if plan.changed_identity_ids.contains(key) {
            row.provider_state = attrs.provider_state.clone();
            let actor_id = row.actor_id;
            if let Some(actor) = state.actors.get_mut(&actor_id) {
                actor.kind = attrs.actor.kind;
                actor.name = attrs.actor.name.clone();
            }
        }
    }

    // 3. Soft-delete identities, and actors left without a live identity
    for key in &plan.identity_delete_ids {
        let identity_id = identity_rows
            .get(key)
            .ok_or_else(|| StoreError::not_found("Identity", key.clone()))?;
        let actor_id = match state.identities.get_mut(identity_id) {
            Some(row) => {
                row.deleted_at = Some(now);
                row.actor_id
            }
            None => continue,
        };
        let orphaned = !state
            .identities
            .values()
            .any(|row| row.actor_id == actor_id && row.deleted_at.is_none());
        if orphaned && let Some(actor) = state.actors.get_mut(&actor_id) {
            actor.deleted_at = Some(now);
        }
    }

    // 4. Upsert groups
    for key in &plan.group_upsert_ids {
        let attrs = plan
            .groups
            .get(key)
            .ok_or_else(|| StoreError::internal(format!("plan has no attributes for group {key}")))?;
        match group_by_key.get(key).and_then(|id| state.groups.get_mut(id)) {
            Some(row) => row.name = attrs.name.clone(),
            None => {
                let group_id = Uuid::new_v4();
                state.groups.insert(
                    group_id,
                    GroupRow {
                        id: group_id,
                        account_id: provider.account_id,
                        provider_id: provider.id,
                        provider_identifier: key.clone(),
                        name: attrs.name.clone(),
                        deleted_at: None,
                    },
                );
                group_by_key.insert(key.clone(), group_id);
            }
        }
    }

    if fail_after_groups {
        return Err(StoreError::constraint("injected failure after group upsert"));
    }

    // 5. Delete groups
    for key in &plan.group_delete_ids {
        let Some(group_id) = group_by_key.get(key).copied() else {
            continue;
        };
        state.memberships.retain(|(_, group)| *group != group_id);
        match options.group_deletion {
            GroupDeletion::Soft => {
                if let Some(row) = state.groups.get_mut(&group_id) {
                    row.deleted_at = Some(now);
                }
            }
            GroupDeletion::Hard => {
                state.groups.remove(&group_id);
            }
        }
    }

    // 6. Memberships
    for tuple in &plan.membership_delete_tuples {
        if let (Some(actor_id), Some(group_id)) = (
            actor_by_key.get(&tuple.identity_provider_identifier),
            group_by_key.get(&tuple.group_provider_identifier),
        ) {
            state.memberships.remove(&(*actor_id, *group_id));
        }
    }
    for tuple in &plan.membership_insert_tuples {
        let actor_id = actor_by_key
            .get(&tuple.identity_provider_identifier)
            .filter(|_| !plan.identity_delete_ids.contains(&tuple.identity_provider_identifier))
            .ok_or_else(|| {
                StoreError::constraint(format!(
                    "membership references unknown identity {}",
                    tuple.identity_provider_identifier
                ))
            })?;
        let group_id = group_by_key
            .get(&tuple.group_provider_identifier)
            .filter(|_| !plan.group_delete_ids.contains(&tuple.group_provider_identifier))
            .ok_or_else(|| {
                StoreError::constraint(format!(
                    "membership references unknown group {}",
                    tuple.group_provider_identifier
                ))
            })?;
        state.memberships.insert((*actor_id, *group_id));
    }

    Ok(())
}

// =============================================================================
// Leader election
// =============================================================================

/// Shared leadership slot for in-process nodes.
#[derive(Debug, Clone, Default)]
pub struct LeaderSlot(Arc<Mutex<Option<Uuid>>>);

/// [`LeaderElection`] over a [`LeaderSlot`].
///
/// Nodes sharing a slot compete for it; the first to ask wins and keeps it
/// until it resigns.
#[derive(Debug, Clone)]
pub struct MemoryLeaderElection {
    slot: LeaderSlot,
    node_id: Uuid,
}

impl MemoryLeaderElection {
    #[must_use]
    pub fn new(slot: LeaderSlot) -> Self {
        Self {
            slot,
            node_id: Uuid::new_v4(),
        }
    }

    /// A single node that is always the leader.
    #[must_use]
    pub fn standalone() -> Self {
        Self::new(LeaderSlot::default())
    }
}

#[async_trait]
impl LeaderElection for MemoryLeaderElection {
    async fn is_leader(&self) -> StoreResult<bool> {
        let mut slot = self.slot.0.lock().unwrap_or_else(PoisonError::into_inner);
        match *slot {
            Some(leader) => Ok(leader == self.node_id),
            None => {
                *slot = Some(self.node_id);
                Ok(true)
            }
        }
    }

    async fn resign(&self) -> StoreResult<()> {
        let mut slot = self.slot.0.lock().unwrap_or_else(PoisonError::into_inner);
        if *slot == Some(self.node_id) {
            *slot = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::plan;
    use crate::types::{GroupAttrs, IdentityAttrs, RemoteSnapshot};

    fn identity(id: &str) -> IdentityAttrs {
        IdentityAttrs {
            provider_identifier: id.to_string(),
            provider_state: ProviderState {
                email: Some(format!("{id}@example.com")),
                ..Default::default()
            },
            actor: ActorAttrs::account_user(id),
        }
    }

    fn group(id: &str) -> GroupAttrs {
        GroupAttrs {
            provider_identifier: id.to_string(),
            name: format!("Group:{id}"),
        }
    }

    fn setup() -> (MemoryStore, Provider) {
        let store = MemoryStore::new();
        let provider = Provider::new(Uuid::new_v4(), "Mock", AdapterType::Mock, serde_json::json!({}));
        store.insert_provider(provider.clone());
        (store, provider)
    }

    async fn sync(store: &MemoryStore, provider_id: Uuid, remote: &RemoteSnapshot) -> SyncEffect {
        let mut pass = store.begin_pass(provider_id).await.unwrap().unwrap();
        let local = pass.load_local_state().await.unwrap();
        let plan = plan(remote, &local);
        let effect = pass
            .apply(&plan, ApplyOptions::default(), OffsetDateTime::now_utc())
            .await
            .unwrap();
        pass.finish().await.unwrap();
        effect
    }

    #[tokio::test]
    async fn test_first_sync_then_noop() {
        let (store, provider) = setup();
        let remote = RemoteSnapshot {
            identities: vec![identity("U1"), identity("U2")],
            groups: vec![group("G1")],
            memberships: vec![MembershipTuple::new("G1", "U1"), MembershipTuple::new("G1", "U2")],
        };

        let effect = sync(&store, provider.id, &remote).await;
        assert_eq!(effect.identities_inserted, vec!["U1", "U2"]);
        assert_eq!(effect.memberships_inserted.len(), 2);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.live_identities(provider.id).len(), 2);
        assert_eq!(snapshot.memberships.len(), 2);

        let mut pass = store.begin_pass(provider.id).await.unwrap().unwrap();
        let local = pass.load_local_state().await.unwrap();
        assert!(plan(&remote, &local).is_noop());
    }

    #[tokio::test]
    async fn test_removed_user_is_soft_deleted_with_memberships() {
        let (store, provider) = setup();
        sync(
            &store,
            provider.id,
            &RemoteSnapshot {
                identities: vec![identity("U1"), identity("U2")],
                groups: vec![group("G1")],
                memberships: vec![MembershipTuple::new("G1", "U1"), MembershipTuple::new("G1", "U2")],
            },
        )
        .await;

        let effect = sync(
            &store,
            provider.id,
            &RemoteSnapshot {
                identities: vec![identity("U1")],
                groups: vec![group("G1")],
                memberships: vec![MembershipTuple::new("G1", "U1")],
            },
        )
        .await;

        assert_eq!(effect.identities_deleted, vec!["U2"]);
        assert_eq!(effect.identities_updated, vec!["U1"]);
        assert_eq!(effect.memberships_deleted, vec![MembershipTuple::new("G1", "U2")]);

        let snapshot = store.snapshot();
        let deleted = snapshot
            .identities
            .values()
            .find(|row| row.provider_identifier == "U2")
            .unwrap();
        assert!(deleted.deleted_at.is_some());
        assert!(snapshot.actors[&deleted.actor_id].deleted_at.is_some());
        assert!(snapshot.memberships_are_consistent());
    }

    #[tokio::test]
    async fn test_failed_apply_commits_nothing() {
        let (store, provider) = setup();
        let before = store.snapshot();
        store.fail_next_apply();

        let mut pass = store.begin_pass(provider.id).await.unwrap().unwrap();
        let local = pass.load_local_state().await.unwrap();
        let plan = plan(
            &RemoteSnapshot {
                identities: vec![identity("U1")],
                groups: vec![group("G1")],
                memberships: vec![MembershipTuple::new("G1", "U1")],
            },
            &local,
        );
        let result = pass
            .apply(&plan, ApplyOptions::default(), OffsetDateTime::now_utc())
            .await;

        assert!(result.unwrap_err().is_constraint());
        let after = store.snapshot();
        assert_eq!(after.identities, before.identities);
        assert_eq!(after.groups, before.groups);
        assert!(after.memberships.is_empty());
    }

    #[tokio::test]
    async fn test_hard_group_deletion_removes_row() {
        let (store, provider) = setup();
        sync(
            &store,
            provider.id,
            &RemoteSnapshot {
                groups: vec![group("G1"), group("G2")],
                ..Default::default()
            },
        )
        .await;

        let mut pass = store.begin_pass(provider.id).await.unwrap().unwrap();
        let local = pass.load_local_state().await.unwrap();
        let plan = plan(
            &RemoteSnapshot {
                groups: vec![group("G1")],
                ..Default::default()
            },
            &local,
        );
        let options = ApplyOptions {
            group_deletion: GroupDeletion::Hard,
        };
        pass.apply(&plan, options, OffsetDateTime::now_utc()).await.unwrap();
        pass.finish().await.unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.groups.len(), 1);
        assert_eq!(snapshot.live_groups(provider.id)[0].provider_identifier, "G1");
    }

    #[tokio::test]
    async fn test_pass_lock_is_exclusive() {
        let (store, provider) = setup();

        let pass = store.begin_pass(provider.id).await.unwrap();
        assert!(pass.is_some());
        assert!(store.is_locked(provider.id));
        assert!(store.begin_pass(provider.id).await.unwrap().is_none());

        drop(pass);
        assert!(!store.is_locked(provider.id));
        assert!(store.begin_pass(provider.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_admin_emails() {
        let (store, provider) = setup();
        store.add_admin(provider.account_id, "Admin", "admin@example.com");
        store.add_admin(Uuid::new_v4(), "Other", "other@example.com");

        let mut pass = store.begin_pass(provider.id).await.unwrap().unwrap();
        assert_eq!(pass.admin_emails().await.unwrap(), vec!["admin@example.com"]);
    }

    #[tokio::test]
    async fn test_register_provider_keeps_existing_row() {
        let (store, mut provider) = setup();
        assert!(!store.register_provider(&provider).await.unwrap());

        provider.id = Uuid::new_v4();
        provider.name = "Second".into();
        assert!(store.register_provider(&provider).await.unwrap());
        assert_eq!(store.provider(provider.id).unwrap().name, "Second");
    }

    #[tokio::test]
    async fn test_leader_slot_failover() {
        let slot = LeaderSlot::default();
        let first = MemoryLeaderElection::new(slot.clone());
        let second = MemoryLeaderElection::new(slot);

        assert!(first.is_leader().await.unwrap());
        assert!(!second.is_leader().await.unwrap());

        first.resign().await.unwrap();
        assert!(second.is_leader().await.unwrap());
        assert!(!first.is_leader().await.unwrap());
    }
}
