//! Reconciliation planner.
//!
//! Diffs a provider's remote snapshot against its local state and produces
//! the insert/update/delete sets for identities, groups and memberships.
//! Pure set arithmetic; no I/O.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{GroupAttrs, IdentityAttrs, LocalState, MembershipTuple, RemoteSnapshot};

/// Planned mutations for one provider.
///
/// Key sets are ordered so that plans, effects and logs are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub identity_insert_ids: BTreeSet<String>,
    /// Every identity present on both sides. Its `last_synced_at` is refreshed.
    pub identity_update_ids: BTreeSet<String>,
    pub identity_delete_ids: BTreeSet<String>,
    /// Subset of `identity_update_ids` whose profile or actor attributes changed.
    pub changed_identity_ids: BTreeSet<String>,

    /// Every remote group; groups are always upserted.
    pub group_upsert_ids: BTreeSet<String>,
    pub group_delete_ids: BTreeSet<String>,
    /// Subset of `group_upsert_ids` that are new or renamed.
    pub changed_group_ids: BTreeSet<String>,

    pub membership_insert_tuples: BTreeSet<MembershipTuple>,
    pub membership_delete_tuples: BTreeSet<MembershipTuple>,

    /// Deduplicated remote identities, by provider identifier.
    pub identities: BTreeMap<String, IdentityAttrs>,
    /// Deduplicated remote groups, by provider identifier.
    pub groups: BTreeMap<String, GroupAttrs>,
}

impl SyncPlan {
    /// Returns `true` when applying the plan would change nothing beyond
    /// `last_synced_at` timestamps.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.identity_insert_ids.is_empty()
            && self.identity_delete_ids.is_empty()
            && self.changed_identity_ids.is_empty()
            && self.group_delete_ids.is_empty()
            && self.changed_group_ids.is_empty()
            && self.membership_insert_tuples.is_empty()
            && self.membership_delete_tuples.is_empty()
    }
}

/// Computes the plan for one provider.
///
/// Records with an empty provider identifier are dropped, duplicates keep
/// the last-seen record, and membership tuples that reference an identity or
/// group missing from the remote snapshot are dropped so that no membership
/// can dangle.
#[must_use]
pub fn plan(remote: &RemoteSnapshot, local: &LocalState) -> SyncPlan {
    // 1. Normalize remote collections
    let identities: BTreeMap<String, IdentityAttrs> = remote
        .identities
        .iter()
        .filter(|attrs| has_key(&attrs.provider_identifier))
        .map(|attrs| (attrs.provider_identifier.clone(), attrs.clone()))
        .collect();

    let groups: BTreeMap<String, GroupAttrs> = remote
        .groups
        .iter()
        .filter(|attrs| has_key(&attrs.provider_identifier))
        .map(|attrs| (attrs.provider_identifier.clone(), attrs.clone()))
        .collect();

    let remote_tuples: BTreeSet<MembershipTuple> = remote
        .memberships
        .iter()
        .filter(|tuple| {
            groups.contains_key(&tuple.group_provider_identifier)
                && identities.contains_key(&tuple.identity_provider_identifier)
        })
        .cloned()
        .collect();

    let remote_identity_ids: BTreeSet<&String> = identities.keys().collect();
    let local_identity_ids: BTreeSet<&String> = local.identities.keys().collect();
    let remote_group_ids: BTreeSet<&String> = groups.keys().collect();
    let local_group_ids: BTreeSet<&String> = local.groups.keys().collect();

    // 2. Identities
    let identity_insert_ids = owned(remote_identity_ids.difference(&local_identity_ids));
    let identity_update_ids = owned(remote_identity_ids.intersection(&local_identity_ids));
    let identity_delete_ids = owned(local_identity_ids.difference(&remote_identity_ids));

    let changed_identity_ids = identity_update_ids
        .iter()
        .filter(|id| {
            let remote = &identities[*id];
            let current = &local.identities[*id];
            remote.provider_state != current.provider_state || remote.actor != current.actor
        })
        .cloned()
        .collect();

    // 3. Groups
    let group_upsert_ids: BTreeSet<String> = groups.keys().cloned().collect();
    let group_delete_ids = owned(local_group_ids.difference(&remote_group_ids));

    let changed_group_ids = groups
        .values()
        .filter(|group| {
            local
                .groups
                .get(&group.provider_identifier)
                .is_none_or(|current| current.name != group.name)
        })
        .map(|group| group.provider_identifier.clone())
        .collect();

    // 4. Memberships
    let membership_insert_tuples = remote_tuples
        .difference(&local.memberships)
        .cloned()
        .collect();
    let membership_delete_tuples = local
        .memberships
        .difference(&remote_tuples)
        .cloned()
        .collect();

    let plan = SyncPlan {
        identity_insert_ids,
        identity_update_ids,
        identity_delete_ids,
        changed_identity_ids,
        group_upsert_ids,
        group_delete_ids,
        changed_group_ids,
        membership_insert_tuples,
        membership_delete_tuples,
        identities,
        groups,
    };

    tracing::debug!(
        identities_to_insert = plan.identity_insert_ids.len(),
        identities_to_update = plan.identity_update_ids.len(),
        identities_changed = plan.changed_identity_ids.len(),
        identities_to_delete = plan.identity_delete_ids.len(),
        groups_to_upsert = plan.group_upsert_ids.len(),
        groups_to_delete = plan.group_delete_ids.len(),
        memberships_to_insert = plan.membership_insert_tuples.len(),
        memberships_to_delete = plan.membership_delete_tuples.len(),
        "Planned directory sync"
    );

    plan
}

fn has_key(provider_identifier: &str) -> bool {
    !provider_identifier.trim().is_empty()
}

fn owned<'a>(ids: impl Iterator<Item = &'a &'a String>) -> BTreeSet<String> {
    ids.map(|id| (*id).clone()).collect()
}
