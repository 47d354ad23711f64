//! Summary of what one sync pass changed.

use serde::Serialize;

use crate::planner::SyncPlan;
use crate::types::MembershipTuple;

/// What a single pass applied. Not persisted; used for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncEffect {
    pub identities_inserted: Vec<String>,
    pub identities_updated: Vec<String>,
    pub identities_deleted: Vec<String>,
    pub groups_upserted: Vec<String>,
    pub groups_deleted: Vec<String>,
    pub memberships_inserted: Vec<MembershipTuple>,
    pub memberships_deleted: Vec<MembershipTuple>,
}

impl SyncEffect {
    /// The effect of applying `plan` in full.
    #[must_use]
    pub fn from_plan(plan: &SyncPlan) -> Self {
        Self {
            identities_inserted: plan.identity_insert_ids.iter().cloned().collect(),
            identities_updated: plan.identity_update_ids.iter().cloned().collect(),
            identities_deleted: plan.identity_delete_ids.iter().cloned().collect(),
            groups_upserted: plan.group_upsert_ids.iter().cloned().collect(),
            groups_deleted: plan.group_delete_ids.iter().cloned().collect(),
            memberships_inserted: plan.membership_insert_tuples.iter().cloned().collect(),
            memberships_deleted: plan.membership_delete_tuples.iter().cloned().collect(),
        }
    }

    /// Counts in a fixed order, convenient for structured logging.
    #[must_use]
    pub fn counts(&self) -> EffectCounts {
        EffectCounts {
            identities_inserted: self.identities_inserted.len(),
            identities_updated: self.identities_updated.len(),
            identities_deleted: self.identities_deleted.len(),
            groups_upserted: self.groups_upserted.len(),
            groups_deleted: self.groups_deleted.len(),
            memberships_inserted: self.memberships_inserted.len(),
            memberships_deleted: self.memberships_deleted.len(),
        }
    }
}

/// Per-operation counts of a [`SyncEffect`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EffectCounts {
    pub identities_inserted: usize,
    pub identities_updated: usize,
    pub identities_deleted: usize,
    pub groups_upserted: usize,
    pub groups_deleted: usize,
    pub memberships_inserted: usize,
    pub memberships_deleted: usize,
}
