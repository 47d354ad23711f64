//! Domain types: providers, canonical attribute maps and local state.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Providers
// =============================================================================

/// The external directory implementation a provider talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterType {
    Okta,
    Jumpcloud,
    GoogleWorkspace,
    MicrosoftEntra,
    /// Synthetic directory used for load tests and local development.
    Mock,
}

impl AdapterType {
    /// All adapter types, in scheduling order.
    pub const ALL: [AdapterType; 5] = [
        AdapterType::Okta,
        AdapterType::Jumpcloud,
        AdapterType::GoogleWorkspace,
        AdapterType::MicrosoftEntra,
        AdapterType::Mock,
    ];

    /// Returns the tag stored in the `providers.adapter` column.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Okta => "okta",
            Self::Jumpcloud => "jumpcloud",
            Self::GoogleWorkspace => "google_workspace",
            Self::MicrosoftEntra => "microsoft_entra",
            Self::Mock => "mock",
        }
    }
}

impl fmt::Display for AdapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|adapter| adapter.as_str() == s)
            .ok_or_else(|| format!("unknown adapter type: {s}"))
    }
}

/// A configured, account-scoped connection to one external directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Provider {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub adapter: AdapterType,
    /// Adapter-specific settings: API base URL, credentials, mock sizes.
    pub adapter_config: serde_json::Value,
    /// Set when an administrator disables the provider.
    pub disabled_at: Option<OffsetDateTime>,
    /// Set when the engine stops syncing after repeated failures.
    pub sync_disabled_at: Option<OffsetDateTime>,
    pub last_synced_at: Option<OffsetDateTime>,
    pub last_sync_error: Option<String>,
    /// Machine-readable reason of the last failure, e.g. `invalid_credentials`.
    pub last_sync_error_reason: Option<String>,
    /// Length of the current failure streak.
    pub last_syncs_failed: u32,
    /// When the current streak last triggered an administrator email.
    pub sync_error_emailed_at: Option<OffsetDateTime>,
}

impl Provider {
    /// Creates an enabled provider with a clean sync history.
    #[must_use]
    pub fn new(
        account_id: Uuid,
        name: impl Into<String>,
        adapter: AdapterType,
        adapter_config: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            name: name.into(),
            adapter,
            adapter_config,
            disabled_at: None,
            sync_disabled_at: None,
            last_synced_at: None,
            last_sync_error: None,
            last_sync_error_reason: None,
            last_syncs_failed: 0,
            sync_error_emailed_at: None,
        }
    }

    /// Returns `true` if the scheduler should pick this provider up.
    #[must_use]
    pub fn is_sync_enabled(&self) -> bool {
        self.disabled_at.is_none() && self.sync_disabled_at.is_none()
    }
}

// =============================================================================
// Canonical attributes
// =============================================================================

/// Kind of internal principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    AccountUser,
    AccountAdminUser,
    ServiceAccount,
}

impl ActorType {
    /// Returns the tag stored in the `actors.type` column.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccountUser => "account_user",
            Self::AccountAdminUser => "account_admin_user",
            Self::ServiceAccount => "service_account",
        }
    }
}

impl FromStr for ActorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "account_user" => Ok(Self::AccountUser),
            "account_admin_user" => Ok(Self::AccountAdminUser),
            "service_account" => Ok(Self::ServiceAccount),
            other => Err(format!("unknown actor type: {other}")),
        }
    }
}

/// Denormalized profile snapshot stored on the identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
}

/// Attributes of the actor linked to an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorAttrs {
    #[serde(rename = "type")]
    pub kind: ActorType,
    pub name: String,
}

impl ActorAttrs {
    /// Actor attributes for a synced directory user.
    #[must_use]
    pub fn account_user(name: impl Into<String>) -> Self {
        Self {
            kind: ActorType::AccountUser,
            name: name.into(),
        }
    }
}

/// A remote user, normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityAttrs {
    /// The remote system's immutable user key.
    pub provider_identifier: String,
    pub provider_state: ProviderState,
    pub actor: ActorAttrs,
}

/// A remote group, normalized. `name` already carries its prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAttrs {
    pub provider_identifier: String,
    pub name: String,
}

/// "This identity belongs to this group", keyed by provider identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MembershipTuple {
    pub group_provider_identifier: String,
    pub identity_provider_identifier: String,
}

impl MembershipTuple {
    #[must_use]
    pub fn new(group: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            group_provider_identifier: group.into(),
            identity_provider_identifier: identity.into(),
        }
    }
}

/// Everything an adapter gathered for one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSnapshot {
    pub identities: Vec<IdentityAttrs>,
    pub groups: Vec<GroupAttrs>,
    pub memberships: Vec<MembershipTuple>,
}

// =============================================================================
// Local state
// =============================================================================

/// A live identity owned by the provider being synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub identity_id: Uuid,
    pub actor_id: Uuid,
    pub provider_state: ProviderState,
    pub actor: ActorAttrs,
}

/// A live group owned by the provider being synced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalGroup {
    pub group_id: Uuid,
    pub name: String,
}

/// The provider's current internal state, keyed by provider identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalState {
    pub identities: BTreeMap<String, LocalIdentity>,
    pub groups: BTreeMap<String, LocalGroup>,
    pub memberships: BTreeSet<MembershipTuple>,
}

/// How groups that disappeared remotely are removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupDeletion {
    /// Mark the group deleted and keep the row.
    #[default]
    Soft,
    /// Remove the row.
    Hard,
}

/// Knobs for applying a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    pub group_deletion: GroupDeletion,
}
