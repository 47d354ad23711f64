//! Helpers shared by the per-provider mappers.

use dirsync_core::{ActorAttrs, GroupAttrs, IdentityAttrs, ProviderState};

/// Prefix of group provider identifiers.
pub const GROUP_KEY_PREFIX: &str = "G:";
/// Prefix of synced group names.
pub const GROUP_NAME_PREFIX: &str = "Group:";

/// Canonical attributes of a remote group.
pub fn group(remote_id: &str, remote_name: &str) -> GroupAttrs {
    GroupAttrs {
        provider_identifier: group_key(remote_id),
        name: format!("{GROUP_NAME_PREFIX}{remote_name}"),
    }
}

/// Provider identifier of a remote group. Empty ids stay empty so the
/// planner drops them.
pub fn group_key(remote_id: &str) -> String {
    if remote_id.trim().is_empty() {
        String::new()
    } else {
        format!("{GROUP_KEY_PREFIX}{remote_id}")
    }
}

/// Canonical attributes of a remote user.
///
/// The actor name falls back from the full name to the email and finally
/// to the remote id.
pub fn identity(remote_id: &str, state: ProviderState) -> IdentityAttrs {
    let actor_name = state
        .name
        .clone()
        .or_else(|| state.email.clone())
        .unwrap_or_else(|| remote_id.to_string());

    IdentityAttrs {
        provider_identifier: remote_id.to_string(),
        provider_state: state,
        actor: ActorAttrs::account_user(actor_name),
    }
}

/// Joins given and family names, skipping blanks.
pub fn full_name(given: Option<&str>, family: Option<&str>) -> Option<String> {
    let parts: Vec<&str> = [given, family]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    (!parts.is_empty()).then(|| parts.join(" "))
}

/// Turns blank strings into `None`.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
