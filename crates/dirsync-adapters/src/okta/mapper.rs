//! Okta payloads and their canonical mapping.

use dirsync_core::{GroupAttrs, IdentityAttrs, MembershipTuple, ProviderState, RemoteSnapshot};
use serde::Deserialize;

use crate::mapping;

/// A user from `/api/v1/users` or `/api/v1/groups/{id}/users`.
#[derive(Debug, Clone, Deserialize)]
pub struct OktaUser {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub profile: OktaUserProfile,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OktaUserProfile {
    pub email: Option<String>,
    pub login: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
}

impl OktaUser {
    /// Users that can sign in. Staged, provisioned, suspended and
    /// deprovisioned users are not synced.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self.status.as_str(),
            "ACTIVE" | "PASSWORD_EXPIRED" | "LOCKED_OUT" | "RECOVERY"
        )
    }
}

/// A group from `/api/v1/groups`.
#[derive(Debug, Clone, Deserialize)]
pub struct OktaGroup {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub profile: OktaGroupProfile,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OktaGroupProfile {
    #[serde(default)]
    pub name: String,
}

pub fn identity_attrs(user: &OktaUser) -> IdentityAttrs {
    let profile = &user.profile;
    let name = mapping::non_blank(profile.display_name.as_deref()).or_else(|| {
        mapping::full_name(profile.first_name.as_deref(), profile.last_name.as_deref())
    });

    mapping::identity(
        &user.id,
        ProviderState {
            email: mapping::non_blank(profile.email.as_deref().or(profile.login.as_deref())),
            name,
            given_name: mapping::non_blank(profile.first_name.as_deref()),
            family_name: mapping::non_blank(profile.last_name.as_deref()),
        },
    )
}

pub fn group_attrs(group: &OktaGroup) -> GroupAttrs {
    mapping::group(&group.id, &group.profile.name)
}

pub fn membership_tuples(group: &OktaGroup, members: &[OktaUser]) -> Vec<MembershipTuple> {
    let group_key = mapping::group_key(&group.id);
    members
        .iter()
        .map(|member| MembershipTuple::new(group_key.clone(), member.id.clone()))
        .collect()
}

/// Maps already filtered users and groups with their members.
pub fn snapshot(users: &[OktaUser], groups: &[(OktaGroup, Vec<OktaUser>)]) -> RemoteSnapshot {
    RemoteSnapshot {
        identities: users.iter().map(identity_attrs).collect(),
        groups: groups.iter().map(|(group, _)| group_attrs(group)).collect(),
        memberships: groups
            .iter()
            .flat_map(|(group, members)| membership_tuples(group, members))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(value: serde_json::Value) -> OktaUser {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_identity_from_profile() {
        let user = user(json!({
            "id": "00u1",
            "status": "ACTIVE",
            "profile": {
                "firstName": "Jane",
                "lastName": "Doe",
                "email": "jane@example.com",
                "login": "jane@example.com"
            }
        }));

        let attrs = identity_attrs(&user);
        assert_eq!(attrs.provider_identifier, "00u1");
        assert_eq!(attrs.provider_state.name.as_deref(), Some("Jane Doe"));
        assert_eq!(attrs.provider_state.given_name.as_deref(), Some("Jane"));
        assert_eq!(attrs.provider_state.email.as_deref(), Some("jane@example.com"));
        assert_eq!(attrs.actor.name, "Jane Doe");
    }

    #[test]
    fn test_login_fallback_for_email() {
        let user = user(json!({
            "id": "00u2",
            "status": "ACTIVE",
            "profile": {"login": "bob@example.com"}
        }));
        let attrs = identity_attrs(&user);
        assert_eq!(attrs.provider_state.email.as_deref(), Some("bob@example.com"));
        assert_eq!(attrs.actor.name, "bob@example.com");
    }

    #[test]
    fn test_status_filter() {
        for (status, active) in [
            ("ACTIVE", true),
            ("LOCKED_OUT", true),
            ("STAGED", false),
            ("SUSPENDED", false),
            ("DEPROVISIONED", false),
        ] {
            let user = user(json!({"id": "x", "status": status}));
            assert_eq!(user.is_active(), active, "{status}");
        }
    }

    #[test]
    fn test_snapshot_with_memberships() {
        let jane = user(json!({"id": "00u1", "status": "ACTIVE", "profile": {"email": "jane@example.com"}}));
        let group: OktaGroup =
            serde_json::from_value(json!({"id": "00g1", "profile": {"name": "Engineering"}})).unwrap();

        let snapshot = snapshot(std::slice::from_ref(&jane), &[(group, vec![jane.clone()])]);

        assert_eq!(snapshot.identities.len(), 1);
        assert_eq!(snapshot.groups[0].provider_identifier, "G:00g1");
        assert_eq!(snapshot.groups[0].name, "Group:Engineering");
        assert_eq!(snapshot.memberships, vec![MembershipTuple::new("G:00g1", "00u1")]);
    }
}
