//! JumpCloud payloads and their canonical mapping.

use std::collections::HashSet;

use dirsync_core::{GroupAttrs, IdentityAttrs, MembershipTuple, ProviderState, RemoteSnapshot};
use serde::Deserialize;

use crate::mapping;

/// A user from `/api/systemusers`.
#[derive(Debug, Clone, Deserialize)]
pub struct JumpCloudUser {
    #[serde(default)]
    pub id: String,
    /// v1 responses carry the key as `_id`, newer ones as `id` or both.
    #[serde(rename = "_id")]
    pub object_id: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub displayname: Option<String>,
    #[serde(default)]
    pub suspended: bool,
    pub activated: Option<bool>,
    pub state: Option<String>,
}

impl JumpCloudUser {
    #[must_use]
    pub fn key(&self) -> &str {
        match self.object_id.as_deref() {
            Some(object_id) if self.id.is_empty() => object_id,
            _ => &self.id,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.suspended
            && self.activated != Some(false)
            && self.state.as_deref().is_none_or(|state| state == "ACTIVATED")
    }
}

/// A user group from `/api/v2/usergroups`.
#[derive(Debug, Clone, Deserialize)]
pub struct JumpCloudGroup {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// An edge from `/api/v2/usergroups/{id}/members`.
#[derive(Debug, Clone, Deserialize)]
pub struct JumpCloudMember {
    pub to: JumpCloudRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JumpCloudRef {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl JumpCloudMember {
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.to.kind == "user"
    }
}

pub fn identity_attrs(user: &JumpCloudUser) -> IdentityAttrs {
    mapping::identity(
        user.key(),
        ProviderState {
            email: mapping::non_blank(user.email.as_deref()),
            name: mapping::non_blank(user.displayname.as_deref())
                .or_else(|| mapping::full_name(user.firstname.as_deref(), user.lastname.as_deref()))
                .or_else(|| mapping::non_blank(user.username.as_deref())),
            given_name: mapping::non_blank(user.firstname.as_deref()),
            family_name: mapping::non_blank(user.lastname.as_deref()),
        },
    )
}

pub fn group_attrs(group: &JumpCloudGroup) -> GroupAttrs {
    mapping::group(&group.id, &group.name)
}

/// Maps already filtered users and groups with their member edges.
///
/// Membership edges only carry ids, so members that are not in `users`
/// (suspended or inactive) are dropped here.
pub fn snapshot(
    users: &[JumpCloudUser],
    groups: &[(JumpCloudGroup, Vec<JumpCloudMember>)],
) -> RemoteSnapshot {
    let active: HashSet<&str> = users.iter().map(JumpCloudUser::key).collect();

    RemoteSnapshot {
        identities: users.iter().map(identity_attrs).collect(),
        groups: groups.iter().map(|(group, _)| group_attrs(group)).collect(),
        memberships: groups
            .iter()
            .flat_map(|(group, members)| {
                let group_key = mapping::group_key(&group.id);
                members
                    .iter()
                    .filter(|member| member.is_user() && active.contains(member.to.id.as_str()))
                    .map(move |member| MembershipTuple::new(group_key.clone(), member.to.id.clone()))
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(value: serde_json::Value) -> JumpCloudUser {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_identity_attrs_from_v1_user() {
        let user = user(json!({
            "_id": "5f1",
            "email": "jane@example.com",
            "username": "jane",
            "firstname": "Jane",
            "lastname": "Doe",
            "activated": true,
            "suspended": false,
            "state": "ACTIVATED"
        }));

        let attrs = identity_attrs(&user);
        assert_eq!(attrs.provider_identifier, "5f1");
        assert_eq!(attrs.provider_state.name.as_deref(), Some("Jane Doe"));
        assert!(user.is_active());
    }

    #[test]
    fn test_inactive_users() {
        assert!(!user(json!({"_id": "1", "suspended": true})).is_active());
        assert!(!user(json!({"_id": "1", "activated": false})).is_active());
        assert!(!user(json!({"_id": "1", "state": "SUSPENDED"})).is_active());
    }

    #[test]
    fn test_members_filtered_to_active_users() {
        let users = vec![user(json!({"_id": "u1", "email": "a@example.com"}))];
        let group: JumpCloudGroup =
            serde_json::from_value(json!({"id": "g1", "name": "Ops"})).unwrap();
        let members: Vec<JumpCloudMember> = serde_json::from_value(json!([
            {"to": {"id": "u1", "type": "user"}},
            {"to": {"id": "u2", "type": "user"}},
            {"to": {"id": "g2", "type": "user_group"}}
        ]))
        .unwrap();

        let snapshot = snapshot(&users, &[(group, members)]);
        assert_eq!(snapshot.memberships, vec![MembershipTuple::new("G:g1", "u1")]);
    }
}
