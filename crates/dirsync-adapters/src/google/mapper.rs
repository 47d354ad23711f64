//! Google Workspace Directory API payloads and their canonical mapping.
//!
//! Besides groups, organizational units are synced as groups: each user is
//! a member of the unit at their `orgUnitPath`.

use dirsync_core::{GroupAttrs, IdentityAttrs, MembershipTuple, ProviderState, RemoteSnapshot};
use serde::Deserialize;

use crate::mapping;

const ORG_UNIT_KEY_PREFIX: &str = "OU:";
const ORG_UNIT_NAME_PREFIX: &str = "OrgUnit:";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleUser {
    #[serde(default)]
    pub id: String,
    pub primary_email: Option<String>,
    #[serde(default)]
    pub name: GoogleUserName,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub archived: bool,
    pub org_unit_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleUserName {
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub full_name: Option<String>,
}

impl GoogleUser {
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.suspended && !self.archived
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleGroup {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: Option<String>,
}

/// An entry of `/groups/{id}/members`.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleMember {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub status: Option<String>,
}

impl GoogleMember {
    /// Active user members; nested groups and customers are skipped.
    #[must_use]
    pub fn is_active_user(&self) -> bool {
        self.kind == "USER" && self.status.as_deref().is_none_or(|status| status == "ACTIVE")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleOrgUnit {
    #[serde(default)]
    pub org_unit_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub org_unit_path: String,
}

pub fn identity_attrs(user: &GoogleUser) -> IdentityAttrs {
    let name = &user.name;
    mapping::identity(
        &user.id,
        ProviderState {
            email: mapping::non_blank(user.primary_email.as_deref()),
            name: mapping::non_blank(name.full_name.as_deref()).or_else(|| {
                mapping::full_name(name.given_name.as_deref(), name.family_name.as_deref())
            }),
            given_name: mapping::non_blank(name.given_name.as_deref()),
            family_name: mapping::non_blank(name.family_name.as_deref()),
        },
    )
}

pub fn group_attrs(group: &GoogleGroup) -> GroupAttrs {
    mapping::group(&group.id, &group.name)
}

pub fn org_unit_key(org_unit: &GoogleOrgUnit) -> String {
    if org_unit.org_unit_id.trim().is_empty() {
        String::new()
    } else {
        format!("{ORG_UNIT_KEY_PREFIX}{}", org_unit.org_unit_id)
    }
}

pub fn org_unit_attrs(org_unit: &GoogleOrgUnit) -> GroupAttrs {
    GroupAttrs {
        provider_identifier: org_unit_key(org_unit),
        name: format!("{ORG_UNIT_NAME_PREFIX}{}", org_unit.name),
    }
}

/// Maps already filtered users, groups with their members and org units.
pub fn snapshot(
    users: &[GoogleUser],
    groups: &[(GoogleGroup, Vec<GoogleMember>)],
    org_units: &[GoogleOrgUnit],
) -> RemoteSnapshot {
    let mut memberships: Vec<MembershipTuple> = groups
        .iter()
        .flat_map(|(group, members)| {
            let group_key = mapping::group_key(&group.id);
            members
                .iter()
                .map(move |member| MembershipTuple::new(group_key.clone(), member.id.clone()))
        })
        .collect();

    for org_unit in org_units {
        let key = org_unit_key(org_unit);
        memberships.extend(
            users
                .iter()
                .filter(|user| user.org_unit_path.as_deref() == Some(org_unit.org_unit_path.as_str()))
                .map(|user| MembershipTuple::new(key.clone(), user.id.clone())),
        );
    }

    RemoteSnapshot {
        identities: users.iter().map(identity_attrs).collect(),
        groups: groups
            .iter()
            .map(|(group, _)| group_attrs(group))
            .chain(org_units.iter().map(org_unit_attrs))
            .collect(),
        memberships,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(value: serde_json::Value) -> GoogleUser {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_identity_attrs() {
        let user = user(json!({
            "id": "1001",
            "primaryEmail": "jane@example.com",
            "name": {"givenName": "Jane", "familyName": "Doe", "fullName": "Jane Doe"},
            "orgUnitPath": "/Engineering"
        }));

        let attrs = identity_attrs(&user);
        assert_eq!(attrs.provider_identifier, "1001");
        assert_eq!(attrs.provider_state.email.as_deref(), Some("jane@example.com"));
        assert_eq!(attrs.actor.name, "Jane Doe");
    }

    #[test]
    fn test_suspended_and_archived_users_inactive() {
        assert!(user(json!({"id": "1"})).is_active());
        assert!(!user(json!({"id": "1", "suspended": true})).is_active());
        assert!(!user(json!({"id": "1", "archived": true})).is_active());
    }

    #[test]
    fn test_member_filter() {
        let member = |value| serde_json::from_value::<GoogleMember>(value).unwrap();
        assert!(member(json!({"id": "1", "type": "USER", "status": "ACTIVE"})).is_active_user());
        assert!(!member(json!({"id": "1", "type": "USER", "status": "SUSPENDED"})).is_active_user());
        assert!(!member(json!({"id": "2", "type": "GROUP"})).is_active_user());
    }

    #[test]
    fn test_org_units_become_groups() {
        let users = vec![
            user(json!({"id": "1", "orgUnitPath": "/Engineering"})),
            user(json!({"id": "2", "orgUnitPath": "/"})),
        ];
        let org_units: Vec<GoogleOrgUnit> = serde_json::from_value(json!([
            {"orgUnitId": "id:eng", "name": "Engineering", "orgUnitPath": "/Engineering"}
        ]))
        .unwrap();

        let snapshot = snapshot(&users, &[], &org_units);

        assert_eq!(snapshot.groups.len(), 1);
        assert_eq!(snapshot.groups[0].provider_identifier, "OU:id:eng");
        assert_eq!(snapshot.groups[0].name, "OrgUnit:Engineering");
        assert_eq!(snapshot.memberships, vec![MembershipTuple::new("OU:id:eng", "1")]);
    }
}
