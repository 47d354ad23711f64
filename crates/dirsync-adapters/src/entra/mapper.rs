//! Microsoft Graph payloads and their canonical mapping.

use dirsync_core::{GroupAttrs, IdentityAttrs, MembershipTuple, ProviderState, RemoteSnapshot};
use serde::Deserialize;

use crate::mapping;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntraUser {
    #[serde(default)]
    pub id: String,
    pub account_enabled: Option<bool>,
    pub display_name: Option<String>,
    pub given_name: Option<String>,
    pub surname: Option<String>,
    pub mail: Option<String>,
    pub user_principal_name: Option<String>,
}

impl EntraUser {
    /// Graph omits `accountEnabled` unless selected; a missing value counts
    /// as enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.account_enabled.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntraGroup {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub display_name: String,
}

pub fn identity_attrs(user: &EntraUser) -> IdentityAttrs {
    mapping::identity(
        &user.id,
        ProviderState {
            email: mapping::non_blank(user.mail.as_deref().or(user.user_principal_name.as_deref())),
            name: mapping::non_blank(user.display_name.as_deref())
                .or_else(|| mapping::full_name(user.given_name.as_deref(), user.surname.as_deref())),
            given_name: mapping::non_blank(user.given_name.as_deref()),
            family_name: mapping::non_blank(user.surname.as_deref()),
        },
    )
}

pub fn group_attrs(group: &EntraGroup) -> GroupAttrs {
    mapping::group(&group.id, &group.display_name)
}

/// Maps already filtered users and groups with their transitive members.
pub fn snapshot(users: &[EntraUser], groups: &[(EntraGroup, Vec<EntraUser>)]) -> RemoteSnapshot {
    RemoteSnapshot {
        identities: users.iter().map(identity_attrs).collect(),
        groups: groups.iter().map(|(group, _)| group_attrs(group)).collect(),
        memberships: groups
            .iter()
            .flat_map(|(group, members)| {
                let group_key = mapping::group_key(&group.id);
                members
                    .iter()
                    .map(move |member| MembershipTuple::new(group_key.clone(), member.id.clone()))
            })
            .collect(),
    }
}
