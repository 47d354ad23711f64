//! Google Workspace adapter.
//!
//! Uses the Admin SDK Directory API. Pages are chained through the
//! `nextPageToken` body field.

pub mod mapper;

use async_trait::async_trait;
use dirsync_core::{
    AdapterType, DirectoryAdapter, FetchPool, Provider, RemoteSnapshot, SyncFailure,
};
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use crate::client::{ApiClient, ApiError, Auth, Items, ListRequest, Pagination, endpoint};
use mapper::{GoogleGroup, GoogleMember, GoogleOrgUnit, GoogleUser};

const TOKEN_PAGINATION: Pagination = Pagination::BodyToken {
    field: "nextPageToken",
    param: "pageToken",
};

/// `adapter_config` of a Google Workspace provider.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    pub access_token: String,
    /// Customer id, `my_customer` for the token owner's account.
    #[serde(default = "default_customer")]
    pub customer: String,
    /// Sync organizational units as groups.
    #[serde(default = "default_true")]
    pub sync_org_units: bool,
}

fn default_api_base_url() -> String {
    "https://admin.googleapis.com".to_string()
}

fn default_customer() -> String {
    "my_customer".to_string()
}

fn default_true() -> bool {
    true
}

impl GoogleConfig {
    fn auth(&self) -> Auth {
        Auth::Bearer(self.access_token.clone())
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        endpoint(&self.api_base_url, &format!("/admin/directory/v1{path}"))
    }
}

/// [`DirectoryAdapter`] for Google Workspace.
#[derive(Debug, Clone)]
pub struct GoogleAdapter {
    client: ApiClient,
}

impl GoogleAdapter {
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Users that are neither suspended nor archived.
    pub async fn list_users(&self, config: &GoogleConfig) -> Result<Vec<GoogleUser>, ApiError> {
        let mut url = config.url("/users")?;
        url.query_pairs_mut()
            .append_pair("customer", &config.customer)
            .append_pair("maxResults", "500")
            .append_pair("showDeleted", "false");
        let request = ListRequest::new(url, Items::OptionalField("users"), TOKEN_PAGINATION);

        let users: Vec<GoogleUser> = self.client.list(&config.auth(), &request).await?;
        Ok(users.into_iter().filter(GoogleUser::is_active).collect())
    }

    pub async fn list_groups(&self, config: &GoogleConfig) -> Result<Vec<GoogleGroup>, ApiError> {
        let mut url = config.url("/groups")?;
        url.query_pairs_mut()
            .append_pair("customer", &config.customer)
            .append_pair("maxResults", "200");
        let request = ListRequest::new(url, Items::OptionalField("groups"), TOKEN_PAGINATION);

        self.client.list(&config.auth(), &request).await
    }

    /// Active user members of a group, including members of nested groups.
    pub async fn list_group_members(
        &self,
        config: &GoogleConfig,
        group_id: &str,
    ) -> Result<Vec<GoogleMember>, ApiError> {
        let mut url = config.url(&format!("/groups/{group_id}/members"))?;
        url.query_pairs_mut()
            .append_pair("includeDerivedMembership", "true")
            .append_pair("maxResults", "200");
        let request = ListRequest::new(url, Items::OptionalField("members"), TOKEN_PAGINATION);

        let members: Vec<GoogleMember> = self.client.list(&config.auth(), &request).await?;
        Ok(members
            .into_iter()
            .filter(GoogleMember::is_active_user)
            .collect())
    }

    pub async fn list_org_units(
        &self,
        config: &GoogleConfig,
    ) -> Result<Vec<GoogleOrgUnit>, ApiError> {
        let mut url = config.url(&format!("/customer/{}/orgunits", config.customer))?;
        url.query_pairs_mut().append_pair("type", "all");
        let request = ListRequest::new(
            url,
            Items::OptionalField("organizationUnits"),
            Pagination::None,
        );

        self.client.list(&config.auth(), &request).await
    }
}

#[async_trait]
impl DirectoryAdapter for GoogleAdapter {
    fn adapter_type(&self) -> AdapterType {
        AdapterType::GoogleWorkspace
    }

    #[instrument(skip_all, fields(provider_id = %provider.id))]
    async fn gather(
        &self,
        provider: &Provider,
        pool: &FetchPool,
    ) -> Result<RemoteSnapshot, SyncFailure> {
        let config: GoogleConfig = crate::adapter_config(provider)?;

        let (users, groups, org_units) = tokio::try_join!(
            pool.run(async { self.list_users(&config).await.map_err(SyncFailure::from) }),
            pool.run(async { self.list_groups(&config).await.map_err(SyncFailure::from) }),
            pool.run(async {
                if config.sync_org_units {
                    self.list_org_units(&config).await.map_err(SyncFailure::from)
                } else {
                    Ok(Vec::new())
                }
            }),
        )?;

        let groups = pool
            .run_all(groups.into_iter().map(|group| {
                let config = &config;
                async move {
                    let members = self
                        .list_group_members(config, &group.id)
                        .await
                        .map_err(SyncFailure::from)?;
                    Ok::<_, SyncFailure>((group, members))
                }
            }))
            .await?;

        Ok(mapper::snapshot(&users, &groups, &org_units))
    }
}
