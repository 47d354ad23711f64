//! Okta adapter.
//!
//! Lists users, groups and group members through the Okta management API,
//! following `Link: rel="next"` pagination.

pub mod mapper;

use async_trait::async_trait;
use dirsync_core::{
    AdapterType, DirectoryAdapter, FetchPool, Provider, RemoteSnapshot, SyncFailure,
};
use serde::Deserialize;
use tracing::instrument;

use crate::client::{ApiClient, ApiError, Auth, Items, ListRequest, Pagination, endpoint};
use mapper::{OktaGroup, OktaUser};

const PAGE_SIZE: &str = "200";

/// `adapter_config` of an Okta provider.
#[derive(Debug, Clone, Deserialize)]
pub struct OktaConfig {
    /// Organization URL, e.g. `https://example.okta.com`.
    pub api_base_url: String,
    /// OAuth access token for the management API.
    pub access_token: String,
}

impl OktaConfig {
    fn auth(&self) -> Auth {
        Auth::Bearer(self.access_token.clone())
    }

    fn list(&self, path: &str) -> Result<ListRequest, ApiError> {
        let mut url = endpoint(&self.api_base_url, path)?;
        url.query_pairs_mut().append_pair("limit", PAGE_SIZE);
        Ok(ListRequest::new(url, Items::Root, Pagination::LinkHeader))
    }
}

/// [`DirectoryAdapter`] for Okta.
#[derive(Debug, Clone)]
pub struct OktaAdapter {
    client: ApiClient,
}

impl OktaAdapter {
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Active users of the organization.
    pub async fn list_users(&self, config: &OktaConfig) -> Result<Vec<OktaUser>, ApiError> {
        let request = config.list("/api/v1/users")?;
        let users: Vec<OktaUser> = self.client.list(&config.auth(), &request).await?;
        Ok(users.into_iter().filter(OktaUser::is_active).collect())
    }

    pub async fn list_groups(&self, config: &OktaConfig) -> Result<Vec<OktaGroup>, ApiError> {
        self.client
            .list(&config.auth(), &config.list("/api/v1/groups")?)
            .await
    }

    /// Active members of one group.
    pub async fn list_group_members(
        &self,
        config: &OktaConfig,
        group_id: &str,
    ) -> Result<Vec<OktaUser>, ApiError> {
        let request = config.list(&format!("/api/v1/groups/{group_id}/users"))?;
        let members: Vec<OktaUser> = self.client.list(&config.auth(), &request).await?;
        Ok(members.into_iter().filter(OktaUser::is_active).collect())
    }
}

#[async_trait]
impl DirectoryAdapter for OktaAdapter {
    fn adapter_type(&self) -> AdapterType {
        AdapterType::Okta
    }

    #[instrument(skip_all, fields(provider_id = %provider.id))]
    async fn gather(
        &self,
        provider: &Provider,
        pool: &FetchPool,
    ) -> Result<RemoteSnapshot, SyncFailure> {
        let config: OktaConfig = crate::adapter_config(provider)?;

        let (users, groups) = tokio::try_join!(
            pool.run(async { self.list_users(&config).await.map_err(SyncFailure::from) }),
            pool.run(async { self.list_groups(&config).await.map_err(SyncFailure::from) }),
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

        Ok(mapper::snapshot(&users, &groups))
    }
}
