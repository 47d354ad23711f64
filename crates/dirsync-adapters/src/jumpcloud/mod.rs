//! JumpCloud adapter.
//!
//! Users come from the v1 `systemusers` endpoint, groups and membership
//! edges from v2. Everything is offset paged and authenticated with the
//! `x-api-key` header.

pub mod mapper;

use async_trait::async_trait;
use dirsync_core::{
    AdapterType, DirectoryAdapter, FetchPool, Provider, RemoteSnapshot, SyncFailure,
};
use serde::Deserialize;
use tracing::instrument;

use crate::client::{ApiClient, ApiError, Auth, Items, ListRequest, Pagination, endpoint};
use mapper::{JumpCloudGroup, JumpCloudMember, JumpCloudUser};

pub const PAGE_SIZE: usize = 100;

const OFFSET_PAGINATION: Pagination = Pagination::Offset {
    skip_param: "skip",
    limit_param: "limit",
    page_size: PAGE_SIZE,
};

/// `adapter_config` of a JumpCloud provider.
#[derive(Debug, Clone, Deserialize)]
pub struct JumpCloudConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    pub api_key: String,
}

fn default_api_base_url() -> String {
    "https://console.jumpcloud.com".to_string()
}

impl JumpCloudConfig {
    fn auth(&self) -> Auth {
        Auth::ApiKey {
            header: "x-api-key",
            value: self.api_key.clone(),
        }
    }

    fn list(&self, path: &str, items: Items) -> Result<ListRequest, ApiError> {
        let url = endpoint(&self.api_base_url, path)?;
        Ok(ListRequest::new(url, items, OFFSET_PAGINATION))
    }
}

/// [`DirectoryAdapter`] for JumpCloud.
#[derive(Debug, Clone)]
pub struct JumpCloudAdapter {
    client: ApiClient,
}

impl JumpCloudAdapter {
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Activated, unsuspended users.
    pub async fn list_users(
        &self,
        config: &JumpCloudConfig,
    ) -> Result<Vec<JumpCloudUser>, ApiError> {
        let request = config.list("/api/systemusers", Items::Field("results"))?;
        let users: Vec<JumpCloudUser> = self.client.list(&config.auth(), &request).await?;
        Ok(users.into_iter().filter(JumpCloudUser::is_active).collect())
    }

    pub async fn list_groups(
        &self,
        config: &JumpCloudConfig,
    ) -> Result<Vec<JumpCloudGroup>, ApiError> {
        let request = config.list("/api/v2/usergroups", Items::Root)?;
        self.client.list(&config.auth(), &request).await
    }

    /// User members of a group. Edges only carry ids; inactive users are
    /// dropped when mapping.
    pub async fn list_group_members(
        &self,
        config: &JumpCloudConfig,
        group_id: &str,
    ) -> Result<Vec<JumpCloudMember>, ApiError> {
        let request = config.list(&format!("/api/v2/usergroups/{group_id}/members"), Items::Root)?;
        let members: Vec<JumpCloudMember> = self.client.list(&config.auth(), &request).await?;
        Ok(members.into_iter().filter(JumpCloudMember::is_user).collect())
    }
}

#[async_trait]
impl DirectoryAdapter for JumpCloudAdapter {
    fn adapter_type(&self) -> AdapterType {
        AdapterType::Jumpcloud
    }

    #[instrument(skip_all, fields(provider_id = %provider.id))]
    async fn gather(
        &self,
        provider: &Provider,
        pool: &FetchPool,
    ) -> Result<RemoteSnapshot, SyncFailure> {
        let config: JumpCloudConfig = crate::adapter_config(provider)?;

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
