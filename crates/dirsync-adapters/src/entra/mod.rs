//! Microsoft Entra ID adapter.
//!
//! Reads Microsoft Graph v1.0, following `@odata.nextLink`. Group members are
//! listed transitively so members of nested groups are included.

pub mod mapper;

use async_trait::async_trait;
use dirsync_core::{
    AdapterType, DirectoryAdapter, FetchPool, Provider, RemoteSnapshot, SyncFailure,
};
use serde::Deserialize;
use tracing::instrument;

use crate::client::{ApiClient, ApiError, Auth, Items, ListRequest, Pagination, endpoint};
use mapper::{EntraGroup, EntraUser};

const USER_FIELDS: &str = "id,accountEnabled,displayName,givenName,surname,mail,userPrincipalName";

/// `adapter_config` of a Microsoft Entra provider.
#[derive(Debug, Clone, Deserialize)]
pub struct EntraConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    pub access_token: String,
}

fn default_api_base_url() -> String {
    "https://graph.microsoft.com".to_string()
}

impl EntraConfig {
    fn auth(&self) -> Auth {
        Auth::Bearer(self.access_token.clone())
    }

    fn list(&self, path: &str, select: &str) -> Result<ListRequest, ApiError> {
        let mut url = endpoint(&self.api_base_url, &format!("/v1.0{path}"))?;
        url.query_pairs_mut()
            .append_pair("$select", select)
            .append_pair("$top", "999");
        Ok(ListRequest::new(
            url,
            Items::Field("value"),
            Pagination::BodyUrl {
                field: "@odata.nextLink",
            },
        ))
    }
}

/// [`DirectoryAdapter`] for Microsoft Entra ID.
#[derive(Debug, Clone)]
pub struct EntraAdapter {
    client: ApiClient,
}

impl EntraAdapter {
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Enabled user accounts.
    pub async fn list_users(&self, config: &EntraConfig) -> Result<Vec<EntraUser>, ApiError> {
        let request = config.list("/users", USER_FIELDS)?;
        let users: Vec<EntraUser> = self.client.list(&config.auth(), &request).await?;
        Ok(users.into_iter().filter(EntraUser::is_enabled).collect())
    }

    pub async fn list_groups(&self, config: &EntraConfig) -> Result<Vec<EntraGroup>, ApiError> {
        let request = config.list("/groups", "id,displayName")?;
        self.client.list(&config.auth(), &request).await
    }

    /// Enabled users that are direct or nested members of a group.
    pub async fn list_group_members(
        &self,
        config: &EntraConfig,
        group_id: &str,
    ) -> Result<Vec<EntraUser>, ApiError> {
        let request = config.list(
            &format!("/groups/{group_id}/transitiveMembers/microsoft.graph.user"),
            "id,accountEnabled",
        )?;
        let members: Vec<EntraUser> = self.client.list(&config.auth(), &request).await?;
        Ok(members.into_iter().filter(EntraUser::is_enabled).collect())
    }
}

#[async_trait]
impl DirectoryAdapter for EntraAdapter {
    fn adapter_type(&self) -> AdapterType {
        AdapterType::MicrosoftEntra
    }

    #[instrument(skip_all, fields(provider_id = %provider.id))]
    async fn gather(
        &self,
        provider: &Provider,
        pool: &FetchPool,
    ) -> Result<RemoteSnapshot, SyncFailure> {
        let config: EntraConfig = crate::adapter_config(provider)?;

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
