//! Synthetic directory for load tests and local development.
//!
//! Generates `num_actors` users and `num_groups` groups; each group gets a
//! random subset of at most `max_actors_per_group` users. With a fixed
//! `seed` the output is fully deterministic. Without one, the provider id
//! seeds the generator so a provider keeps seeing the same directory.

use async_trait::async_trait;
use dirsync_core::{
    AdapterType, DirectoryAdapter, FetchPool, GroupAttrs, IdentityAttrs, MembershipTuple,
    Provider, ProviderState, RemoteSnapshot, SyncFailure,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::mapping;

/// `adapter_config` of a mock provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MockConfig {
    #[serde(default = "default_num_actors")]
    pub num_actors: usize,
    #[serde(default = "default_num_groups")]
    pub num_groups: usize,
    #[serde(default = "default_max_actors_per_group")]
    pub max_actors_per_group: usize,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_num_actors() -> usize {
    10
}

fn default_num_groups() -> usize {
    3
}

fn default_max_actors_per_group() -> usize {
    5
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            num_actors: default_num_actors(),
            num_groups: default_num_groups(),
            max_actors_per_group: default_max_actors_per_group(),
            seed: None,
        }
    }
}

/// Builds the synthetic directory for `config`.
pub fn generate(config: &MockConfig, seed: u64) -> RemoteSnapshot {
    let mut rng = StdRng::seed_from_u64(seed);

    let identities: Vec<IdentityAttrs> = (1..=config.num_actors)
        .map(|n| {
            let given = format!("User{n}");
            mapping::identity(
                &format!("USER-{n}"),
                ProviderState {
                    email: Some(format!("user{n}@mock.example.com")),
                    name: Some(format!("{given} Mock")),
                    given_name: Some(given),
                    family_name: Some("Mock".to_string()),
                },
            )
        })
        .collect();

    let groups: Vec<GroupAttrs> = (1..=config.num_groups)
        .map(|n| mapping::group(&format!("GROUP-{n}"), &format!("Mock Group {n}")))
        .collect();

    let mut memberships = Vec::new();
    for group in &groups {
        let size = rng.gen_range(0..=config.max_actors_per_group);
        memberships.extend(
            identities
                .choose_multiple(&mut rng, size)
                .map(|identity| {
                    MembershipTuple::new(
                        group.provider_identifier.clone(),
                        identity.provider_identifier.clone(),
                    )
                }),
        );
    }

    RemoteSnapshot {
        identities,
        groups,
        memberships,
    }
}

/// [`DirectoryAdapter`] producing [`generate`]d directories.
#[derive(Debug, Clone, Default)]
pub struct MockAdapter;

impl MockAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DirectoryAdapter for MockAdapter {
    fn adapter_type(&self) -> AdapterType {
        AdapterType::Mock
    }

    async fn gather(
        &self,
        provider: &Provider,
        pool: &FetchPool,
    ) -> Result<RemoteSnapshot, SyncFailure> {
        let config: MockConfig = crate::adapter_config(provider)?;
        let seed = config.seed.unwrap_or(provider.id.as_u128() as u64);

        pool.run(async { Ok::<_, SyncFailure>(generate(&config, seed)) })
            .await
    }
}
