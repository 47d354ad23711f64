//! Connection pool for the store.
//!
//! A provider pass holds one pooled connection from `begin_pass` until it
//! commits, and each singleton leader detaches one connection for as long
//! as it leads. `pool_size` bounds both together.

use std::str::FromStr;
use std::time::Duration;

use sqlx_postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{debug, info, instrument};

use crate::config::PostgresConfig;
use crate::error::Result;

/// Name reported in `pg_stat_activity`.
const APPLICATION_NAME: &str = "dirsync";

const DEFAULT_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// Opens a pool for `config`.
#[instrument(skip(config), fields(url = %mask_password(&config.url)))]
pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    let connect = PgConnectOptions::from_str(&config.url)?.application_name(APPLICATION_NAME);

    // Keep a few connections warm so the first tick does not pay for them.
    let min_connections = config
        .min_connections
        .unwrap_or(config.pool_size / 4)
        .clamp(1, config.pool_size.max(1));

    let mut options = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .min_connections(min_connections)
        .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
        .max_lifetime(
            config
                .max_lifetime_secs
                .map_or(DEFAULT_MAX_LIFETIME, Duration::from_secs),
        );
    if let Some(idle_ms) = config.idle_timeout_ms {
        options = options.idle_timeout(Duration::from_millis(idle_ms));
    }

    let pool = options.connect_with(connect).await?;
    info!(
        max_connections = config.pool_size,
        min_connections, "PostgreSQL pool ready"
    );
    Ok(pool)
}

/// Round-trips a query and returns the server version string.
#[instrument(skip(pool))]
pub async fn test_connection(pool: &PgPool) -> Result<String> {
    let (version,): (String,) = sqlx_core::query_as::query_as("SHOW server_version")
        .fetch_one(pool)
        .await?;
    debug!(server_version = %version, "PostgreSQL reachable");
    Ok(version)
}

/// Replaces the password of a connection URL with `****`.
///
/// URLs without credentials, or with a user but no password, come back
/// unchanged.
pub fn mask_password(url: &str) -> String {
    let authority_start = url.find("://").map_or(0, |i| i + 3);
    let Some(at) = url[authority_start..].find('@').map(|i| i + authority_start) else {
        return url.to_string();
    };
    match url[authority_start..at].find(':') {
        Some(colon) => {
            let colon = colon + authority_start;
            format!("{}:****{}", &url[..colon], &url[at..])
        }
        None => url.to_string(),
    }
}
