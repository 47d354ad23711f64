use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use dirsync_adapters::ClientConfig;
use dirsync_core::{AdapterType, ApplyOptions, FailurePolicy, GroupDeletion, Provider};
use dirsync_notifications::MailerConfig;
use dirsync_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    /// Sync-error email delivery
    #[serde(default)]
    pub notifications: MailerConfig,
    /// Providers (and, for the memory backend, administrators) created at startup
    #[serde(default)]
    pub seed: SeedConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Status server
        if self.server.enabled && self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.host.parse::<IpAddr>().is_err() {
            return Err(format!("server.host is not an IP address: {}", self.server.host));
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Storage validation
        if self.storage.backend == StorageBackend::Postgres {
            self.storage
                .postgres
                .validate()
                .map_err(|e| format!("storage.postgres: {e}"))?;
        }
        // Sync validation
        if self.sync.http.request_timeout_ms == 0 {
            return Err("sync.http.request_timeout_ms must be > 0".into());
        }
        if self.sync.http.fetch_concurrency == 0 {
            return Err("sync.http.fetch_concurrency must be > 0".into());
        }
        for adapter in AdapterType::ALL {
            if self.sync.adapters.get(adapter).interval_secs == Some(0) {
                return Err(format!("sync.adapters.{adapter}.interval_secs must be > 0"));
            }
        }
        if self.sync.failure.notify_after_failures == 0 {
            return Err("sync.failure.notify_after_failures must be > 0".into());
        }
        self.notifications
            .validate()
            .map_err(|e| format!("notifications: {e}"))?;
        // Seed validation
        let mut ids = BTreeSet::new();
        for provider in &self.seed.providers {
            if !ids.insert(provider.id) {
                return Err(format!("seed.providers has duplicate id {}", provider.id));
            }
            if provider.name.trim().is_empty() {
                return Err(format!("seed.providers {} needs a name", provider.id));
            }
        }
        Ok(())
    }

    /// Address the status server listens on.
    pub fn addr(&self) -> SocketAddr {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

/// HTTP status endpoint (`/healthz`, `/status`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}
fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process-local store for development with the mock adapter
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub postgres: PostgresConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub adapters: AdaptersConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub failure: FailureConfig,
}

/// How a sync job coordinates across nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Discipline {
    /// Only the elected leader runs the job.
    Singleton,
    /// Every node runs; provider row locks keep passes apart.
    #[default]
    Concurrent,
}

impl std::fmt::Display for Discipline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Singleton => write!(f, "singleton"),
            Self::Concurrent => write!(f, "concurrent"),
        }
    }
}

/// Scheduling of one adapter's sync job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterJobConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Tick period. Defaults to 30 s for the mock adapter, 10 min otherwise.
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default)]
    pub discipline: Discipline,
}

impl Default for AdapterJobConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: None,
            discipline: Discipline::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdaptersConfig {
    #[serde(default)]
    pub okta: AdapterJobConfig,
    #[serde(default)]
    pub jumpcloud: AdapterJobConfig,
    #[serde(default)]
    pub google_workspace: AdapterJobConfig,
    #[serde(default)]
    pub microsoft_entra: AdapterJobConfig,
    #[serde(default)]
    pub mock: AdapterJobConfig,
}

impl AdaptersConfig {
    pub fn get(&self, adapter: AdapterType) -> &AdapterJobConfig {
        match adapter {
            AdapterType::Okta => &self.okta,
            AdapterType::Jumpcloud => &self.jumpcloud,
            AdapterType::GoogleWorkspace => &self.google_workspace,
            AdapterType::MicrosoftEntra => &self.microsoft_entra,
            AdapterType::Mock => &self.mock,
        }
    }

    pub fn interval(&self, adapter: AdapterType) -> Duration {
        let default_secs = match adapter {
            AdapterType::Mock => 30,
            _ => 600,
        };
        Duration::from_secs(self.get(adapter).interval_secs.unwrap_or(default_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Minimum spacing between requests to one directory API. 0 disables throttling.
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
    /// Remote requests in flight per tick
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_min_request_interval_ms() -> u64 {
    1_000
}
fn default_fetch_concurrency() -> usize {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            min_request_interval_ms: default_min_request_interval_ms(),
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

impl HttpConfig {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new()
            .with_request_timeout(Duration::from_millis(self.request_timeout_ms))
            .with_min_request_interval(Duration::from_millis(self.min_request_interval_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureConfig {
    #[serde(default = "default_notify_after_failures")]
    pub notify_after_failures: u32,
    #[serde(default = "default_notification_cooldown_secs")]
    pub notification_cooldown_secs: u64,
    /// 0 keeps syncing a failing provider forever
    #[serde(default = "default_disable_after_failures")]
    pub disable_after_failures: u32,
    #[serde(default)]
    pub group_deletion: GroupDeletion,
}

fn default_notify_after_failures() -> u32 {
    3
}
fn default_notification_cooldown_secs() -> u64 {
    24 * 60 * 60
}
fn default_disable_after_failures() -> u32 {
    10
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            notify_after_failures: default_notify_after_failures(),
            notification_cooldown_secs: default_notification_cooldown_secs(),
            disable_after_failures: default_disable_after_failures(),
            group_deletion: GroupDeletion::default(),
        }
    }
}

impl FailureConfig {
    pub fn policy(&self) -> FailurePolicy {
        let cooldown_secs = i64::try_from(self.notification_cooldown_secs).unwrap_or(i64::MAX);
        FailurePolicy {
            notify_after_failures: self.notify_after_failures,
            notification_cooldown: time::Duration::seconds(cooldown_secs),
            disable_after_failures: self.disable_after_failures,
        }
    }

    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            group_deletion: self.group_deletion,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedConfig {
    #[serde(default)]
    pub providers: Vec<SeedProvider>,
    /// Only honoured by the memory backend
    #[serde(default)]
    pub admins: Vec<SeedAdmin>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedProvider {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub adapter: AdapterType,
    /// Adapter settings, stored as the provider's `adapter_config`
    #[serde(default = "empty_object")]
    pub config: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl SeedProvider {
    pub fn to_provider(&self) -> Provider {
        let mut provider = Provider::new(
            self.account_id,
            self.name.clone(),
            self.adapter,
            self.config.clone(),
        );
        provider.id = self.id;
        provider
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedAdmin {
    pub account_id: Uuid,
    pub name: String,
    pub email: String,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file, relative to the working directory.
    pub const DEFAULT_CONFIG_PATH: &str = "dirsync.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., DIRSYNC__SYNC__HTTP__FETCH_CONCURRENCY=4
        builder = builder.add_source(
            Environment::with_prefix("DIRSYNC")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
