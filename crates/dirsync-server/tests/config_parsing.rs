use std::{env, fs};

use dirsync_core::{AdapterType, GroupDeletion};
use dirsync_server::config::loader::load_config;
use dirsync_server::{Discipline, StorageBackend};

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("dirsync.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 9090

[storage]
backend = "memory"

[logging]
level = "debug"

[sync.http]
min_request_interval_ms = 250
fetch_concurrency = 6

[sync.adapters.mock]
interval_secs = 5
discipline = "singleton"

[sync.adapters.okta]
enabled = false

[sync.failure]
notify_after_failures = 2
disable_after_failures = 0
group_deletion = "hard"

[notifications]
enabled = true
from = "dirsync@example.com"
smtp_host = "smtp.example.com"
admin_console_url = "https://admin.example.com"

[[seed.providers]]
id = "6f1c7a52-8a3e-4d8e-9a57-2f0a4b1c9d10"
account_id = "0b8e4c1a-3d2f-4e5a-8b6c-7d9e0f1a2b3c"
name = "Local mock"
adapter = "mock"
config = { num_actors = 4, num_groups = 2 }

[[seed.admins]]
account_id = "0b8e4c1a-3d2f-4e5a-8b6c-7d9e0f1a2b3c"
name = "Ada"
email = "ada@example.com"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 9090);
    assert_eq!(cfg.storage.backend, StorageBackend::Memory);
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");
    assert_eq!(cfg.sync.http.fetch_concurrency, 6);
    assert_eq!(cfg.sync.http.request_timeout_ms, 30_000);
    assert_eq!(
        cfg.sync.adapters.interval(AdapterType::Mock).as_secs(),
        5
    );
    assert_eq!(cfg.sync.adapters.mock.discipline, Discipline::Singleton);
    assert!(!cfg.sync.adapters.okta.enabled);
    assert_eq!(cfg.sync.adapters.jumpcloud.discipline, Discipline::Concurrent);
    assert_eq!(cfg.sync.failure.group_deletion, GroupDeletion::Hard);
    assert_eq!(cfg.sync.failure.policy().notify_after_failures, 2);
    assert!(cfg.notifications.enabled);

    assert_eq!(cfg.seed.providers.len(), 1);
    let provider = cfg.seed.providers[0].to_provider();
    assert_eq!(provider.adapter, AdapterType::Mock);
    assert_eq!(provider.adapter_config["num_actors"], 4);
    assert_eq!(cfg.seed.admins[0].email, "ada@example.com");

    // 2) Env override should win over file
    unsafe {
        env::set_var("DIRSYNC__SYNC__HTTP__FETCH_CONCURRENCY", "3");
        env::set_var("DIRSYNC__SYNC__ADAPTERS__MOCK__DISCIPLINE", "concurrent");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.sync.http.fetch_concurrency, 3);
    assert_eq!(cfg_env.sync.adapters.mock.discipline, Discipline::Concurrent);
    unsafe {
        env::remove_var("DIRSYNC__SYNC__HTTP__FETCH_CONCURRENCY");
        env::remove_var("DIRSYNC__SYNC__ADAPTERS__MOCK__DISCIPLINE");
    }

    // 3) Invalid config should error
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[storage]
backend = "memory"

[sync.http]
fetch_concurrency = 0
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("fetch_concurrency must be > 0"));
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");

    let cfg = load_config(path.to_str()).expect("defaults should validate");
    assert_eq!(cfg.storage.backend, StorageBackend::Postgres);
    assert_eq!(cfg.sync.failure.disable_after_failures, 10);
    assert!(cfg.seed.providers.is_empty());
}

#[test]
fn enabled_notifications_need_a_transport() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("dirsync.toml");
    fs::write(
        &path,
        r#"
[notifications]
enabled = true
from = "dirsync@example.com"
"#,
    )
    .expect("write toml");

    let err = load_config(path.to_str()).expect_err("expected validation error");
    assert!(err.starts_with("notifications:"));
}

#[test]
fn rendered_config_loads_back() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("dirsync.toml");

    let mut cfg = dirsync_server::AppConfig::default();
    cfg.storage.backend = StorageBackend::Memory;
    cfg.sync.adapters.google_workspace.interval_secs = Some(120);
    fs::write(&path, toml::to_string_pretty(&cfg).expect("render")).expect("write toml");

    let loaded = load_config(path.to_str()).expect("should parse rendered config");
    assert_eq!(loaded.storage.backend, StorageBackend::Memory);
    assert_eq!(
        loaded
            .sync
            .adapters
            .interval(AdapterType::GoogleWorkspace)
            .as_secs(),
        120
    );
}
