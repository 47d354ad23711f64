//! Tracing setup.
//!
//! The subscriber is installed before the configuration is read so that
//! config errors are logged too. Once loaded, `logging.level` replaces the
//! startup filter through a reload handle; `RUST_LOG` always wins.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER: OnceLock<FilterHandle> = OnceLock::new();

const STARTUP_LEVEL: &str = "info";

fn rust_log_is_set() -> bool {
    std::env::var_os(EnvFilter::DEFAULT_ENV).is_some()
}

/// Installs the global subscriber at the startup level.
pub fn init_tracing() {
    init_tracing_with_level(STARTUP_LEVEL);
}

/// Installs the global subscriber with `level` as the filter, unless
/// `RUST_LOG` holds a valid directive. Later calls are no-ops.
pub fn init_tracing_with_level(level: &str) {
    let filter = rust_log_is_set()
        .then(|| EnvFilter::try_from_default_env().ok())
        .flatten()
        .unwrap_or_else(|| EnvFilter::new(level));

    let (filter, handle) = reload::Layer::new(filter);
    if FILTER.set(handle).is_err() {
        return;
    }

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Swaps the active filter for the configured `logging.level`.
pub fn apply_logging_level(level: &str) {
    if rust_log_is_set() {
        return;
    }
    let Some(handle) = FILTER.get() else {
        return;
    };
    if let Err(e) = handle.modify(|filter| *filter = EnvFilter::new(level)) {
        tracing::warn!(error = %e, level, "Failed to apply logging level");
    } else {
        tracing::debug!(level, "Logging level applied");
    }
}

pub fn shutdown_tracing() {
    tracing::info!("dirsync stopped");
}
