//! Wiring: store, adapters, notifier and one sync job per adapter type.

use std::future::Future;
use std::sync::Arc;

use dirsync_adapters::AdapterRegistry;
use dirsync_core::memory::{MemoryLeaderElection, MemoryStore};
use dirsync_core::{AdapterType, DynStore, LeaderElection, SyncErrorNotifier};
use dirsync_notifications::EmailNotifier;
use dirsync_postgres::{PgLeaderElection, PostgresStore};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::{AppConfig, Discipline, SeedConfig, StorageBackend};
use crate::server;
use crate::sync::{StatusBoard, SyncJob, SyncOrchestrator};

/// Where singleton jobs get their leader elections from.
enum Leadership {
    Postgres(PostgresStore),
    /// A single process is always the leader.
    Local,
}

impl Leadership {
    fn election(&self, adapter: AdapterType) -> Arc<dyn LeaderElection> {
        match self {
            Self::Postgres(store) => Arc::new(PgLeaderElection::new(
                store.pool().clone(),
                format!("dirsync.sync.{adapter}"),
            )),
            Self::Local => Arc::new(MemoryLeaderElection::standalone()),
        }
    }
}

/// A configured dirsync node, ready to run.
pub struct App {
    config: AppConfig,
    orchestrator: Arc<SyncOrchestrator>,
    jobs: Vec<SyncJob>,
    status: StatusBoard,
}

impl App {
    /// Connects the store, seeds configured providers and prepares the jobs.
    pub async fn build(config: AppConfig) -> anyhow::Result<Self> {
        let (store, leadership) = build_store(&config).await?;
        seed_providers(&store, &config.seed).await?;

        let registry = AdapterRegistry::with_defaults(&config.sync.http.client_config())?;
        let notifier: Arc<dyn SyncErrorNotifier> =
            Arc::new(EmailNotifier::new(config.notifications.clone()));
        if !config.notifications.enabled {
            info!("Notifications disabled; sync error emails will only be logged");
        }

        let orchestrator = SyncOrchestrator::new(store, registry)
            .with_notifier(notifier)
            .with_failure_policy(config.sync.failure.policy())
            .with_apply_options(config.sync.failure.apply_options())
            .with_fetch_concurrency(config.sync.http.fetch_concurrency);

        let jobs = orchestrator
            .adapter_types()
            .into_iter()
            .filter(|adapter| {
                let enabled = config.sync.adapters.get(*adapter).enabled;
                if !enabled {
                    info!(adapter = %adapter, "Sync job disabled");
                }
                enabled
            })
            .map(|adapter| {
                let interval = config.sync.adapters.interval(adapter);
                match config.sync.adapters.get(adapter).discipline {
                    Discipline::Singleton => {
                        SyncJob::singleton(adapter, interval, leadership.election(adapter))
                    }
                    Discipline::Concurrent => SyncJob::concurrent(adapter, interval),
                }
            })
            .collect();

        Ok(Self {
            config,
            orchestrator: Arc::new(orchestrator),
            jobs,
            status: StatusBoard::new(),
        })
    }

    pub fn status(&self) -> StatusBoard {
        self.status.clone()
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn jobs(&self) -> &[SyncJob] {
        &self.jobs
    }

    /// Runs until Ctrl-C or SIGTERM.
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Runs the jobs and the status server until `shutdown` resolves, then
    /// waits for ticks in progress to finish.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let server = if self.config.server.enabled {
            let listener = tokio::net::TcpListener::bind(self.config.addr()).await?;
            let mut server_rx = shutdown_rx.clone();
            let status = self.status.clone();
            Some(tokio::spawn(server::serve(listener, status, async move {
                let _ = server_rx.wait_for(|stop| *stop).await;
            })))
        } else {
            None
        };

        let handles: Vec<_> = self
            .jobs
            .into_iter()
            .map(|job| {
                job.spawn(
                    Arc::clone(&self.orchestrator),
                    self.status.clone(),
                    shutdown_rx.clone(),
                )
            })
            .collect();
        info!(jobs = handles.len(), "dirsync running");

        shutdown.await;
        info!("Shutdown requested; waiting for running ticks to finish");
        let _ = shutdown_tx.send(true);

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Sync job panicked");
            }
        }
        if let Some(server) = server {
            server.await??;
        }
        Ok(())
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("orchestrator", &self.orchestrator)
            .field("jobs", &self.jobs)
            .finish()
    }
}

async fn build_store(config: &AppConfig) -> anyhow::Result<(DynStore, Leadership)> {
    match config.storage.backend {
        StorageBackend::Postgres => {
            let store = PostgresStore::connect(&config.storage.postgres).await?;
            info!(
                url = %dirsync_postgres::mask_password(&config.storage.postgres.url),
                "Connected to PostgreSQL"
            );
            if !config.seed.admins.is_empty() {
                warn!("seed.admins is ignored by the postgres backend");
            }
            let shared: DynStore = Arc::new(store.clone());
            Ok((shared, Leadership::Postgres(store)))
        }
        StorageBackend::Memory => {
            let store = MemoryStore::new();
            for admin in &config.seed.admins {
                store.add_admin(admin.account_id, &admin.name, &admin.email);
            }
            warn!("Using the in-memory store; nothing survives a restart");
            let shared: DynStore = Arc::new(store);
            Ok((shared, Leadership::Local))
        }
    }
}

async fn seed_providers(store: &DynStore, seed: &SeedConfig) -> anyhow::Result<()> {
    for seeded in &seed.providers {
        let provider = seeded.to_provider();
        if store.register_provider(&provider).await? {
            info!(provider_id = %provider.id, adapter = %provider.adapter, name = %provider.name, "Registered provider");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
