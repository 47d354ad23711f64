pub mod app;
pub mod config;
pub mod observability;
pub mod server;
pub mod sync;

pub use app::App;
pub use config::{AppConfig, Discipline, StorageBackend};
pub use observability::{init_tracing, shutdown_tracing};
pub use server::build_app;
pub use sync::{ProviderOutcome, StatusBoard, SyncJob, SyncOrchestrator, TickReport};
