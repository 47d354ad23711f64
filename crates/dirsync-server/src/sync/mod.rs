//! Sync orchestration and scheduling.

pub mod orchestrator;
pub mod scheduler;
pub mod status;

pub use orchestrator::{ProviderOutcome, SyncOrchestrator, TickReport, TickSummary};
pub use scheduler::SyncJob;
pub use status::{JobStatus, StatusBoard};
