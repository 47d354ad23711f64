use std::sync::Arc;
use std::time::Duration;

use dirsync_adapters::{AdapterRegistry, MockAdapter};
use dirsync_core::memory::{LeaderSlot, MemoryLeaderElection, MemoryStore};
use dirsync_core::{AdapterType, LeaderElection, Provider};
use dirsync_server::{Discipline, StatusBoard, SyncJob, SyncOrchestrator};
use tokio::sync::watch;
use uuid::Uuid;

fn mock_orchestrator() -> (MemoryStore, Arc<SyncOrchestrator>, Provider) {
    let store = MemoryStore::new();
    let provider = Provider::new(
        Uuid::new_v4(),
        "Mock",
        AdapterType::Mock,
        serde_json::json!({"num_actors": 3, "num_groups": 1}),
    );
    store.insert_provider(provider.clone());

    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(MockAdapter::new()));
    let orchestrator = SyncOrchestrator::new(Arc::new(store.clone()), registry);
    (store, Arc::new(orchestrator), provider)
}

async fn wait_for_ticks(status: &StatusBoard, adapter: AdapterType, ticks: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if status.get(adapter).is_some_and(|job| job.ticks >= ticks) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job ticked");
}

#[tokio::test]
async fn singleton_job_runs_only_on_the_leader() {
    let (store, orchestrator, provider) = mock_orchestrator();
    let slot = LeaderSlot::default();
    let leader_a = Arc::new(MemoryLeaderElection::new(slot.clone()));
    let leader_b = Arc::new(MemoryLeaderElection::new(slot));

    let node_a = SyncJob::singleton(AdapterType::Mock, Duration::from_secs(30), leader_a.clone());
    let node_b = SyncJob::singleton(AdapterType::Mock, Duration::from_secs(30), leader_b);
    assert_eq!(node_a.discipline(), Discipline::Singleton);

    let status_a = StatusBoard::new();
    let status_b = StatusBoard::new();
    status_b.register(AdapterType::Mock, Discipline::Singleton, 30);

    let report = node_a.run_once(&orchestrator, &status_a).await.expect("leader ticks");
    assert!(report.outcome(provider.id).unwrap().is_synced());
    assert!(node_b.run_once(&orchestrator, &status_b).await.is_none());
    assert!(!status_b.get(AdapterType::Mock).unwrap().leading);

    // Standby takes over once the leader steps down
    leader_a.resign().await.unwrap();
    assert!(node_b.run_once(&orchestrator, &status_b).await.is_some());
    assert!(node_a.run_once(&orchestrator, &status_a).await.is_none());
    assert_eq!(status_b.get(AdapterType::Mock).unwrap().ticks, 1);

    assert_eq!(store.snapshot().live_identities(provider.id).len(), 3);
}

#[tokio::test]
async fn job_ticks_immediately_and_stops_on_shutdown() {
    let (store, orchestrator, provider) = mock_orchestrator();
    let status = StatusBoard::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let job = SyncJob::concurrent(AdapterType::Mock, Duration::from_secs(3600));
    let handle = job.spawn(orchestrator, status.clone(), shutdown_rx);

    wait_for_ticks(&status, AdapterType::Mock, 1).await;
    let job_status = status.get(AdapterType::Mock).unwrap();
    assert_eq!(job_status.discipline, Discipline::Concurrent);
    assert_eq!(job_status.interval_secs, 3600);
    assert_eq!(job_status.last_tick.unwrap().synced, 1);
    assert!(store.provider(provider.id).unwrap().last_synced_at.is_some());

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("job stopped")
        .unwrap();
}

#[tokio::test]
async fn singleton_job_resigns_on_shutdown() {
    let (_store, orchestrator, _provider) = mock_orchestrator();
    let slot = LeaderSlot::default();
    let leader = Arc::new(MemoryLeaderElection::new(slot.clone()));
    let status = StatusBoard::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let job = SyncJob::singleton(AdapterType::Mock, Duration::from_millis(20), leader);
    let handle = job.spawn(orchestrator, status.clone(), shutdown_rx);
    wait_for_ticks(&status, AdapterType::Mock, 2).await;

    let contender = MemoryLeaderElection::new(slot);
    assert!(!contender.is_leader().await.unwrap());

    drop(shutdown_tx);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("job stopped")
        .unwrap();
    assert!(contender.is_leader().await.unwrap());
}
