//! Orchestrator behaviour against the in-memory store and scripted adapters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dirsync_adapters::{AdapterRegistry, MockAdapter};
use dirsync_core::memory::MemoryStore;
use dirsync_core::{
    ActorAttrs, AdapterType, DirectoryAdapter, DirectoryStore, FailureKind, FailurePolicy,
    FetchPool, GroupAttrs, IdentityAttrs, MembershipTuple, NotifyError, Provider, ProviderState,
    RemoteSnapshot, SyncErrorNotifier, SyncFailure,
};
use dirsync_server::{ProviderOutcome, SyncOrchestrator};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Okta stand-in answering from a per-provider script.
#[derive(Default)]
struct ScriptedAdapter {
    responses: Mutex<HashMap<Uuid, Result<RemoteSnapshot, SyncFailure>>>,
}

impl ScriptedAdapter {
    fn respond(&self, provider_id: Uuid, response: Result<RemoteSnapshot, SyncFailure>) {
        self.responses.lock().unwrap().insert(provider_id, response);
    }
}

#[async_trait]
impl DirectoryAdapter for ScriptedAdapter {
    fn adapter_type(&self) -> AdapterType {
        AdapterType::Okta
    }

    async fn gather(
        &self,
        provider: &Provider,
        pool: &FetchPool,
    ) -> Result<RemoteSnapshot, SyncFailure> {
        let response = self
            .responses
            .lock()
            .unwrap()
            .get(&provider.id)
            .cloned()
            .unwrap_or_else(|| Ok(RemoteSnapshot::default()));
        pool.run(async move { response }).await
    }
}

/// Forwards every notification to a channel.
struct ChannelNotifier {
    sent: mpsc::UnboundedSender<(Uuid, String)>,
}

#[async_trait]
impl SyncErrorNotifier for ChannelNotifier {
    async fn notify_sync_error(
        &self,
        provider: &Provider,
        admin_email: &str,
    ) -> Result<(), NotifyError> {
        self.sent
            .send((provider.id, admin_email.to_string()))
            .map_err(|e| Box::new(e) as NotifyError)
    }
}

struct Harness {
    store: MemoryStore,
    adapter: Arc<ScriptedAdapter>,
    orchestrator: SyncOrchestrator,
    notifications: mpsc::UnboundedReceiver<(Uuid, String)>,
}

fn harness(policy: FailurePolicy) -> Harness {
    let store = MemoryStore::new();
    let adapter = Arc::new(ScriptedAdapter::default());
    let mut registry = AdapterRegistry::new();
    registry.register(adapter.clone());

    let (sent, notifications) = mpsc::unbounded_channel();
    let orchestrator = SyncOrchestrator::new(Arc::new(store.clone()), registry)
        .with_notifier(Arc::new(ChannelNotifier { sent }))
        .with_failure_policy(policy)
        .with_fetch_concurrency(2);

    Harness {
        store,
        adapter,
        orchestrator,
        notifications,
    }
}

fn okta_provider(store: &MemoryStore, account_id: Uuid) -> Provider {
    let provider = Provider::new(
        account_id,
        "Corporate Okta",
        AdapterType::Okta,
        serde_json::json!({}),
    );
    store.insert_provider(provider.clone());
    provider
}

fn identity(id: &str) -> IdentityAttrs {
    IdentityAttrs {
        provider_identifier: id.to_string(),
        provider_state: ProviderState {
            email: Some(format!("{}@example.com", id.to_lowercase())),
            ..Default::default()
        },
        actor: ActorAttrs::account_user(id),
    }
}

fn directory() -> RemoteSnapshot {
    RemoteSnapshot {
        identities: vec![identity("U1"), identity("U2")],
        groups: vec![GroupAttrs {
            provider_identifier: "G:1".into(),
            name: "Group:Engineering".into(),
        }],
        memberships: vec![
            MembershipTuple::new("G:1", "U1"),
            MembershipTuple::new("G:1", "U2"),
        ],
    }
}

fn unauthorized() -> SyncFailure {
    SyncFailure::client("http_401", "Invalid token provided")
}

#[tokio::test]
async fn test_tick_syncs_provider_and_clears_streak() {
    let h = harness(FailurePolicy::default());
    let mut provider = okta_provider(&h.store, Uuid::new_v4());
    provider.last_syncs_failed = 2;
    provider.last_sync_error = Some("timeout".into());
    provider.last_sync_error_reason = Some("transport".into());
    h.store.insert_provider(provider.clone());
    h.adapter.respond(provider.id, Ok(directory()));

    let report = h.orchestrator.run_tick(AdapterType::Okta).await.unwrap();

    let Some(ProviderOutcome::Synced(counts)) = report.outcome(provider.id) else {
        panic!("expected a synced provider, got {:?}", report.outcomes);
    };
    assert_eq!(counts.identities_inserted, 2);
    assert_eq!(counts.groups_upserted, 1);
    assert_eq!(counts.memberships_inserted, 2);

    let stored = h.store.provider(provider.id).unwrap();
    assert_eq!(stored.last_syncs_failed, 0);
    assert!(stored.last_sync_error.is_none());
    assert!(stored.last_sync_error_reason.is_none());
    assert!(stored.last_synced_at.is_some());
    assert!(!h.store.is_locked(provider.id));

    let snapshot = h.store.snapshot();
    assert_eq!(snapshot.live_identities(provider.id).len(), 2);
    assert!(snapshot.memberships_are_consistent());
}

#[tokio::test]
async fn test_second_tick_only_touches_identities() {
    let h = harness(FailurePolicy::default());
    let provider = okta_provider(&h.store, Uuid::new_v4());
    h.adapter.respond(provider.id, Ok(directory()));

    h.orchestrator.run_tick(AdapterType::Okta).await.unwrap();
    let report = h.orchestrator.run_tick(AdapterType::Okta).await.unwrap();

    let Some(ProviderOutcome::Synced(counts)) = report.outcome(provider.id) else {
        panic!("expected a synced provider");
    };
    assert_eq!(counts.identities_inserted, 0);
    assert_eq!(counts.identities_updated, 2);
    assert_eq!(counts.identities_deleted, 0);
    assert_eq!(counts.memberships_inserted, 0);
    assert_eq!(counts.memberships_deleted, 0);
}

#[tokio::test]
async fn test_failure_streak_notifies_admins_once_per_cooldown() {
    let mut h = harness(FailurePolicy {
        notify_after_failures: 2,
        disable_after_failures: 0,
        ..Default::default()
    });
    let account_id = Uuid::new_v4();
    h.store.add_admin(account_id, "Ada", "ada@example.com");
    h.store.add_admin(Uuid::new_v4(), "Other", "other@example.com");
    let provider = okta_provider(&h.store, account_id);
    h.adapter.respond(provider.id, Err(unauthorized()));

    // First failure: recorded, nobody emailed yet
    let report = h.orchestrator.run_tick(AdapterType::Okta).await.unwrap();
    let Some(ProviderOutcome::Failed { failure, outcome }) = report.outcome(provider.id) else {
        panic!("expected a failed provider");
    };
    assert_eq!(failure.kind, FailureKind::Client);
    let outcome = outcome.expect("failure recorded");
    assert_eq!(outcome.failures_in_streak, 1);
    assert!(!outcome.notify);

    let stored = h.store.provider(provider.id).unwrap();
    assert_eq!(stored.last_syncs_failed, 1);
    assert_eq!(stored.last_sync_error.as_deref(), Some("Invalid token provided"));
    assert_eq!(stored.last_sync_error_reason.as_deref(), Some("http_401"));
    assert!(stored.sync_error_emailed_at.is_none());

    // Second failure reaches the threshold
    let report = h.orchestrator.run_tick(AdapterType::Okta).await.unwrap();
    let Some(ProviderOutcome::Failed { outcome, .. }) = report.outcome(provider.id) else {
        panic!("expected a failed provider");
    };
    assert!(outcome.unwrap().notify);

    let (notified, to) = tokio::time::timeout(Duration::from_secs(5), h.notifications.recv())
        .await
        .expect("notification sent")
        .unwrap();
    assert_eq!(notified, provider.id);
    assert_eq!(to, "ada@example.com");
    assert!(h.store.provider(provider.id).unwrap().sync_error_emailed_at.is_some());

    // Third failure falls inside the cooldown
    let report = h.orchestrator.run_tick(AdapterType::Okta).await.unwrap();
    let Some(ProviderOutcome::Failed { outcome, .. }) = report.outcome(provider.id) else {
        panic!("expected a failed provider");
    };
    let outcome = outcome.unwrap();
    assert_eq!(outcome.failures_in_streak, 3);
    assert!(!outcome.notify);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.notifications.try_recv().is_err());
}

#[tokio::test]
async fn test_provider_disabled_after_threshold() {
    let h = harness(FailurePolicy {
        disable_after_failures: 3,
        ..Default::default()
    });
    let provider = okta_provider(&h.store, Uuid::new_v4());
    h.adapter.respond(
        provider.id,
        Err(SyncFailure::transient("retry_later", "503 Service Unavailable")),
    );

    for _ in 0..3 {
        h.orchestrator.run_tick(AdapterType::Okta).await.unwrap();
    }

    let stored = h.store.provider(provider.id).unwrap();
    assert_eq!(stored.last_syncs_failed, 3);
    assert!(stored.sync_disabled_at.is_some());
    assert!(!stored.is_sync_enabled());

    let report = h.orchestrator.run_tick(AdapterType::Okta).await.unwrap();
    assert!(report.outcomes.is_empty());
}

#[tokio::test]
async fn test_one_failing_provider_does_not_stop_the_tick() {
    let h = harness(FailurePolicy::default());
    let account_id = Uuid::new_v4();
    let broken = okta_provider(&h.store, account_id);
    let healthy = okta_provider(&h.store, account_id);
    h.adapter.respond(broken.id, Err(unauthorized()));
    h.adapter.respond(healthy.id, Ok(directory()));

    let report = h.orchestrator.run_tick(AdapterType::Okta).await.unwrap();

    assert!(report.outcome(broken.id).unwrap().is_failed());
    assert!(report.outcome(healthy.id).unwrap().is_synced());
    let summary = report.summary();
    assert_eq!(summary.providers, 2);
    assert_eq!(summary.synced, 1);
    assert_eq!(summary.failed, 1);

    let snapshot = h.store.snapshot();
    assert!(snapshot.live_identities(broken.id).is_empty());
    assert_eq!(snapshot.live_identities(healthy.id).len(), 2);
}

#[tokio::test]
async fn test_locked_provider_is_skipped() {
    let h = harness(FailurePolicy::default());
    let provider = okta_provider(&h.store, Uuid::new_v4());
    h.adapter.respond(provider.id, Ok(directory()));

    let held = h.store.begin_pass(provider.id).await.unwrap().expect("lock");
    let report = h.orchestrator.run_tick(AdapterType::Okta).await.unwrap();
    assert_eq!(report.outcome(provider.id), Some(&ProviderOutcome::Skipped));
    assert!(h.store.snapshot().live_identities(provider.id).is_empty());

    drop(held);
    let report = h.orchestrator.run_tick(AdapterType::Okta).await.unwrap();
    assert!(report.outcome(provider.id).unwrap().is_synced());
}

#[tokio::test]
async fn test_apply_failure_keeps_nothing_and_counts_as_failure() {
    let h = harness(FailurePolicy::default());
    let provider = okta_provider(&h.store, Uuid::new_v4());
    h.adapter.respond(provider.id, Ok(directory()));
    h.store.fail_next_apply();

    let report = h.orchestrator.run_tick(AdapterType::Okta).await.unwrap();
    let Some(ProviderOutcome::Failed { failure, outcome }) = report.outcome(provider.id) else {
        panic!("expected a failed provider");
    };
    assert!(failure.is_transient());
    assert!(outcome.is_some());

    let snapshot = h.store.snapshot();
    assert!(snapshot.live_identities(provider.id).is_empty());
    assert!(snapshot.live_groups(provider.id).is_empty());
    assert_eq!(h.store.provider(provider.id).unwrap().last_syncs_failed, 1);

    // The next tick recovers and resets the streak
    let report = h.orchestrator.run_tick(AdapterType::Okta).await.unwrap();
    assert!(report.outcome(provider.id).unwrap().is_synced());
    assert_eq!(h.store.provider(provider.id).unwrap().last_syncs_failed, 0);
}

#[tokio::test]
async fn test_unregistered_adapter_has_nothing_to_do() {
    let h = harness(FailurePolicy::default());
    let report = h.orchestrator.run_tick(AdapterType::Jumpcloud).await.unwrap();
    assert!(report.outcomes.is_empty());
}

#[tokio::test]
async fn test_mock_adapter_tick_is_stable() {
    let store = MemoryStore::new();
    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(MockAdapter::new()));
    let orchestrator = SyncOrchestrator::new(Arc::new(store.clone()), registry);

    let provider = Provider::new(
        Uuid::new_v4(),
        "Mock",
        AdapterType::Mock,
        serde_json::json!({"num_actors": 8, "num_groups": 3, "seed": 7}),
    );
    store.insert_provider(provider.clone());

    let first = orchestrator.run_tick(AdapterType::Mock).await.unwrap();
    let Some(ProviderOutcome::Synced(counts)) = first.outcome(provider.id) else {
        panic!("expected a synced provider");
    };
    assert_eq!(counts.identities_inserted, 8);
    assert_eq!(counts.groups_upserted, 3);

    let second = orchestrator.run_tick(AdapterType::Mock).await.unwrap();
    let Some(ProviderOutcome::Synced(counts)) = second.outcome(provider.id) else {
        panic!("expected a synced provider");
    };
    assert_eq!(counts.identities_inserted, 0);
    assert_eq!(counts.identities_deleted, 0);
    assert_eq!(counts.memberships_inserted, 0);
    assert_eq!(counts.memberships_deleted, 0);
}
