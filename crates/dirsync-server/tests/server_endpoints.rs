use dirsync_core::AdapterType;
use dirsync_server::{Discipline, StatusBoard, build_app};
use serde_json::Value;
use tokio::task::JoinHandle;

async fn start_server(status: StatusBoard) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let app = build_app(status);

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, server)
}

#[tokio::test]
async fn server_endpoints_work() {
    let status = StatusBoard::new();
    status.register(AdapterType::Mock, Discipline::Concurrent, 30);
    status.register(AdapterType::Okta, Discipline::Singleton, 600);
    status.record_error(AdapterType::Okta, "Connection error: pool timed out");

    let (base, shutdown_tx, handle) = start_server(status).await;
    let client = reqwest::Client::new();

    // GET /healthz
    let resp = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    // GET /status
    let resp = client.get(format!("{base}/status")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["service"], "dirsync");

    let jobs = body["jobs"].as_array().expect("jobs array");
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["adapter"], "okta");
    assert_eq!(jobs[0]["discipline"], "singleton");
    assert_eq!(jobs[0]["last_error"], "Connection error: pool timed out");
    assert!(jobs[0]["last_tick_at"].is_string());
    assert_eq!(jobs[1]["adapter"], "mock");
    assert_eq!(jobs[1]["ticks"], 0);
    assert!(jobs[1]["last_tick_at"].is_null());

    // Unknown route
    let resp = client.get(format!("{base}/nope")).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}
