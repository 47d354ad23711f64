use std::future::Future;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;
use serde_json::json;

use crate::sync::StatusBoard;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub fn build_app(status: StatusBoard) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(sync_status))
        .with_state(status)
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn sync_status(State(status): State<StatusBoard>) -> impl IntoResponse {
    let body = json!({
        "service": "dirsync",
        "version": env!("CARGO_PKG_VERSION"),
        "commit": env!("DIRSYNC_GIT_COMMIT"),
        "jobs": status.jobs(),
    });
    (StatusCode::OK, Json(body))
}

/// Serves the status endpoints on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    status: StatusBoard,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    tracing::info!("status server listening on {}", listener.local_addr()?);
    axum::serve(listener, build_app(status))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
