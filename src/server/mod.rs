//! HTTP API for the capture service.
//!
//! Thin transport over the submission frontend: one route to submit a
//! capture, one for the status query, one liveness probe. Pool
//! unavailability surfaces as 503; every validation failure rides inside
//! a 200 acknowledgement body.

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::frontend::{SubmissionFrontend, SubmitOutcome, SubmitRequest};

/// Build the axum Router with all endpoints.
pub fn router(frontend: Arc<SubmissionFrontend>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/capture", post(handle_submit))
        .route("/api/v1/status", get(handle_status))
        .with_state(frontend)
}

/// Serve the API on the given address until `shutdown` resolves.
pub async fn serve(
    bind_address: &str,
    frontend: Arc<SubmissionFrontend>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = TcpListener::bind(bind_address)
        .await
        .context(format!("Failed to bind HTTP listener on {}", bind_address))?;
    serve_on(listener, frontend, shutdown).await
}

/// Serve on an already-bound listener (tests bind to an ephemeral port).
pub async fn serve_on(
    listener: TcpListener,
    frontend: Arc<SubmissionFrontend>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP API listening on http://{}", addr);
    }
    axum::serve(listener, router(frontend))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_submit(
    State(frontend): State<Arc<SubmissionFrontend>>,
    Json(request): Json<SubmitRequest>,
) -> impl IntoResponse {
    match frontend.submit(request).await {
        SubmitOutcome::Ack(ack) => (StatusCode::OK, Json(ack)).into_response(),
        SubmitOutcome::Unavailable => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "No healthy workers available" })),
        )
            .into_response(),
    }
}

async fn handle_status(State(frontend): State<Arc<SubmissionFrontend>>) -> impl IntoResponse {
    Json(frontend.status().await)
}
