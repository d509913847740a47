//! Probe server for the ingestion worker.
//!
//! - `GET /health` – liveness check; returns `{"status":"ok"}` while the process runs.
//! - `GET /metrics` – message-outcome and indexing counters since startup.
//!
//! The worker has no synchronous ingestion API; jobs arrive only through the queue.

use crate::metrics::{IngestMetrics, MetricsSnapshot};
use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::sync::Arc;

/// Build the probe router.
pub fn create_router(metrics: Arc<IngestMetrics>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .with_state(metrics)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn get_metrics(State(metrics): State<Arc<IngestMetrics>>) -> Json<MetricsSnapshot> {
    Json(metrics.snapshot())
}
