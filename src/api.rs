// src/api.rs
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::HeaderValue,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::events::StreamEvent;
use crate::ingest::pipeline::IngestPipeline;
use crate::store::Store;

/// Heartbeat interval on an idle SSE connection.
const STREAM_KEEPALIVE_SECS: u64 = 30;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 200;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    pub store: Store,
    /// Single-consumer event receiver; one live stream drains it.
    pub stream_rx: Arc<Mutex<mpsc::Receiver<StreamEvent>>>,
}

impl AppState {
    pub fn new(
        pipeline: Arc<IngestPipeline>,
        store: Store,
        stream_rx: mpsc::Receiver<StreamEvent>,
    ) -> Self {
        Self {
            pipeline,
            store,
            stream_rx: Arc::new(Mutex::new(stream_rx)),
        }
    }
}

pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/news", get(list_news))
        .route("/api/anomalies", get(list_anomalies))
        .route("/api/stream", get(stream_events))
        .route("/api/admin/run-ingest", post(run_ingest))
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "last_cycle_utc": state.pipeline.last_cycle_utc(),
        "last_ingest_utc": state.store.last_fetched_at(),
    }))
}

/// Manual trigger: run one full ingestion cycle synchronously. Waits for
/// any in-flight scheduled cycle to finish first.
async fn run_ingest(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.pipeline.run_cycle().await;
    Json(json!({ "status": "success", "stats": stats }))
}

fn parse_limit(q: &HashMap<String, String>) -> usize {
    q.get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT)
}

async fn list_news(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let items = state.store.recent_items(parse_limit(&q));
    Json(json!({ "items": items, "total": state.store.item_count() }))
}

async fn list_anomalies(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let items = state.store.recent_anomalies(parse_limit(&q));
    Json(json!({ "items": items, "total": state.store.anomaly_count() }))
}

/// Live event stream. Holds the single receiver for the duration of the
/// connection; a second subscriber waits until the first disconnects.
/// Heartbeat comments let a consumer distinguish "no new data" from a
/// stalled connection.
async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = Arc::clone(&state.stream_rx);
    let stream = async_stream::stream! {
        let mut rx = rx.lock().await;
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(data) => yield Ok(Event::default().data(data)),
                Err(e) => {
                    tracing::warn!(error = ?e, "failed to serialize stream event");
                }
            }
        }
    };
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(STREAM_KEEPALIVE_SECS))
            .text("heartbeat"),
    )
}
