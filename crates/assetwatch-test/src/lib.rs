//! Helpers for testing the web server and service.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using [`upstream_server`], make sure that the server is held until all requests to
//!    it have been made. If the server is dropped, connections to it will fail. To avoid this,
//!    assign it to a variable: `let upstream = upstream_server().await;`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;
use url::Url;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `assetwatch` crates and mutes all
///    other logs (such as hyper or reqwest).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new(
            "assetwatch=trace,assetwatch_service=trace",
        ))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Mutable state of the fake upstream, shared with the test body.
///
/// The canned responses can be swapped mid-test to simulate upstream data
/// changes or failures; the hit counters record how often each route was
/// actually called.
#[derive(Debug)]
pub struct UpstreamState {
    /// Component listings by asset id; assets not present here 404.
    pub components: Mutex<HashMap<u32, Value>>,
    pub devices: Mutex<Value>,
    pub stats: Mutex<Value>,
    /// Raw response of the `cpe/match` route.
    pub match_response: Mutex<Value>,
    pub select_response: Mutex<Value>,
    /// Artificial latency of the `cpe/match` route.
    pub match_delay: Mutex<Duration>,

    pub component_hits: AtomicUsize,
    pub device_hits: AtomicUsize,
    pub match_hits: AtomicUsize,
}

impl Default for UpstreamState {
    fn default() -> Self {
        Self {
            components: Mutex::new(HashMap::new()),
            devices: Mutex::new(json!([])),
            stats: Mutex::new(json!([])),
            match_response: Mutex::new(json!({
                "success": false,
                "message": "no match found"
            })),
            select_response: Mutex::new(json!({
                "success": true,
                "message": "CPE selection saved"
            })),
            match_delay: Mutex::new(Duration::ZERO),
            component_hits: AtomicUsize::new(0),
            device_hits: AtomicUsize::new(0),
            match_hits: AtomicUsize::new(0),
        }
    }
}

/// A fake inventory/CPE backend listening on a random local port.
///
/// The server is shut down when this is dropped.
#[derive(Debug)]
pub struct UpstreamServer {
    pub state: Arc<UpstreamState>,
    socket: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl UpstreamServer {
    /// The base URL of the fake upstream.
    pub fn url(&self) -> Url {
        format!("http://{}/", self.socket).parse().unwrap()
    }
}

impl Drop for UpstreamServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawns a fake upstream with empty default responses.
pub async fn upstream_server() -> UpstreamServer {
    let state = Arc::new(UpstreamState::default());

    let app = Router::new()
        .route("/assetComponents/{asset_id}", get(asset_components))
        .route("/devices", get(devices))
        .route("/dashboard/stats", get(dashboard_stats))
        .route("/cpe/match", post(cpe_match))
        .route("/cpe/select", post(cpe_select))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let socket = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    UpstreamServer {
        state,
        socket,
        handle,
    }
}

async fn asset_components(
    State(state): State<Arc<UpstreamState>>,
    Path(asset_id): Path<u32>,
) -> impl IntoResponse {
    state.component_hits.fetch_add(1, Ordering::SeqCst);
    match state.components.lock().unwrap().get(&asset_id) {
        Some(data) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": data })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "message": "asset not found" })),
        ),
    }
}

async fn devices(State(state): State<Arc<UpstreamState>>) -> Json<Value> {
    state.device_hits.fetch_add(1, Ordering::SeqCst);
    let data = state.devices.lock().unwrap().clone();
    Json(json!({ "success": true, "data": data }))
}

async fn dashboard_stats(State(state): State<Arc<UpstreamState>>) -> Json<Value> {
    let data = state.stats.lock().unwrap().clone();
    Json(json!({ "success": true, "data": data }))
}

async fn cpe_match(State(state): State<Arc<UpstreamState>>) -> Json<Value> {
    state.match_hits.fetch_add(1, Ordering::SeqCst);
    let delay = *state.match_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    Json(state.match_response.lock().unwrap().clone())
}

async fn cpe_select(State(state): State<Arc<UpstreamState>>) -> Json<Value> {
    Json(state.select_response.lock().unwrap().clone())
}

/// A component listing entry in the upstream wire format.
pub fn component_json(component_id: u32, asset_id: u32) -> Value {
    json!({
        "component_id": component_id,
        "asset_id": asset_id,
        "component_type": "Software",
        "vendor": "apache",
        "product": "http_server",
        "version": "2.4.41",
        "cpe_full_string": null,
        "created_at": "2026-01-05T08:00:00Z",
        "updated_at": "2026-01-05T08:00:00Z"
    })
}
