use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use engine::metrics::{CounterSnapshot, Counters};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

/// State behind the operational endpoints.
#[derive(Clone)]
pub struct HealthState {
    pub service: &'static str,
    pub ready: Arc<AtomicBool>,
    pub counters: Counters,
}

impl HealthState {
    pub fn new(service: &'static str, counters: Counters) -> Self {
        Self {
            service,
            ready: Arc::new(AtomicBool::new(false)),
            counters,
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn health(State(state): State<HealthState>) -> Json<Value> {
    Json(json!({ "status": "healthy", "service": state.service }))
}

async fn ready(State(state): State<HealthState>) -> (StatusCode, Json<Value>) {
    if state.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not ready" })),
        )
    }
}

async fn metrics(State(state): State<HealthState>) -> Json<CounterSnapshot> {
    Json(state.counters.snapshot())
}

/// Binds `port` on all interfaces; fails fast so startup can abort.
pub async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding health server on {addr}"))
}

pub async fn serve(
    listener: TcpListener,
    state: HealthState,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "health server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .context("health server")
}
