//! Health and status HTTP endpoint.
//!
//! - `GET /health`: liveness with uptime
//! - `GET /`: service banner
//! - `GET /status`: the scheduler's `MonitoringStatus`
//! - anything else: 404 with the requested path

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use slotwatch_core::{MonitoringScheduler, MonitoringStatus};
use tokio::net::TcpListener;

pub const SERVICE_NAME: &str = "slotwatch";

#[derive(Clone)]
pub struct HealthState {
    scheduler: Arc<MonitoringScheduler>,
    started: Instant,
}

impl HealthState {
    pub fn new(scheduler: Arc<MonitoringScheduler>) -> Self {
        Self {
            scheduler,
            started: Instant::now(),
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    service: &'static str,
    version: &'static str,
    uptime_secs: u64,
}

#[derive(Debug, Serialize)]
struct BannerResponse {
    message: &'static str,
    status: &'static str,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct NotFoundResponse {
    error: &'static str,
    path: String,
}

async fn handle_health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        timestamp: Utc::now(),
        service: SERVICE_NAME,
        version: slotwatch_core::VERSION,
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

async fn handle_banner(State(state): State<HealthState>) -> Json<BannerResponse> {
    Json(BannerResponse {
        message: "slotwatch reservation monitor",
        status: state.scheduler.state().as_str(),
        timestamp: Utc::now(),
    })
}

async fn handle_status(State(state): State<HealthState>) -> Json<MonitoringStatus> {
    Json(state.scheduler.status())
}

async fn handle_not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(NotFoundResponse {
            error: "Not Found",
            path: uri.path().to_string(),
        }),
    )
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/", get(handle_banner))
        .route("/status", get(handle_status))
        .fallback(handle_not_found)
        .with_state(state)
}

/// Serve until `shutdown` resolves; in-flight requests complete first.
pub async fn serve<F>(listener: TcpListener, state: HealthState, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
