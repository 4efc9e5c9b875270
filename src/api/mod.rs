//! REST API for show monitoring and remote commands
//!
//! Exposes driver telemetry, the current-value table and device states, and
//! accepts commands over HTTP for consoles that cannot speak OSC.
//! Default bind: 127.0.0.1:8125

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::command::Command;
use crate::hub::{Hub, HubStatus};
use crate::router::RouteError;
use crate::stats::DriverStats;

/// Shared state for API handlers
pub struct ApiState {
    pub hub: Arc<Hub>,
}

/// API error response
#[derive(Debug, Serialize)]
struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    error: String,
}

impl From<RouteError> for ApiError {
    fn from(err: RouteError) -> Self {
        let status = match err {
            RouteError::UnknownPrefix { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        Self {
            status,
            error: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Build the API router
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/status", get(get_status))
        .route("/api/drivers", get(list_drivers))
        .route("/api/values", get(list_values))
        .route("/api/devices", get(list_devices))
        .route("/api/devices/:device_type", put(publish_device_state))
        .route("/api/command", post(post_command))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /api/health - Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// GET /api/status - Drivers, devices and engine summary
async fn get_status(State(state): State<Arc<ApiState>>) -> Json<HubStatus> {
    Json(state.hub.status())
}

/// GET /api/drivers - Per-driver telemetry
async fn list_drivers(State(state): State<Arc<ApiState>>) -> Json<Vec<DriverStats>> {
    Json(state.hub.stats().snapshot())
}

/// GET /api/values - Current-value table
async fn list_values(State(state): State<Arc<ApiState>>) -> Json<BTreeMap<String, f64>> {
    Json(state.hub.engine().current_values())
}

/// GET /api/devices - Published device states
async fn list_devices(State(state): State<Arc<ApiState>>) -> Json<BTreeMap<String, Value>> {
    Json(state.hub.devices().snapshot())
}

/// PUT /api/devices/:device_type - Publish a device state
async fn publish_device_state(
    Path(device_type): Path<String>,
    State(state): State<Arc<ApiState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let replaced = state.hub.devices().publish(&device_type, body).is_some();
    Json(serde_json::json!({
        "ok": true,
        "device_type": device_type,
        "replaced": replaced
    }))
}

/// POST /api/command - Dispatch `{address, args}` through the hub
async fn post_command(
    State(state): State<Arc<ApiState>>,
    Json(command): Json<Command>,
) -> Result<Json<Value>, ApiError> {
    state.hub.dispatch(&command)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// Start the API server
pub async fn start_server(state: Arc<ApiState>, bind: &str) -> Result<()> {
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind API server on {}", bind))?;
    info!("🌐 Status API on http://{}", listener.local_addr()?);

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}
