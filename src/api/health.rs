//! Health check endpoint

use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::services::{HealthStatus, ServiceHealth};
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: &'static str,
    pub checked_at: DateTime<Utc>,
    pub services: HashMap<String, ServiceHealth>,
}

/// Aggregate health: the worst status of any service; 503 when unhealthy.
async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let services = state.services.health_all().await;
    let status = services
        .values()
        .map(|h| h.status.clone())
        .max_by_key(|s| match s {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
        })
        .unwrap_or(HealthStatus::Healthy);

    let code = if status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            checked_at: Utc::now(),
            services,
        }),
    )
}

pub fn router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}
