//! Liveness and readiness endpoints.
//!
//! - `GET /healthz`: process status plus cache and scheduler occupancy
//! - `GET /readyz`: the proxy is accepting traffic

use axum::{extract::State, Json};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::http::server::AppState;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CacheStatus {
    pub size: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QueueStatus {
    pub active: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: String,
    pub cache: CacheStatus,
    pub queue: QueueStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadyReport {
    pub status: &'static str,
    pub timestamp: String,
}

pub async fn healthz(State(state): State<AppState>) -> Json<HealthReport> {
    let queue = state.scheduler.snapshot();
    Json(HealthReport {
        status: "ok",
        timestamp: now_rfc3339(),
        cache: CacheStatus {
            size: state.cache.len(),
            max: state.cache.capacity(),
        },
        queue: QueueStatus {
            active: queue.active,
            pending: queue.pending,
        },
    })
}

pub async fn readyz() -> Json<ReadyReport> {
    Json(ReadyReport {
        status: "ready",
        timestamp: now_rfc3339(),
    })
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
