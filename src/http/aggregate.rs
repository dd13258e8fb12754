//! Batch endpoints.
//!
//! - `GET /api/aggregate/summary?ids=1,2,3`
//! - `GET /api/aggregate/history?ids=1,2,3&gw=5`

use std::collections::HashMap;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};

use crate::aggregate::{parse_gameweek, parse_ids, HistoryResponse, SummaryResponse};
use crate::error::ProxyError;
use crate::http::server::AppState;
use crate::observability::metrics;

pub async fn summary_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let start = Instant::now();
    let response = summary(&state, &params).await.into_response();
    metrics::record_request("aggregate_summary", response.status().as_u16(), start);
    response
}

pub async fn history_handler(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let start = Instant::now();
    let response = history(&state, &params).await.into_response();
    metrics::record_request("aggregate_history", response.status().as_u16(), start);
    response
}

async fn summary(
    state: &AppState,
    params: &HashMap<String, String>,
) -> Result<Json<SummaryResponse>, ProxyError> {
    let ids = parse_ids(params.get("ids").map(String::as_str))?;
    tracing::debug!(count = ids.len(), "Summary batch");

    let results = state.aggregates.summary(&ids).await?;
    Ok(Json(SummaryResponse { results }))
}

async fn history(
    state: &AppState,
    params: &HashMap<String, String>,
) -> Result<Json<HistoryResponse>, ProxyError> {
    let ids = parse_ids(params.get("ids").map(String::as_str))?;
    let gw = parse_gameweek(params.get("gw").map(String::as_str))?;
    tracing::debug!(count = ids.len(), gw, "History batch");

    let results = state.aggregates.history(&ids, gw).await?;
    Ok(Json(HistoryResponse { results, gw }))
}
