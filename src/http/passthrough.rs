//! Generic read-only forwarding of upstream paths.
//!
//! Applies the same cache → fetch → stale-fallback policy as the batch
//! endpoints to any path under `/api/` they do not cover.

use std::time::Instant;

use axum::{
    extract::{Path, RawQuery, State},
    http::{Method, Request},
    response::{IntoResponse, Response},
    Json,
};
use axum::body::Body;

use crate::error::ProxyError;
use crate::http::request::request_id;
use crate::http::response::diagnostic_headers;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::upstream::paths::{upstream_url, PathCategory};
use crate::upstream::Lookup;

/// Forward `GET|HEAD /api/{*path}` to the upstream.
pub async fn passthrough_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let request_id = request_id(&request).to_string();
    let method = request.method().clone();

    let response = match forward(&state, &method, &path, query.as_deref()).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                method = %method,
                path = %path,
                error = %e,
                "Passthrough failed"
            );
            e.into_response()
        }
    };

    metrics::record_request("passthrough", response.status().as_u16(), start);
    response
}

async fn forward(
    state: &AppState,
    method: &Method,
    path: &str,
    query: Option<&str>,
) -> Result<Response, ProxyError> {
    if *method != Method::GET && *method != Method::HEAD {
        return Err(ProxyError::MethodNotAllowed(method.clone()));
    }

    let url = upstream_url(&state.base_url, path, query)?;
    let category = PathCategory::classify(path);
    let sensitive = state.sensitive.matched_rule(path);
    tracing::debug!(
        url = %url,
        category = category.as_str(),
        sensitive = ?sensitive,
        "Forwarding upstream path"
    );

    let served = state
        .gateway
        .load(Lookup {
            url,
            ttl: state.policy.ttl(category),
            sensitive: sensitive.is_some(),
        })
        .await?;

    let headers = diagnostic_headers(
        served.freshness,
        &served.payload.validators,
        &state.policy.cache_control(category),
    );
    Ok((headers, Json(served.payload.body)).into_response())
}
