//! Diagnostic response headers.
//!
//! Passthrough responses carry:
//! - `x-cache`: HIT, MISS or STALE
//! - `x-stale`: `1` when serving degraded data
//! - `x-upstream-status`: the status recorded from the failed upstream call
//! - `cache-control`: tuned per path category
//! - `etag` / `last-modified`: upstream validators, forwarded opaquely

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::cache::Validators;
use crate::error::X_UPSTREAM_STATUS;
use crate::upstream::Freshness;

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
pub const X_STALE: HeaderName = HeaderName::from_static("x-stale");

/// Build the diagnostic headers for a served payload.
pub fn diagnostic_headers(
    freshness: Freshness,
    validators: &Validators,
    cache_control: &str,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(X_CACHE, HeaderValue::from_static(freshness.as_str()));

    if let Freshness::Stale { upstream_status } = freshness {
        headers.insert(X_STALE, HeaderValue::from_static("1"));
        if let Some(status) = upstream_status {
            headers.insert(
                HeaderName::from_static(X_UPSTREAM_STATUS),
                HeaderValue::from(status.as_u16()),
            );
        }
    }

    if let Ok(value) = HeaderValue::from_str(cache_control) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    if let Some(etag) = validators.etag.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
        headers.insert(header::ETAG, etag);
    }
    if let Some(modified) = validators
        .last_modified
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
    {
        headers.insert(header::LAST_MODIFIED, modified);
    }
    headers
}
