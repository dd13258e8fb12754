//! Cache-first access to upstream resources.
//!
//! # Request Flow
//! ```text
//! CACHE_CHECK → HIT                              → Served(Hit)
//!             → MISS → UPSTREAM_FETCH → SUCCESS  → STORE → Served(Miss)
//!                                     → FAILURE  → STALE_CHECK → STALE_HIT  → Served(Stale)
//!                                                              → STALE_MISS → UpstreamFailure
//! ```
//!
//! Staleness travels beside the payload, never inside it.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue, StatusCode};
use thiserror::Error;
use url::Url;

use crate::cache::{CachedPayload, ResponseCache};
use crate::observability::metrics;
use crate::resilience::retries::{FetchRequest, RetryingFetcher};
use crate::upstream::client::TransportError;

/// Where a served payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Within TTL, no upstream call made.
    Hit,
    /// Fetched from upstream just now.
    Miss,
    /// Upstream failed; last good payload within the stale horizon.
    Stale { upstream_status: Option<StatusCode> },
}

impl Freshness {
    pub fn as_str(self) -> &'static str {
        match self {
            Freshness::Hit => "HIT",
            Freshness::Miss => "MISS",
            Freshness::Stale { .. } => "STALE",
        }
    }

    pub fn is_stale(self) -> bool {
        matches!(self, Freshness::Stale { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Served {
    pub payload: CachedPayload,
    pub freshness: Freshness,
}

/// Why no usable payload could be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamFailure {
    #[error("upstream returned {0}")]
    Status(StatusCode),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("upstream returned a body that is not JSON")]
    InvalidPayload,

    #[error("deadline passed before the upstream answered")]
    DeadlineExceeded,
}

impl UpstreamFailure {
    /// Status recorded from the upstream, if it answered at all.
    pub fn upstream_status(&self) -> Option<StatusCode> {
        match self {
            UpstreamFailure::Status(status) => Some(*status),
            UpstreamFailure::InvalidPayload => None,
            UpstreamFailure::Transport(_) => None,
            UpstreamFailure::DeadlineExceeded => None,
        }
    }

    /// Status to report downstream.
    pub fn status(&self) -> StatusCode {
        match self {
            UpstreamFailure::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            other => other.upstream_status().unwrap_or(StatusCode::BAD_GATEWAY),
        }
    }
}

/// A resource to load through the gateway.
#[derive(Debug, Clone)]
pub struct Lookup {
    pub url: Url,
    pub ttl: Duration,
    pub sensitive: bool,
}

/// Applies the cache → fetch → stale-fallback policy.
pub struct UpstreamGateway {
    cache: Arc<ResponseCache>,
    fetcher: Arc<RetryingFetcher>,
}

impl UpstreamGateway {
    pub fn new(cache: Arc<ResponseCache>, fetcher: Arc<RetryingFetcher>) -> Self {
        Self { cache, fetcher }
    }

    pub async fn load(&self, lookup: Lookup) -> Result<Served, UpstreamFailure> {
        let key = lookup.url.as_str();

        if let Some(payload) = self.cache.get_fresh(key) {
            metrics::record_cache_lookup("hit");
            tracing::debug!(key = %key, "Cache hit");
            return Ok(Served {
                payload,
                freshness: Freshness::Hit,
            });
        }
        metrics::record_cache_lookup("miss");

        let request = FetchRequest::new(lookup.url.clone())
            .header(header::ACCEPT, HeaderValue::from_static("application/json"))
            .sensitive(lookup.sensitive);

        let failure = match self.fetcher.fetch(request).await {
            Ok(response) if response.status.is_success() => {
                match serde_json::from_slice(&response.body) {
                    Ok(body) => {
                        let payload = CachedPayload {
                            body,
                            validators: response.validators,
                        };
                        self.cache.set(key, payload.clone(), lookup.ttl);
                        return Ok(Served {
                            payload,
                            freshness: Freshness::Miss,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Upstream body is not JSON");
                        UpstreamFailure::InvalidPayload
                    }
                }
            }
            Ok(response) => UpstreamFailure::Status(response.status),
            Err(e) => UpstreamFailure::Transport(e),
        };

        match self.cache.get_stale(key) {
            Some(payload) => {
                metrics::record_cache_lookup("stale");
                tracing::warn!(key = %key, failure = %failure, "Serving stale payload");
                Ok(Served {
                    payload,
                    freshness: Freshness::Stale {
                        upstream_status: failure.upstream_status(),
                    },
                })
            }
            None => {
                tracing::warn!(key = %key, failure = %failure, "Upstream failed with no fallback");
                Err(failure)
            }
        }
    }

    /// Best cached payload for `url` without contacting the upstream.
    ///
    /// Fresh entries come back as hits, expired ones within the stale
    /// horizon as stale with no recorded upstream status.
    pub fn cached(&self, url: &Url) -> Option<Served> {
        let key = url.as_str();
        if let Some(payload) = self.cache.get_fresh(key) {
            metrics::record_cache_lookup("hit");
            return Some(Served {
                payload,
                freshness: Freshness::Hit,
            });
        }
        let payload = self.cache.get_stale(key)?;
        metrics::record_cache_lookup("stale");
        Some(Served {
            payload,
            freshness: Freshness::Stale {
                upstream_status: None,
            },
        })
    }
}
