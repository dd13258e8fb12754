//! HTTP client abstraction for the upstream API.

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, StatusCode};
use futures_util::future::BoxFuture;
use thiserror::Error;
use url::Url;

use crate::cache::Validators;
use crate::config::UpstreamConfig;

/// No response was received from the upstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream request failed: {0}")]
    Request(String),

    #[error("upstream call aborted: {0}")]
    Aborted(String),
}

/// A response received from the upstream, any status.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub validators: Validators,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            validators: Validators::default(),
            body: body.into(),
        }
    }
}

/// A single upstream GET.
///
/// The returned future must own everything it needs so the scheduler can run
/// it to completion independently of the caller.
pub trait UpstreamClient: Send + Sync {
    fn get(&self, url: Url, headers: HeaderMap)
        -> BoxFuture<'static, Result<UpstreamResponse, TransportError>>;
}

/// [`UpstreamClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestUpstream {
    client: reqwest::Client,
}

impl ReqwestUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.timeout())
            .build()?;
        Ok(Self { client })
    }
}

impl UpstreamClient for ReqwestUpstream {
    fn get(
        &self,
        url: Url,
        headers: HeaderMap,
    ) -> BoxFuture<'static, Result<UpstreamResponse, TransportError>> {
        let client = self.client.clone();
        Box::pin(async move {
            let response = client
                .get(url)
                .headers(headers)
                .send()
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?;

            let status = response.status();
            let validators = Validators {
                etag: header_string(response.headers(), header::ETAG),
                last_modified: header_string(response.headers(), header::LAST_MODIFIED),
            };
            let body = response
                .bytes()
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?;

            Ok(UpstreamResponse {
                status,
                validators,
                body,
            })
        })
    }
}

fn header_string(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}
