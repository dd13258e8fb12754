//! Errors surfaced to HTTP clients and at startup.

use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::upstream::paths::PathError;
use crate::upstream::{TransportError, UpstreamFailure};

/// Header carrying the status the upstream answered with.
pub const X_UPSTREAM_STATUS: &str = "x-upstream-status";

/// Errors rendered as JSON responses.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{0}")]
    ClientInput(String),

    #[error("method {0} is not allowed")]
    MethodNotAllowed(Method),

    #[error("upstream responded with {status}")]
    Upstream { status: StatusCode },

    #[error("upstream unreachable: {0}")]
    Transport(#[from] TransportError),

    #[error("upstream returned an unreadable payload")]
    InvalidPayload,

    #[error("upstream did not answer in time")]
    GatewayTimeout,
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::ClientInput(_) => StatusCode::BAD_REQUEST,
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::Upstream { status } => *status,
            ProxyError::Transport(_) | ProxyError::InvalidPayload => StatusCode::BAD_GATEWAY,
            ProxyError::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ProxyError::ClientInput(_) => "bad_request",
            ProxyError::MethodNotAllowed(_) => "method_not_allowed",
            ProxyError::Upstream { .. } => "upstream_error",
            ProxyError::Transport(_) => "bad_gateway",
            ProxyError::InvalidPayload => "invalid_upstream_payload",
            ProxyError::GatewayTimeout => "gateway_timeout",
        }
    }
}

impl From<UpstreamFailure> for ProxyError {
    fn from(failure: UpstreamFailure) -> Self {
        match failure {
            UpstreamFailure::Status(status) => ProxyError::Upstream { status },
            UpstreamFailure::Transport(e) => ProxyError::Transport(e),
            UpstreamFailure::InvalidPayload => ProxyError::InvalidPayload,
            UpstreamFailure::DeadlineExceeded => ProxyError::GatewayTimeout,
        }
    }
}

impl From<PathError> for ProxyError {
    fn from(e: PathError) -> Self {
        ProxyError::ClientInput(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let upstream = match &self {
            ProxyError::Upstream { status } => Some(status.as_u16()),
            _ => None,
        };
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
            status: upstream,
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(code) = upstream {
            response
                .headers_mut()
                .insert(X_UPSTREAM_STATUS, HeaderValue::from(code));
        }
        response
    }
}

/// Errors that prevent the proxy from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot build upstream client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid upstream base URL: {0}")]
    BaseUrl(#[from] url::ParseError),

    #[error("invalid sensitive path rule: {0}")]
    Pattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
