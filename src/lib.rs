//! Caching, pacing proxy in front of a rate-limited sports-data API.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod upstream;

pub use config::schema::ProxyConfig;
pub use error::{ProxyError, StartupError};
pub use http::{build_router, AppState, HttpServer};
pub use lifecycle::Shutdown;
