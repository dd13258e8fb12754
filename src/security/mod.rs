//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → cors.rs (allowed origins, read-only methods)
//!     → rate_limit.rs (per-IP token bucket)
//!     → handlers
//! ```
//!
//! # Design Decisions
//! - Read-only surface: only GET/HEAD reach the upstream
//! - Rate limiting keys on the peer address, never on client-supplied headers

pub mod cors;
pub mod rate_limit;

pub use cors::cors_layer;
pub use rate_limit::{rate_limit_middleware, RateLimiterState};
