//! Upstream access subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound handler
//!     → paths.rs (canonical URL, category, sensitivity)
//!     → gateway.rs (fresh cache check)
//!     → resilience::retries (classified retries)
//!     → scheduler.rs (global FIFO admission, pacing)
//!     → client.rs (one HTTP GET)
//!     → gateway.rs (store, or stale fallback)
//! ```

pub mod client;
pub mod gateway;
pub mod paths;
pub mod scheduler;

pub use client::{ReqwestUpstream, TransportError, UpstreamClient, UpstreamResponse};
pub use gateway::{Freshness, Lookup, Served, UpstreamFailure, UpstreamGateway};
pub use paths::{CachePolicy, PathCategory, SensitivePaths};
pub use scheduler::{QueueSnapshot, UpstreamScheduler};
