//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! Lookup:
//!     key (canonical upstream URL)
//!     → store.rs get_fresh (age <= entry ttl)
//!     → on upstream failure: store.rs get_stale (age <= stale horizon)
//!
//! Refresh:
//!     successful upstream response → store.rs set (replace, reset age)
//! ```
//!
//! # Design Decisions
//! - Expiry is evaluated at read time; entries leave only through LRU eviction
//! - The stale horizon is wider than every TTL, so expired entries remain a fallback
//! - Ages come from an injected [`Clock`]

pub mod clock;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{CachedPayload, ResponseCache, Validators};
