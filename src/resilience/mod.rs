//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! One logical upstream GET:
//!     → retries.rs (attempt loop, through the upstream scheduler)
//!     → timeouts.rs (per-attempt deadline)
//!     → retries.rs classify (success | transport | retryable | terminal)
//!     → On retryable: backoff.rs (randomized wait), next attempt
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream call has a deadline
//! - Only GET is ever issued, so every call is safe to retry
//! - Jittered backoff prevents synchronized retry storms
//! - Waiting goes through an injectable [`backoff::Sleeper`]

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use backoff::{calculate_backoff, Sleeper, TokioSleeper};
pub use retries::{classify, FetchRequest, OutcomeClass, RetryPolicy, RetryingFetcher};
pub use timeouts::with_timeout;
