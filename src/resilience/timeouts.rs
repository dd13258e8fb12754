//! Timeout enforcement.
//!
//! Every upstream call carries a deadline; expiry is reported as a
//! transport failure so the retry policy treats it like no response at all.

use std::future::Future;
use std::time::Duration;

use crate::upstream::TransportError;

/// Run `call`, failing with [`TransportError::Timeout`] once `limit` elapses.
pub async fn with_timeout<F, T>(limit: Duration, call: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(outcome) => outcome,
        Err(_) => Err(TransportError::Timeout(limit)),
    }
}
