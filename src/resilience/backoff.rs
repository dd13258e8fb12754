//! Randomized backoff between upstream retries.

use std::time::Duration;

use futures_util::future::BoxFuture;
use rand::Rng;

/// Calculate the wait before retry number `retry` (1-based), with jitter.
///
/// The deterministic part grows with each retry (`base_ms * retry`); the
/// random part, drawn from `0..jitter_ms`, keeps concurrent callers from
/// retrying in lockstep.
pub fn calculate_backoff(retry: u32, base_ms: u64, jitter_ms: u64) -> Duration {
    if retry == 0 {
        return Duration::from_millis(0);
    }

    let delay_ms = base_ms.saturating_mul(u64::from(retry));
    let jitter = if jitter_ms > 0 {
        rand::thread_rng().gen_range(0..jitter_ms)
    } else {
        0
    };

    Duration::from_millis(delay_ms.saturating_add(jitter))
}

/// How the retry loop waits.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Real waiting on the Tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        for _ in 0..50 {
            let b1 = calculate_backoff(1, 100, 50);
            assert!(b1 >= Duration::from_millis(100) && b1 < Duration::from_millis(150));

            let b2 = calculate_backoff(2, 100, 50);
            assert!(b2 >= Duration::from_millis(200) && b2 < Duration::from_millis(250));
        }

        assert_eq!(calculate_backoff(0, 100, 50), Duration::ZERO);
        assert_eq!(calculate_backoff(3, 100, 0), Duration::from_millis(300));
    }
}
