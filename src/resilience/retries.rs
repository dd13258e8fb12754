//! Retry logic.
//!
//! # Responsibilities
//! - Run one logical upstream GET as a bounded series of scheduled attempts
//! - Classify each attempt's outcome
//! - Retry transient outcomes with randomized backoff
//!
//! # Attempt State Machine
//! ```text
//! ATTEMPT → CLASSIFY → Success | Terminal          → RETURN outcome
//!                    → Transport | Retryable
//!                          → attempts left?  yes   → BACKOFF → ATTEMPT
//!                                            no    → RETURN last outcome
//! ```
//!
//! # Design Decisions
//! - 429 and 5xx are transient; 403 is transient only on sensitive paths
//! - The final outcome is always returned, never swallowed
//! - Every attempt goes through the shared scheduler

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use url::Url;

use crate::config::{RetryConfig, UpstreamConfig};
use crate::observability::metrics;
use crate::resilience::backoff::{calculate_backoff, Sleeper};
use crate::resilience::timeouts::with_timeout;
use crate::upstream::client::{TransportError, UpstreamClient, UpstreamResponse};
use crate::upstream::scheduler::UpstreamScheduler;

/// Classification of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    /// 2xx.
    Success,
    /// No response received.
    Transport,
    /// 429, 5xx, or 403 on a sensitive path.
    Retryable,
    /// Any other status; handed back to the caller as-is.
    Terminal,
}

impl OutcomeClass {
    pub fn should_retry(self) -> bool {
        matches!(self, OutcomeClass::Transport | OutcomeClass::Retryable)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeClass::Success => "success",
            OutcomeClass::Transport => "transport",
            OutcomeClass::Retryable => "retryable",
            OutcomeClass::Terminal => "terminal",
        }
    }
}

/// Classify an attempt outcome.
pub fn classify(
    outcome: &Result<UpstreamResponse, TransportError>,
    sensitive: bool,
) -> OutcomeClass {
    let status = match outcome {
        Ok(response) => response.status,
        Err(_) => return OutcomeClass::Transport,
    };

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        OutcomeClass::Retryable
    } else if status == StatusCode::FORBIDDEN && sensitive {
        OutcomeClass::Retryable
    } else if status.is_success() {
        OutcomeClass::Success
    } else {
        OutcomeClass::Terminal
    }
}

/// Attempt budget, backoff shape and per-call deadline.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub jitter_ms: u64,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(retries: &RetryConfig, upstream: &UpstreamConfig) -> Self {
        Self {
            attempts: retries.attempts,
            base_delay_ms: retries.base_delay_ms,
            jitter_ms: retries.jitter_ms,
            timeout: upstream.timeout(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default(), &UpstreamConfig::default())
    }
}

/// One logical upstream GET.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub headers: HeaderMap,
    /// Overrides the policy's attempt count.
    pub attempts: Option<u32>,
    /// Whether a 403 should be treated as transient.
    pub sensitive: bool,
}

impl FetchRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: HeaderMap::new(),
            attempts: None,
            sensitive: false,
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn sensitive(mut self, sensitive: bool) -> Self {
        self.sensitive = sensitive;
        self
    }
}

/// Executes upstream GETs through the scheduler with classified retries.
pub struct RetryingFetcher {
    client: Arc<dyn UpstreamClient>,
    scheduler: Arc<UpstreamScheduler>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(
        client: Arc<dyn UpstreamClient>,
        scheduler: Arc<UpstreamScheduler>,
        sleeper: Arc<dyn Sleeper>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            scheduler,
            sleeper,
            policy,
        }
    }

    /// Perform `request`, retrying transient outcomes.
    ///
    /// Returns the first non-retryable outcome, or the last outcome once the
    /// attempt budget is spent. Non-2xx responses are returned as `Ok`; only
    /// a missing response is an `Err`.
    pub async fn fetch(&self, request: FetchRequest) -> Result<UpstreamResponse, TransportError> {
        let attempts = request.attempts.unwrap_or(self.policy.attempts).max(1);
        let mut attempt = 0;

        loop {
            let outcome = self.attempt(&request).await;
            let class = classify(&outcome, request.sensitive);
            metrics::record_upstream_attempt(class.as_str());
            attempt += 1;

            if !class.should_retry() || attempt >= attempts {
                if class.should_retry() {
                    tracing::warn!(
                        url = %request.url,
                        attempts = attempt,
                        outcome = %describe(&outcome),
                        "Upstream retries exhausted"
                    );
                }
                return outcome;
            }

            let delay = calculate_backoff(attempt, self.policy.base_delay_ms, self.policy.jitter_ms);
            tracing::info!(
                url = %request.url,
                attempt,
                outcome = %describe(&outcome),
                delay = ?delay,
                "Retrying upstream call"
            );
            metrics::record_retry();
            self.sleeper.sleep(delay).await;
        }
    }

    async fn attempt(&self, request: &FetchRequest) -> Result<UpstreamResponse, TransportError> {
        let client = self.client.clone();
        let url = request.url.clone();
        let headers = request.headers.clone();
        let timeout = self.policy.timeout;

        let scheduled = self
            .scheduler
            .schedule(move || with_timeout(timeout, client.get(url, headers)))
            .await;

        match scheduled {
            Ok(outcome) => outcome,
            Err(e) => Err(TransportError::Aborted(e.to_string())),
        }
    }
}

fn describe(outcome: &Result<UpstreamResponse, TransportError>) -> String {
    match outcome {
        Ok(response) => response.status.to_string(),
        Err(e) => e.to_string(),
    }
}
