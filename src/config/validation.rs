//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, addresses parse)
//! - Enforce the cache invariant: stale horizon covers every TTL
//! - Compile-check the sensitive path rules
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("cache.stale_horizon_secs ({horizon}) is shorter than the {category} ttl ({ttl})")]
    StaleHorizonTooShort {
        category: &'static str,
        ttl: u64,
        horizon: u64,
    },

    #[error("listener.batch_deadline_secs ({deadline}) must be below listener.request_timeout_secs ({timeout})")]
    BatchDeadline { deadline: u64, timeout: u64 },

    #[error("upstream.base_url {0:?} is not an http(s) URL")]
    BaseUrl(String),

    #[error("{field} {value:?} is not a socket address")]
    Address { field: &'static str, value: String },

    #[error("sensitive path rule {name:?} does not compile: {reason}")]
    SensitivePattern { name: String, reason: String },
}

/// Validate a configuration, collecting every problem.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let positive = [
        ("scheduler.concurrency", config.scheduler.concurrency as u64),
        ("retries.attempts", u64::from(config.retries.attempts)),
        ("cache.max_entries", config.cache.max_entries as u64),
        ("upstream.timeout_secs", config.upstream.timeout_secs),
        ("listener.request_timeout_secs", config.listener.request_timeout_secs),
        ("listener.batch_deadline_secs", config.listener.batch_deadline_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    let (deadline, timeout) = (
        config.listener.batch_deadline_secs,
        config.listener.request_timeout_secs,
    );
    if deadline > 0 && timeout > 0 && deadline >= timeout {
        errors.push(ValidationError::BatchDeadline { deadline, timeout });
    }

    if config.rate_limit.enabled && config.rate_limit.requests_per_second == 0 {
        errors.push(ValidationError::Zero {
            field: "rate_limit.requests_per_second",
        });
    }

    let horizon = config.cache.stale_horizon_secs;
    for (category, ttl) in config.cache.ttl.named() {
        if ttl == 0 {
            errors.push(ValidationError::Zero { field: ttl_field(category) });
        } else if horizon < ttl {
            errors.push(ValidationError::StaleHorizonTooShort { category, ttl, horizon });
        }
    }

    match Url::parse(&config.upstream.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        _ => errors.push(ValidationError::BaseUrl(config.upstream.base_url.clone())),
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::Address {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::Address {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    for rule in &config.retries.sensitive_paths {
        if let Err(e) = regex::Regex::new(&rule.pattern) {
            errors.push(ValidationError::SensitivePattern {
                name: rule.name.clone(),
                reason: e.to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn ttl_field(category: &str) -> &'static str {
    match category {
        "bootstrap" => "cache.ttl.bootstrap_secs",
        "history" => "cache.ttl.history_secs",
        "picks" => "cache.ttl.picks_secs",
        "summary" => "cache.ttl.summary_secs",
        _ => "cache.ttl.default_secs",
    }
}
