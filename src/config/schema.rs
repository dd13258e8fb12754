//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the caching proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, inbound timeout).
    pub listener: ListenerConfig,

    /// Upstream API location and per-call limits.
    pub upstream: UpstreamConfig,

    /// Upstream admission gate settings.
    pub scheduler: SchedulerConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Browser-facing security settings.
    pub security: SecurityConfig,

    /// Inbound rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Hard bound on a whole inbound request, in seconds.
    pub request_timeout_secs: u64,

    /// Time budget for upstream work in one batch request, in seconds.
    /// IDs still unresolved when it runs out are answered from cache or
    /// reported as 504. Must stay below `request_timeout_secs`.
    pub batch_deadline_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 120,
            batch_deadline_secs: 90,
        }
    }
}

impl ListenerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn batch_deadline(&self) -> Duration {
        Duration::from_secs(self.batch_deadline_secs)
    }
}

/// Upstream API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL every proxied path is appended to.
    pub base_url: String,

    /// User-Agent sent on every upstream call.
    pub user_agent: String,

    /// Timeout for a single upstream GET, in seconds.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://fantasy.premierleague.com/api".to_string(),
            user_agent: concat!("scoreboard-proxy/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 15,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of upstream calls in flight.
    pub concurrency: usize,

    /// Delay before a finished call frees its slot, in milliseconds.
    pub dispatch_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            dispatch_delay_ms: 150,
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached responses before LRU eviction.
    pub max_entries: usize,

    /// How long an entry stays usable as a degraded fallback, in seconds.
    pub stale_horizon_secs: u64,

    /// Freshness windows per path category.
    pub ttl: TtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            stale_horizon_secs: 6 * 60 * 60,
            ttl: TtlConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn stale_horizon(&self) -> Duration {
        Duration::from_secs(self.stale_horizon_secs)
    }
}

/// Freshness windows, in seconds, per path category.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TtlConfig {
    pub bootstrap_secs: u64,
    pub history_secs: u64,
    pub picks_secs: u64,
    pub summary_secs: u64,
    /// Anything not matching a named category.
    pub default_secs: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            bootstrap_secs: 300,
            history_secs: 60,
            picks_secs: 60,
            summary_secs: 60,
            default_secs: 60,
        }
    }
}

impl TtlConfig {
    /// All configured TTLs with their names, for validation.
    pub fn named(&self) -> [(&'static str, u64); 5] {
        [
            ("bootstrap", self.bootstrap_secs),
            ("history", self.history_secs),
            ("picks", self.picks_secs),
            ("summary", self.summary_secs),
            ("default", self.default_secs),
        ]
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total tries per logical upstream call.
    pub attempts: u32,

    /// Backoff step in milliseconds; retry `n` waits `base * n` plus jitter.
    pub base_delay_ms: u64,

    /// Upper bound of the random jitter added to each backoff, in milliseconds.
    pub jitter_ms: u64,

    /// Paths on which a 403 is treated as transient.
    pub sensitive_paths: Vec<SensitivePathRule>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 300,
            jitter_ms: 250,
            sensitive_paths: vec![SensitivePathRule::default()],
        }
    }
}

/// A named regex identifying upstream paths prone to transient 403s.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SensitivePathRule {
    pub name: String,
    pub pattern: String,
}

impl Default for SensitivePathRule {
    fn default() -> Self {
        Self {
            name: "event-picks".to_string(),
            pattern: r"/entry/\d+/event/\d+/picks/?$".to_string(),
        }
    }
}

/// Browser-facing security configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// Origins allowed by CORS. Empty or `*` allows any origin.
    pub allowed_origins: Vec<String>,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests per second per IP.
    pub requests_per_second: u32,

    /// Burst capacity.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 10,
            burst_size: 40,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
