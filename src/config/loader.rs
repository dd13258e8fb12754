//! Configuration loading from disk and the environment.

use std::fs;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::{LogFormat, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_VAR: &str = "PROXY_CONFIG";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load the startup configuration.
///
/// Reads `.env` if present, starts from defaults (or the TOML file named by
/// `PROXY_CONFIG`), applies environment overrides and validates the result.
pub fn load_from_env() -> Result<ProxyConfig, ConfigError> {
    dotenvy::dotenv().ok();

    let mut config = match std::env::var(CONFIG_PATH_VAR) {
        Ok(path) => toml::from_str(&fs::read_to_string(path)?)?,
        Err(_) => ProxyConfig::default(),
    };
    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay environment-supplied values onto `config`.
///
/// `lookup` resolves a variable name to its value, if set.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(addr) = env.string("BIND_ADDRESS") {
        config.listener.bind_address = addr;
    } else if let Some(port) = env.parse::<u16>("PORT")? {
        config.listener.bind_address = format!("0.0.0.0:{port}");
    }
    env.set("REQUEST_TIMEOUT_SECS", &mut config.listener.request_timeout_secs)?;
    env.set("BATCH_DEADLINE_SECS", &mut config.listener.batch_deadline_secs)?;

    if let Some(url) = env.string("UPSTREAM_BASE_URL") {
        config.upstream.base_url = url;
    }
    env.set("UPSTREAM_TIMEOUT_SECS", &mut config.upstream.timeout_secs)?;
    if let Some(origins) = env.string("ALLOWED_ORIGINS") {
        config.security.allowed_origins = origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
    }

    env.set("UPSTREAM_CONCURRENCY", &mut config.scheduler.concurrency)?;
    env.set("UPSTREAM_DELAY_MS", &mut config.scheduler.dispatch_delay_ms)?;

    env.set("TTL_BOOTSTRAP_SECS", &mut config.cache.ttl.bootstrap_secs)?;
    env.set("TTL_HISTORY_SECS", &mut config.cache.ttl.history_secs)?;
    env.set("TTL_PICKS_SECS", &mut config.cache.ttl.picks_secs)?;
    env.set("TTL_SUMMARY_SECS", &mut config.cache.ttl.summary_secs)?;
    env.set("TTL_DEFAULT_SECS", &mut config.cache.ttl.default_secs)?;
    env.set("STALE_HORIZON_SECS", &mut config.cache.stale_horizon_secs)?;
    env.set("CACHE_MAX_ENTRIES", &mut config.cache.max_entries)?;

    env.set("RETRY_ATTEMPTS", &mut config.retries.attempts)?;
    env.set("RETRY_BASE_MS", &mut config.retries.base_delay_ms)?;
    env.set("RETRY_JITTER_MS", &mut config.retries.jitter_ms)?;

    env.set("RATE_LIMIT_ENABLED", &mut config.rate_limit.enabled)?;
    env.set("RATE_LIMIT_RPS", &mut config.rate_limit.requests_per_second)?;
    env.set("RATE_LIMIT_BURST", &mut config.rate_limit.burst_size)?;

    if let Some(level) = env.string("LOG_LEVEL") {
        config.observability.log_level = level;
    }
    if let Some(format) = env.string("LOG_FORMAT") {
        config.observability.log_format = match format.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => return Err(ConfigError::Env { var: "LOG_FORMAT", value: format }),
        };
    }
    env.set("METRICS_ENABLED", &mut config.observability.metrics_enabled)?;
    if let Some(addr) = env.string("METRICS_ADDRESS") {
        config.observability.metrics_address = addr;
    }

    Ok(())
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, var: &str) -> Option<String> {
        (self.lookup)(var).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: FromStr>(&self, var: &'static str) -> Result<Option<T>, ConfigError> {
        match self.string(var) {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::Env { var, value: raw }),
            None => Ok(None),
        }
    }

    fn set<T: FromStr>(&self, var: &'static str, slot: &mut T) -> Result<(), ConfigError> {
        if let Some(value) = self.parse(var)? {
            *slot = value;
        }
        Ok(())
    }
}
