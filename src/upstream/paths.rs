//! Upstream path policy: URL building, categories, sensitivity.

use std::time::Duration;

use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::config::{SensitivePathRule, TtlConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path {0:?} escapes the upstream API root")]
    Traversal(String),

    #[error("cannot build upstream URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Build the canonical upstream URL for `path`, forwarding `query` verbatim.
///
/// The result doubles as the cache key.
pub fn upstream_url(base: &Url, path: &str, query: Option<&str>) -> Result<Url, PathError> {
    if path.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err(PathError::Traversal(path.to_string()));
    }

    let mut url = Url::parse(&format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    ))?;
    url.set_query(query.filter(|q| !q.is_empty()));
    Ok(url)
}

/// Per-entity summary resource.
pub fn entry_summary_url(base: &Url, id: u64) -> Result<Url, PathError> {
    upstream_url(base, &format!("entry/{id}/"), None)
}

/// Per-entity history resource.
pub fn entry_history_url(base: &Url, id: u64) -> Result<Url, PathError> {
    upstream_url(base, &format!("entry/{id}/history/"), None)
}

/// Path category, selecting TTL and cache-control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathCategory {
    Bootstrap,
    History,
    Picks,
    Summary,
    Default,
}

impl PathCategory {
    pub fn classify(path: &str) -> Self {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            ["bootstrap-static", ..] => PathCategory::Bootstrap,
            [.., "picks"] => PathCategory::Picks,
            [.., "history"] => PathCategory::History,
            ["entry", id] if id.bytes().all(|b| b.is_ascii_digit()) => PathCategory::Summary,
            _ => PathCategory::Default,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PathCategory::Bootstrap => "bootstrap",
            PathCategory::History => "history",
            PathCategory::Picks => "picks",
            PathCategory::Summary => "summary",
            PathCategory::Default => "default",
        }
    }
}

/// Maps path categories to freshness windows and client cache directives.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    ttl: TtlConfig,
    stale_horizon: Duration,
}

impl CachePolicy {
    pub fn new(ttl: TtlConfig, stale_horizon: Duration) -> Self {
        Self { ttl, stale_horizon }
    }

    pub fn ttl(&self, category: PathCategory) -> Duration {
        let secs = match category {
            PathCategory::Bootstrap => self.ttl.bootstrap_secs,
            PathCategory::History => self.ttl.history_secs,
            PathCategory::Picks => self.ttl.picks_secs,
            PathCategory::Summary => self.ttl.summary_secs,
            PathCategory::Default => self.ttl.default_secs,
        };
        Duration::from_secs(secs)
    }

    /// `cache-control` value for responses in `category`.
    pub fn cache_control(&self, category: PathCategory) -> String {
        format!(
            "public, max-age={}, stale-if-error={}",
            self.ttl(category).as_secs(),
            self.stale_horizon.as_secs()
        )
    }
}

/// Named predicate for paths where the upstream transiently answers 403.
#[derive(Debug, Clone)]
pub struct SensitivePaths {
    rules: Vec<(String, Regex)>,
}

impl SensitivePaths {
    pub fn from_rules(rules: &[SensitivePathRule]) -> Result<Self, regex::Error> {
        let rules = rules
            .iter()
            .map(|rule| Ok((rule.name.clone(), Regex::new(&rule.pattern)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    /// Name of the first rule matching `path`.
    pub fn matched_rule(&self, path: &str) -> Option<&str> {
        let path = normalize(path);
        self.rules
            .iter()
            .find(|(_, pattern)| pattern.is_match(&path))
            .map(|(name, _)| name.as_str())
    }

    pub fn is_sensitive(&self, path: &str) -> bool {
        self.matched_rule(path).is_some()
    }
}

fn normalize(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}
