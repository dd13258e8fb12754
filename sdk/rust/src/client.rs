//! Typed client for the scoreboard proxy.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type ClientResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub size: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub active: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: String,
    pub cache: CacheStatus,
    pub queue: QueueStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyReport {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryItem {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub stale: Option<bool>,
    #[serde(default)]
    pub upstream: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub results: Vec<SummaryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: u64,
    pub ok: bool,
    pub points: Option<i64>,
    pub raw: Option<Value>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub stale: Option<bool>,
    #[serde(default)]
    pub upstream: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub results: Vec<HistoryItem>,
    pub gw: u32,
}

pub struct ScoreboardClient {
    client: Client,
    proxy_url: String,
}

impl ScoreboardClient {
    pub fn new(proxy_url: &str) -> Self {
        Self {
            client: Client::new(),
            proxy_url: proxy_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn health(&self) -> ClientResult<HealthReport> {
        self.get_json("/healthz").await
    }

    pub async fn ready(&self) -> ClientResult<ReadyReport> {
        self.get_json("/readyz").await
    }

    /// Fetch entry summaries for `ids`, results in request order.
    pub async fn summary(&self, ids: &[u64]) -> ClientResult<SummaryResponse> {
        self.get_json(&format!("/api/aggregate/summary?ids={}", join_ids(ids)))
            .await
    }

    /// Fetch points for gameweek `gw` for each of `ids`.
    pub async fn history(&self, ids: &[u64], gw: u32) -> ClientResult<HistoryResponse> {
        self.get_json(&format!(
            "/api/aggregate/history?ids={}&gw={}",
            join_ids(ids),
            gw
        ))
        .await
    }

    /// Raw GET against the proxy, e.g. `/api/bootstrap-static/`.
    ///
    /// Non-2xx statuses are returned as-is so callers can inspect the
    /// `x-cache` and `x-upstream-status` headers.
    pub async fn get(&self, path: &str) -> Result<Response, reqwest::Error> {
        self.client
            .get(format!("{}{}", self.proxy_url, path))
            .send()
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let resp = self.get(path).await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(format!("Proxy returned error status {}: {}", status, text).into());
        }

        Ok(serde_json::from_str::<T>(&text)?)
    }
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
