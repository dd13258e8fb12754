//! Batch lookups across many entity IDs.
//!
//! Every batch yields exactly one result per requested ID, in request order.
//! IDs are processed one after another; the shared scheduler already bounds
//! upstream concurrency, so a batch is not its own concurrency domain.
//!
//! A batch has a deadline. Once it passes, the in-flight lookup is abandoned
//! (its scheduled upstream call still completes and fills the cache) and the
//! remaining IDs are answered from cache alone, or marked 504.

pub mod types;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use url::Url;

use crate::error::ProxyError;
use crate::upstream::gateway::{Freshness, Lookup, Served, UpstreamFailure, UpstreamGateway};
use crate::upstream::paths::{entry_history_url, entry_summary_url, CachePolicy, PathCategory};

pub use types::{HistoryItem, HistoryResponse, SummaryItem, SummaryResponse};

/// Field holding the per-period series in a history payload.
const SERIES_FIELD: &str = "current";
/// Field identifying the period of a series record.
const PERIOD_FIELD: &str = "event";
const POINTS_FIELD: &str = "points";

/// Parse a comma-separated ID list.
///
/// Blank tokens are skipped; a missing or empty list, or any non-numeric
/// token, is a client error.
pub fn parse_ids(raw: Option<&str>) -> Result<Vec<u64>, ProxyError> {
    let ids = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<u64>()
                .map_err(|_| ProxyError::ClientInput(format!("invalid id {token:?}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if ids.is_empty() {
        return Err(ProxyError::ClientInput(
            "ids query parameter must list at least one id".into(),
        ));
    }
    Ok(ids)
}

/// Parse the gameweek number of a history batch.
pub fn parse_gameweek(raw: Option<&str>) -> Result<u32, ProxyError> {
    let raw = raw.map(str::trim).filter(|v| !v.is_empty()).ok_or_else(|| {
        ProxyError::ClientInput("gw query parameter is required".into())
    })?;
    raw.parse()
        .map_err(|_| ProxyError::ClientInput(format!("invalid gw {raw:?}")))
}

/// Fans batch requests out over the gateway.
pub struct AggregateService {
    gateway: Arc<UpstreamGateway>,
    policy: Arc<CachePolicy>,
    base_url: Url,
    deadline: Duration,
}

impl AggregateService {
    pub fn new(
        gateway: Arc<UpstreamGateway>,
        policy: Arc<CachePolicy>,
        base_url: Url,
        deadline: Duration,
    ) -> Self {
        Self {
            gateway,
            policy,
            base_url,
            deadline,
        }
    }

    pub async fn summary(&self, ids: &[u64]) -> Result<Vec<SummaryItem>, ProxyError> {
        let urls = self.urls(ids, entry_summary_url)?;
        let outcomes = self.load_all(urls, self.policy.ttl(PathCategory::Summary)).await;

        Ok(ids
            .iter()
            .zip(outcomes)
            .map(|(&id, outcome)| summary_item(id, outcome))
            .collect())
    }

    pub async fn history(&self, ids: &[u64], gw: u32) -> Result<Vec<HistoryItem>, ProxyError> {
        let urls = self.urls(ids, entry_history_url)?;
        let outcomes = self.load_all(urls, self.policy.ttl(PathCategory::History)).await;

        Ok(ids
            .iter()
            .zip(outcomes)
            .map(|(&id, outcome)| history_item(id, gw, outcome))
            .collect())
    }

    /// Load every URL in order, one outcome per URL, within the batch deadline.
    async fn load_all(
        &self,
        urls: Vec<Url>,
        ttl: Duration,
    ) -> Vec<Result<Served, UpstreamFailure>> {
        let deadline = Instant::now() + self.deadline;
        let mut outcomes = Vec::with_capacity(urls.len());

        for url in urls {
            if Instant::now() >= deadline {
                outcomes.push(self.after_deadline(&url));
                continue;
            }
            let lookup = Lookup {
                url: url.clone(),
                ttl,
                sensitive: false,
            };
            let outcome = match tokio::time::timeout_at(deadline, self.gateway.load(lookup)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(url = %url, deadline = ?self.deadline, "Batch deadline passed");
                    self.after_deadline(&url)
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    fn after_deadline(&self, url: &Url) -> Result<Served, UpstreamFailure> {
        self.gateway
            .cached(url)
            .ok_or(UpstreamFailure::DeadlineExceeded)
    }

    /// Build every URL up front so bad input fails before any upstream call.
    fn urls<F, E>(&self, ids: &[u64], build: F) -> Result<Vec<Url>, ProxyError>
    where
        F: Fn(&Url, u64) -> Result<Url, E>,
        ProxyError: From<E>,
    {
        if ids.is_empty() {
            return Err(ProxyError::ClientInput(
                "ids query parameter must list at least one id".into(),
            ));
        }
        ids.iter()
            .map(|&id| build(&self.base_url, id).map_err(ProxyError::from))
            .collect()
    }
}

fn stale_markers(freshness: Freshness) -> (Option<bool>, Option<u16>) {
    match freshness {
        Freshness::Stale { upstream_status } => {
            (Some(true), upstream_status.map(|s| s.as_u16()))
        }
        Freshness::Hit | Freshness::Miss => (None, None),
    }
}

fn summary_item(id: u64, outcome: Result<Served, UpstreamFailure>) -> SummaryItem {
    match outcome {
        Ok(served) => {
            let (stale, upstream) = stale_markers(served.freshness);
            SummaryItem {
                id,
                ok: true,
                data: Some(served.payload.body),
                status: None,
                stale,
                upstream,
            }
        }
        Err(failure) => SummaryItem {
            id,
            ok: false,
            data: None,
            status: Some(failure.status().as_u16()),
            stale: None,
            upstream: None,
        },
    }
}

fn history_item(id: u64, gw: u32, outcome: Result<Served, UpstreamFailure>) -> HistoryItem {
    match outcome {
        Ok(served) => {
            let (stale, upstream) = stale_markers(served.freshness);
            let record = find_period(&served.payload.body, gw).cloned();
            HistoryItem {
                id,
                ok: true,
                points: record
                    .as_ref()
                    .and_then(|r| r.get(POINTS_FIELD))
                    .and_then(Value::as_i64),
                raw: record,
                status: None,
                stale,
                upstream,
            }
        }
        Err(failure) => HistoryItem {
            id,
            ok: false,
            points: None,
            raw: None,
            status: Some(failure.status().as_u16()),
            stale: None,
            upstream: None,
        },
    }
}

/// The series record whose period matches `gw`.
fn find_period(payload: &Value, gw: u32) -> Option<&Value> {
    payload
        .get(SERIES_FIELD)?
        .as_array()?
        .iter()
        .find(|record| record.get(PERIOD_FIELD).and_then(Value::as_u64) == Some(u64::from(gw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ManualClock, ResponseCache};
    use crate::config::TtlConfig;
    use crate::resilience::retries::tests::RecordingSleeper;
    use crate::resilience::{RetryPolicy, RetryingFetcher};
    use crate::upstream::client::{TransportError, UpstreamClient, UpstreamResponse};
    use crate::upstream::scheduler::UpstreamScheduler;
    use axum::http::{HeaderMap, StatusCode};
    use futures_util::future::BoxFuture;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers per URL path; unknown paths are 404.
    #[derive(Default)]
    struct RoutedClient {
        routes: Mutex<HashMap<String, (u16, Value)>>,
        unreachable: Mutex<Vec<String>>,
        hung: Mutex<Vec<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl RoutedClient {
        /// Calls to `path` fail without a response.
        fn refuse(&self, path: &str) {
            self.unreachable.lock().unwrap().push(path.to_string());
        }

        /// Calls to `path` never complete.
        fn hang(&self, path: &str) {
            self.hung.lock().unwrap().push(path.to_string());
        }

        fn route(&self, path: &str, status: u16, body: Value) {
            self.routes
                .lock()
                .unwrap()
                .insert(path.to_string(), (status, body));
        }

        fn calls_to(&self, path: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|p| *p == path).count()
        }
    }

    impl UpstreamClient for RoutedClient {
        fn get(
            &self,
            url: Url,
            _headers: HeaderMap,
        ) -> BoxFuture<'static, Result<UpstreamResponse, TransportError>> {
            let path = url.path().to_string();
            self.calls.lock().unwrap().push(path.clone());
            if self.hung.lock().unwrap().contains(&path) {
                return Box::pin(std::future::pending());
            }
            if self.unreachable.lock().unwrap().contains(&path) {
                return Box::pin(async { Err(TransportError::Request("connection refused".into())) });
            }
            let (status, body) = self
                .routes
                .lock()
                .unwrap()
                .get(&path)
                .cloned()
                .unwrap_or((404, json!({"detail": "Not found."})));
            let response =
                UpstreamResponse::new(StatusCode::from_u16(status).unwrap(), body.to_string());
            Box::pin(async move { Ok(response) })
        }
    }

    fn service(client: Arc<RoutedClient>) -> (AggregateService, Arc<ManualClock>) {
        service_with_deadline(client, Duration::from_secs(90))
    }

    fn service_with_deadline(
        client: Arc<RoutedClient>,
        deadline: Duration,
    ) -> (AggregateService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(ResponseCache::new(64, Duration::from_secs(3600), clock.clone()));
        let fetcher = RetryingFetcher::new(
            client,
            Arc::new(UpstreamScheduler::with_limits(4, Duration::ZERO)),
            Arc::new(RecordingSleeper::default()),
            RetryPolicy::default(),
        );
        let gateway = Arc::new(UpstreamGateway::new(cache, Arc::new(fetcher)));
        let policy = Arc::new(CachePolicy::new(TtlConfig::default(), Duration::from_secs(3600)));
        let base = Url::parse("http://upstream.test/api/").unwrap();
        (AggregateService::new(gateway, policy, base, deadline), clock)
    }

    #[test]
    fn test_parse_ids() {
        assert_eq!(parse_ids(Some("10, 20,,30")).unwrap(), vec![10, 20, 30]);
        assert!(matches!(parse_ids(None), Err(ProxyError::ClientInput(_))));
        assert!(matches!(parse_ids(Some(" , ")), Err(ProxyError::ClientInput(_))));
        assert!(matches!(parse_ids(Some("10,abc")), Err(ProxyError::ClientInput(_))));
    }

    #[test]
    fn test_parse_gameweek() {
        assert_eq!(parse_gameweek(Some("5")).unwrap(), 5);
        assert!(parse_gameweek(None).is_err());
        assert!(parse_gameweek(Some("five")).is_err());
    }

    #[tokio::test]
    async fn test_summary_partial_failure_keeps_order() {
        let client = Arc::new(RoutedClient::default());
        client.route("/api/entry/10/", 200, json!({"id": 10, "name": "Ten"}));
        client.route("/api/entry/20/", 500, json!({}));
        client.route("/api/entry/30/", 200, json!({"id": 30, "name": "Thirty"}));
        let (service, _) = service(client.clone());

        let results = service.summary(&[10, 20, 30]).await.unwrap();
        assert_eq!(
            serde_json::to_value(&results).unwrap(),
            json!([
                {"id": 10, "ok": true, "data": {"id": 10, "name": "Ten"}},
                {"id": 20, "ok": false, "status": 500},
                {"id": 30, "ok": true, "data": {"id": 30, "name": "Thirty"}},
            ])
        );
        assert_eq!(client.calls_to("/api/entry/20/"), 3);
    }

    #[tokio::test]
    async fn test_summary_serves_stale_with_marker() {
        let client = Arc::new(RoutedClient::default());
        client.route("/api/entry/10/", 200, json!({"id": 10}));
        let (service, clock) = service(client.clone());
        service.summary(&[10]).await.unwrap();

        client.route("/api/entry/10/", 503, json!({}));
        clock.advance(Duration::from_secs(120));

        let results = service.summary(&[10]).await.unwrap();
        assert_eq!(
            serde_json::to_value(&results).unwrap(),
            json!([{"id": 10, "ok": true, "data": {"id": 10}, "stale": true, "upstream": 503}])
        );
    }

    #[tokio::test]
    async fn test_warm_cache_is_idempotent() {
        let client = Arc::new(RoutedClient::default());
        client.route("/api/entry/10/", 200, json!({"id": 10, "summary_overall_points": 1234}));
        let (service, _) = service(client.clone());

        let first = service.summary(&[10, 10]).await.unwrap();
        let second = service.summary(&[10]).await.unwrap();
        assert_eq!(first[0].data, second[0].data);
        assert_eq!(first[1].data, second[0].data);
        assert_eq!(client.calls_to("/api/entry/10/"), 1);
    }

    #[tokio::test]
    async fn test_history_matches_gameweek() {
        let client = Arc::new(RoutedClient::default());
        client.route(
            "/api/entry/10/history/",
            200,
            json!({"current": [{"event": 4, "points": 50}, {"event": 5, "points": 77}], "past": []}),
        );
        let (service, _) = service(client);

        let results = service.history(&[10], 5).await.unwrap();
        let response = HistoryResponse { results, gw: 5 };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"results": [{"id": 10, "ok": true, "points": 77, "raw": {"event": 5, "points": 77}}], "gw": 5})
        );
    }

    #[tokio::test]
    async fn test_history_missing_gameweek_and_failures() {
        let client = Arc::new(RoutedClient::default());
        client.route("/api/entry/1/history/", 200, json!({"current": [{"event": 1, "points": 9}]}));
        let (service, _) = service(client);

        let results = service.history(&[1, 2], 7).await.unwrap();
        assert_eq!(
            serde_json::to_value(&results).unwrap(),
            json!([
                {"id": 1, "ok": true, "points": null, "raw": null},
                {"id": 2, "ok": false, "points": null, "raw": null, "status": 404},
            ])
        );
    }

    #[tokio::test]
    async fn test_history_serves_stale_with_marker() {
        let client = Arc::new(RoutedClient::default());
        client.route(
            "/api/entry/10/history/",
            200,
            json!({"current": [{"event": 5, "points": 77}]}),
        );
        let (service, clock) = service(client.clone());
        service.history(&[10], 5).await.unwrap();

        client.route("/api/entry/10/history/", 503, json!({}));
        clock.advance(Duration::from_secs(61));

        let results = service.history(&[10], 5).await.unwrap();
        assert_eq!(
            serde_json::to_value(&results).unwrap(),
            json!([{
                "id": 10,
                "ok": true,
                "points": 77,
                "raw": {"event": 5, "points": 77},
                "stale": true,
                "upstream": 503
            }])
        );
    }

    #[tokio::test]
    async fn test_unreachable_item_is_bad_gateway() {
        let client = Arc::new(RoutedClient::default());
        client.route("/api/entry/1/", 200, json!({"id": 1}));
        client.refuse("/api/entry/2/");
        let (service, _) = service(client.clone());

        let results = service.summary(&[1, 2]).await.unwrap();
        assert_eq!(
            serde_json::to_value(&results).unwrap(),
            json!([
                {"id": 1, "ok": true, "data": {"id": 1}},
                {"id": 2, "ok": false, "status": 502},
            ])
        );
        assert_eq!(client.calls_to("/api/entry/2/"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_answers_remaining_ids_from_cache() {
        let client = Arc::new(RoutedClient::default());
        client.route("/api/entry/3/", 200, json!({"id": 3}));
        let (service, clock) = service_with_deadline(client.clone(), Duration::from_secs(20));
        service.summary(&[3]).await.unwrap();
        clock.advance(Duration::from_secs(120));

        client.hang("/api/entry/1/");
        client.hang("/api/entry/3/");
        let started = Instant::now();
        let results = service.summary(&[1, 2, 3]).await.unwrap();

        // Entry 1 hangs past the deadline; 2 and 3 are not fetched at all.
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert_eq!(
            serde_json::to_value(&results).unwrap(),
            json!([
                {"id": 1, "ok": false, "status": 504},
                {"id": 2, "ok": false, "status": 504},
                {"id": 3, "ok": true, "data": {"id": 3}, "stale": true},
            ])
        );
        assert_eq!(client.calls_to("/api/entry/2/"), 0);
        assert_eq!(client.calls_to("/api/entry/3/"), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_rejected_before_upstream() {
        let client = Arc::new(RoutedClient::default());
        let (service, _) = service(client.clone());

        assert!(matches!(service.summary(&[]).await, Err(ProxyError::ClientInput(_))));
        assert!(matches!(service.history(&[], 1).await, Err(ProxyError::ClientInput(_))));
        assert!(client.calls.lock().unwrap().is_empty());
    }
}
