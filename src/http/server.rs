//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wire the shared upstream stack (cache, scheduler, fetcher, gateway)
//! - Create the Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, panics, timeout, CORS, rate limit)
//! - Serve on a listener until shutdown is signalled

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use url::Url;

use crate::aggregate::AggregateService;
use crate::cache::{Clock, ResponseCache, SystemClock};
use crate::config::ProxyConfig;
use crate::error::StartupError;
use crate::health::{healthz, readyz};
use crate::http::aggregate::{history_handler, summary_handler};
use crate::http::passthrough::passthrough_handler;
use crate::http::request::{MakeRequestUuid, X_REQUEST_ID};
use crate::resilience::backoff::{Sleeper, TokioSleeper};
use crate::resilience::retries::{RetryPolicy, RetryingFetcher};
use crate::security::{cors_layer, rate_limit_middleware, RateLimiterState};
use crate::upstream::client::{ReqwestUpstream, UpstreamClient};
use crate::upstream::paths::{CachePolicy, SensitivePaths};
use crate::upstream::{UpstreamGateway, UpstreamScheduler};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub cache: Arc<ResponseCache>,
    pub scheduler: Arc<UpstreamScheduler>,
    pub gateway: Arc<UpstreamGateway>,
    pub aggregates: Arc<AggregateService>,
    pub policy: Arc<CachePolicy>,
    pub sensitive: Arc<SensitivePaths>,
    pub base_url: Url,
}

impl AppState {
    /// Build the state around an explicit client, clock and sleeper.
    ///
    /// One cache and one scheduler are shared by every handler so the
    /// upstream sees a single, globally paced client.
    pub fn new(
        config: ProxyConfig,
        client: Arc<dyn UpstreamClient>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, StartupError> {
        let base_url = base_url(&config.upstream.base_url)?;
        let sensitive = Arc::new(SensitivePaths::from_rules(&config.retries.sensitive_paths)?);

        let cache = Arc::new(ResponseCache::new(
            config.cache.max_entries,
            config.cache.stale_horizon(),
            clock,
        ));
        let scheduler = Arc::new(UpstreamScheduler::new(&config.scheduler));
        let fetcher = Arc::new(RetryingFetcher::new(
            client,
            scheduler.clone(),
            sleeper,
            RetryPolicy::from_config(&config.retries, &config.upstream),
        ));
        let gateway = Arc::new(UpstreamGateway::new(cache.clone(), fetcher));
        let policy = Arc::new(CachePolicy::new(
            config.cache.ttl.clone(),
            config.cache.stale_horizon(),
        ));
        let aggregates = Arc::new(AggregateService::new(
            gateway.clone(),
            policy.clone(),
            base_url.clone(),
            config.listener.batch_deadline(),
        ));

        Ok(Self {
            config: Arc::new(config),
            cache,
            scheduler,
            gateway,
            aggregates,
            policy,
            sensitive,
            base_url,
        })
    }

    /// Production wiring: reqwest client, wall clock, tokio timers.
    pub fn from_config(config: ProxyConfig) -> Result<Self, StartupError> {
        let client = Arc::new(ReqwestUpstream::new(&config.upstream)?);
        Self::new(config, client, Arc::new(SystemClock), Arc::new(TokioSleeper))
    }
}

/// The base URL must end in `/` so relative joins stay under it.
fn base_url(raw: &str) -> Result<Url, url::ParseError> {
    if raw.ends_with('/') {
        Url::parse(raw)
    } else {
        Url::parse(&format!("{raw}/"))
    }
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with production wiring.
    pub fn new(config: ProxyConfig) -> Result<Self, StartupError> {
        Ok(Self::with_state(AppState::from_config(config)?))
    }

    pub fn with_state(state: AppState) -> Self {
        Self {
            router: build_router(state),
        }
    }

    /// Run the server until a shutdown signal arrives, then drain.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Draining in-flight requests");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let mut router = Router::new()
        .route("/api/aggregate/summary", get(summary_handler))
        .route("/api/aggregate/history", get(history_handler))
        .route("/api/{*path}", any(passthrough_handler))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state);

    if config.rate_limit.enabled {
        let limiter = Arc::new(RateLimiterState::new(&config.rate_limit));
        router = router.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
    }

    router
        .layer(cors_layer(&config.security))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            config.listener.request_timeout(),
        ))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(detail = %detail, "Handler panicked");

    (
        StatusCode::BAD_GATEWAY,
        Json(serde_json::json!({
            "error": "bad_gateway",
            "message": "internal error",
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::resilience::retries::tests::{
        status, HangingClient, RecordingSleeper, ScriptedClient,
    };
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn router(client: Arc<ScriptedClient>) -> Router {
        let mut config = ProxyConfig::default();
        config.upstream.base_url = "http://upstream.test/api".to_string();
        config.rate_limit.enabled = false;
        let state = AppState::new(
            config,
            client,
            Arc::new(ManualClock::new()),
            Arc::new(RecordingSleeper::default()),
        )
        .unwrap();
        build_router(state)
    }

    async fn send(router: Router, method: Method, uri: &str) -> (StatusCode, Value, Response) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let (parts, body) = response.into_parts();
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json, Response::from_parts(parts, Body::empty()))
    }

    #[tokio::test]
    async fn test_passthrough_adds_diagnostics_and_request_id() {
        let client = ScriptedClient::new(vec![status(200)]);
        let (status, body, response) =
            send(router(client.clone()), Method::GET, "/api/bootstrap-static/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));
        assert_eq!(response.headers()["x-cache"], "MISS");
        assert!(response.headers().contains_key(X_REQUEST_ID));
        assert_eq!(
            client.calls.lock().unwrap()[0].as_str(),
            "http://upstream.test/api/bootstrap-static/"
        );
    }

    #[tokio::test]
    async fn test_write_methods_rejected() {
        let client = ScriptedClient::new(vec![status(200)]);
        let (status, body, _) = send(router(client.clone()), Method::POST, "/api/entry/1/").await;

        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body["error"], "method_not_allowed");
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_is_bad_request() {
        let client = ScriptedClient::new(vec![status(200)]);
        let (status, _, _) = send(
            router(client.clone()),
            Method::GET,
            "/api/aggregate/summary?ids=",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_survives_hung_upstream() {
        let mut config = ProxyConfig::default();
        config.upstream.base_url = "http://upstream.test/api".to_string();
        config.rate_limit.enabled = false;
        let state = AppState::new(
            config,
            Arc::new(HangingClient),
            Arc::new(ManualClock::new()),
            Arc::new(TokioSleeper),
        )
        .unwrap();

        let (status, body, _) = send(
            build_router(state),
            Method::GET,
            "/api/aggregate/summary?ids=1,2,3,4",
        )
        .await;

        // The first ID exhausts its retries on timeouts well inside the
        // deadline; the deadline cuts the second and leaves the rest unfetched.
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"results": [
                {"id": 1, "ok": false, "status": 502},
                {"id": 2, "ok": false, "status": 504},
                {"id": 3, "ok": false, "status": 504},
                {"id": 4, "ok": false, "status": 504},
            ]})
        );
    }

    #[tokio::test]
    async fn test_healthz_reports_occupancy() {
        let client = ScriptedClient::new(vec![status(200)]);
        let (status, body, _) = send(router(client), Method::GET, "/healthz").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["cache"], json!({"size": 0, "max": 500}));
        assert_eq!(body["queue"], json!({"active": 0, "pending": 0}));
    }

    #[test]
    fn test_base_url_gains_trailing_slash() {
        assert_eq!(
            base_url("https://upstream.test/api").unwrap().as_str(),
            "https://upstream.test/api/"
        );
        assert_eq!(
            base_url("https://upstream.test/api/").unwrap().as_str(),
            "https://upstream.test/api/"
        );
        assert!(base_url("not a url").is_err());
    }
}
