//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scoreboard_proxy::cache::{Clock, SystemClock};
use scoreboard_proxy::config::ProxyConfig;
use scoreboard_proxy::resilience::TokioSleeper;
use scoreboard_proxy::upstream::ReqwestUpstream;
use scoreboard_proxy::{AppState, HttpServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// What the mock upstream answers with.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub body: String,
    pub etag: Option<String>,
}

impl MockReply {
    pub fn json(body: serde_json::Value) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
            etag: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: format!("{{\"detail\":\"status {status}\"}}"),
            etag: None,
        }
    }

    pub fn with_etag(mut self, etag: &str) -> Self {
        self.etag = Some(etag.to_string());
        self
    }
}

/// A running mock upstream.
pub struct MockUpstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockUpstream {
    /// Base URL to configure the proxy with.
    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Start a path-aware programmable upstream on an ephemeral port.
///
/// `f` receives the request target (path and query) of every request.
pub async fn start_mock_upstream<F, Fut>(f: F) -> MockUpstream
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockReply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);
    let hits = Arc::new(AtomicUsize::new(0));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));

    let mock = MockUpstream {
        addr,
        hits: hits.clone(),
        in_flight: in_flight.clone(),
        max_in_flight: max_in_flight.clone(),
    };

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let f = f.clone();
            let hits = hits.clone();
            let in_flight = in_flight.clone();
            let max_in_flight = max_in_flight.clone();
            tokio::spawn(async move {
                let Some(target) = read_target(&mut socket).await else {
                    return;
                };
                hits.fetch_add(1, Ordering::SeqCst);
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_in_flight.fetch_max(now, Ordering::SeqCst);

                let reply = f(target).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);

                let etag = reply
                    .etag
                    .map(|e| format!("ETag: {e}\r\n"))
                    .unwrap_or_default();
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line(reply.status),
                    etag,
                    reply.body.len(),
                    reply.body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    mock
}

async fn read_target(socket: &mut tokio::net::TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let head = String::from_utf8_lossy(&buf);
    let request_line = head.lines().next()?;
    request_line.split_whitespace().nth(1).map(String::from)
}

fn status_line(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        403 => "403 Forbidden",
        404 => "404 Not Found",
        429 => "429 Too Many Requests",
        500 => "500 Internal Server Error",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    }
}

/// Proxy config pointed at `upstream`, with fast retries and no inbound limits.
pub fn test_config(upstream: &MockUpstream) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.upstream.base_url = upstream.base_url();
    config.upstream.timeout_secs = 5;
    config.scheduler.concurrency = 4;
    config.scheduler.dispatch_delay_ms = 5;
    config.retries.attempts = 3;
    config.retries.base_delay_ms = 10;
    config.retries.jitter_ms = 0;
    config.rate_limit.enabled = false;
    config
}

/// A running proxy instance.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    start_proxy_with_clock(config, Arc::new(SystemClock)).await
}

/// Start the proxy on an ephemeral port with an injected cache clock.
pub async fn start_proxy_with_clock(config: ProxyConfig, clock: Arc<dyn Clock>) -> TestProxy {
    let client = Arc::new(ReqwestUpstream::new(&config.upstream).unwrap());
    let state = AppState::new(config, client, clock, Arc::new(TokioSleeper)).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = HttpServer::with_state(state).run(listener, receiver).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestProxy { addr, shutdown }
}

/// HTTP client that never goes through an environment proxy.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
