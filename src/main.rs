//! Scoreboard proxy
//!
//! A caching, request-pacing proxy in front of a rate-limited, read-only
//! sports-data API.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                  SCOREBOARD PROXY                     │
//!                      │                                                       │
//!   Client Request     │  ┌──────────┐   ┌────────────┐   ┌────────────────┐  │
//!   ───────────────────┼─▶│  http    │──▶│ aggregate  │──▶│   upstream     │  │
//!                      │  │  server  │   │ passthrough│   │   gateway      │  │
//!                      │  └──────────┘   └────────────┘   └───────┬────────┘  │
//!                      │                                          │           │
//!                      │                        ┌─────────┐       ▼           │
//!                      │                        │  cache  │◀─▶ retrying       │
//!                      │                        │ (LRU)   │    fetcher        │
//!                      │                        └─────────┘       │           │
//!                      │                                          ▼           │
//!   Client Response    │                                   ┌────────────┐     │
//!   ◀──────────────────┼───────────────────────────────────│ scheduler  │─────┼──▶ Upstream
//!                      │                                   │ FIFO, paced│     │    API
//!                      │                                   └────────────┘     │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;

use tokio::net::TcpListener;

use scoreboard_proxy::config::load_from_env;
use scoreboard_proxy::observability::{logging, metrics};
use scoreboard_proxy::{AppState, HttpServer, Shutdown};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_from_env()?;
    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        concurrency = config.scheduler.concurrency,
        dispatch_delay_ms = config.scheduler.dispatch_delay_ms,
        cache_max_entries = config.cache.max_entries,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let state = AppState::from_config(config)?;

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    shutdown.trigger_on_signal();

    HttpServer::with_state(state).run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
