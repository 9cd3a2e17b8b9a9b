//! Query Balancer
//!
//! # Architecture Overview
//!
//! ```text
//!   client ──▶ http server ──▶ dispatcher ──┬─ new query ──▶ routing (user rules + selection rule)
//!                                           └─ follow-up ──▶ session store (query → coordinator)
//!                                                 │
//!                                                 ▼
//!                                           connection pool ──▶ reverse proxy ──▶ coordinator
//!                                                 ▲                    │
//!               discovery ──▶ reconciler ─────────┘                    ▼
//!                                                             interceptor (link / unlink)
//!
//!   per coordinator: health loop + statistics loop
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;

use query_balancer::config::{load_config, ProxyConfig};
use query_balancer::lifecycle::{build_proxy, signals, Shutdown};
use query_balancer::observability::{logging, metrics};
use query_balancer::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "query-balancer", version, about = "Query-aware load balancer for Trino/Presto coordinators")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "QUERY_BALANCER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "query-balancer starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        coordinators = config.discovery.static_list.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let proxy = build_proxy(&config)?;
    proxy.init().await?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(proxy, Duration::from_secs(config.timeouts.request_secs));
    let serving = tokio::spawn(server.run(listener, shutdown.subscribe()));

    signals::forward_to(&shutdown).await;
    serving.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
