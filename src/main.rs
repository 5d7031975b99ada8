//! latency-proxy
//!
//! A single-process HTTP reverse proxy that probes a fixed set of backend
//! servers at startup, pins the one with the lowest round-trip latency,
//! and forwards every inbound request to it. Transient forwarding
//! failures are retried a bounded number of times with a fixed delay
//! before the caller sees an error.
//!
//! ```text
//!                  ┌──────────────────────────────────────────────┐
//!                  │                 latency-proxy                 │
//!                  │                                               │
//!   startup ──────▶│  probe ──▶ selection ──▶ selected snapshot    │
//!                  │                              │                │
//!   Client ───────▶│  listener ──▶ handler ──▶ retry ──▶ forward ──┼──▶ Backend
//!   Client ◀───────│◀────────── streamed response ◀────────────────┼──◀ Backend
//!                  │                                               │
//!                  │  config · logging · metrics · lifecycle       │
//!                  └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use clap::Parser;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;

use latency_proxy::config::loader::load_config;
use latency_proxy::http::HttpServer;
use latency_proxy::lifecycle::{signals, Shutdown};
use latency_proxy::observability::{logging, metrics};
use latency_proxy::probe::{LatencyProber, ProbeRefresher};
use latency_proxy::upstream::backend::Backend;
use latency_proxy::upstream::selection::select_fastest;
use latency_proxy::upstream::snapshot::SelectedBackend;

#[derive(Parser, Debug)]
#[command(name = "latency-proxy", about = "Latency-selecting HTTP reverse proxy")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, short, default_value = "latency-proxy.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(&args.config)?;
    logging::init(&config.observability.log_level);

    tracing::info!(
        config = %args.config.display(),
        backends = config.backends.len(),
        max_attempts = config.retries.max_attempts,
        retry_delay_ms = config.retries.delay_ms,
        "latency-proxy starting"
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

    let backends = config
        .backends
        .iter()
        .map(|b| Backend::new(&b.name, &b.address).map(Arc::new))
        .collect::<Result<Vec<_>, _>>()?;

    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
    let client: Client<HttpConnector, Body> =
        Client::builder(TokioExecutor::new()).build(connector);

    // Selection happens exactly once, before any traffic is accepted.
    let prober = LatencyProber::new(client.clone(), &config.probe);
    tracing::info!(count = backends.len(), path = %config.probe.path, "Probing backends");
    let results = prober.probe_all(&backends).await;
    let chosen = select_fastest(&results, config.selection.on_all_unreachable)?;
    tracing::info!(backend = %chosen.label(), "Backend selected");
    let selected = Arc::new(SelectedBackend::new(chosen));

    let shutdown = Arc::new(Shutdown::new());

    if let Some(interval_secs) = config.probe.refresh_interval_secs {
        let refresher = ProbeRefresher::new(
            LatencyProber::new(client.clone(), &config.probe),
            backends.clone(),
            selected.clone(),
            Duration::from_secs(interval_secs),
        );
        let rx = shutdown.subscribe();
        tokio::spawn(async move {
            refresher.run(rx).await;
        });
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        signal_shutdown.trigger();
    });

    let server = HttpServer::new(&config, selected, client);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
