//! One-shot latency measurement of candidate backends.
//!
//! Probing never fails the caller: a backend that refuses, times out, or
//! errors in any way is reported with the unreachable sentinel and only
//! loses the selection. A probing round completes when every probe has
//! completed or failed; results are never used partially.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, Method, Request};
use futures_util::future::join_all;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use tokio::sync::watch;
use tokio::time;

use crate::config::schema::{AllUnreachablePolicy, ProbeConfig};
use crate::observability::metrics;
use crate::resilience::timeouts::deadline;
use crate::upstream::backend::{Backend, ProbeResult};
use crate::upstream::selection::select_fastest;
use crate::upstream::snapshot::SelectedBackend;

/// Issues latency probes against candidate backends.
pub struct LatencyProber {
    client: Client<HttpConnector, Body>,
    path: String,
    timeout: Duration,
}

impl LatencyProber {
    pub fn new(client: Client<HttpConnector, Body>, config: &ProbeConfig) -> Self {
        let path = if config.path.starts_with('/') {
            config.path.clone()
        } else {
            format!("/{}", config.path)
        };
        Self {
            client,
            path,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Probe every backend concurrently and wait for all results.
    /// The result order matches the backend order.
    pub async fn probe_all(&self, backends: &[Arc<Backend>]) -> Vec<ProbeResult> {
        join_all(backends.iter().map(|b| self.probe_one(b.clone()))).await
    }

    async fn probe_one(&self, backend: Arc<Backend>) -> ProbeResult {
        let request = match backend
            .probe_uri(&self.path)
            .and_then(|uri| {
                Request::builder()
                    .method(Method::GET)
                    .uri(uri)
                    .header(header::USER_AGENT, "latency-proxy-probe")
                    .body(Body::empty())
            }) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(backend = %backend.label(), error = %e, "Failed to build probe request");
                metrics::record_probe(backend.label(), None);
                return ProbeResult::unreachable(backend);
            }
        };

        let started = Instant::now();
        let result = match deadline(self.timeout, self.client.request(request)).await {
            Some(Ok(response)) => {
                let latency = started.elapsed();
                tracing::debug!(
                    backend = %backend.label(),
                    status = %response.status(),
                    latency_ms = latency.as_millis() as u64,
                    "Probe complete"
                );
                ProbeResult::reachable(backend, latency)
            }
            Some(Err(e)) => {
                tracing::warn!(backend = %backend.label(), error = %e, "Probe failed");
                ProbeResult::unreachable(backend)
            }
            None => {
                tracing::warn!(
                    backend = %backend.label(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Probe timed out"
                );
                ProbeResult::unreachable(backend)
            }
        };

        let latency = result.is_reachable().then_some(result.latency);
        metrics::record_probe(result.backend.label(), latency);
        result
    }
}

/// Periodically re-probes all backends and refreshes the selection.
///
/// A refresh round in which every backend is unreachable keeps the
/// current snapshot instead of degrading it.
pub struct ProbeRefresher {
    prober: LatencyProber,
    backends: Vec<Arc<Backend>>,
    selected: Arc<SelectedBackend>,
    interval: Duration,
}

impl ProbeRefresher {
    pub fn new(
        prober: LatencyProber,
        backends: Vec<Arc<Backend>>,
        selected: Arc<SelectedBackend>,
        interval: Duration,
    ) -> Self {
        Self {
            prober,
            backends,
            selected,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Probe refresher starting"
        );

        let mut ticker = time::interval(self.interval);
        // The first tick completes immediately; selection already ran.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Probe refresher shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn refresh_once(&self) {
        let results = self.prober.probe_all(&self.backends).await;

        if results.iter().all(|r| !r.is_reachable()) {
            tracing::warn!("All backends unreachable during refresh, keeping current selection");
            return;
        }

        match select_fastest(&results, AllUnreachablePolicy::FirstConfigured) {
            Ok(backend) => {
                let previous = self.selected.current();
                if previous.label() != backend.label() {
                    tracing::info!(
                        from = %previous.label(),
                        to = %backend.label(),
                        "Selection changed"
                    );
                }
                self.selected.replace(backend);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Refresh produced no selection");
            }
        }
    }
}
