//! HTTP server setup and the proxy handler.
//!
//! # Responsibilities
//! - Create the Axum router: every method, every path, one handler
//! - Wire up middleware (timeout, request ID, tracing)
//! - Serve with graceful shutdown
//! - Hand each inbound request to the retry controller

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response, StatusCode},
    response::IntoResponse,
    routing::any,
    Router,
};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::http::forward::{Forwarder, ReplayBody};
use crate::http::request::{RequestIdLayer, REQUEST_ID_HEADER};
use crate::observability::metrics;
use crate::resilience::retry::{run_with_retries, RetryPolicy};
use crate::upstream::snapshot::SelectedBackend;

/// Application state injected into the handler.
#[derive(Clone)]
pub struct AppState {
    pub selected: Arc<SelectedBackend>,
    pub client: Client<HttpConnector, Body>,
    pub retry_policy: RetryPolicy,
    pub upstream_timeout: Duration,
    pub buffer_limit: usize,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Build the server around an already-made selection and a shared
    /// outbound client.
    pub fn new(
        config: &ProxyConfig,
        selected: Arc<SelectedBackend>,
        client: Client<HttpConnector, Body>,
    ) -> Self {
        let state = AppState {
            selected,
            client,
            retry_policy: RetryPolicy::from_config(&config.retries),
            upstream_timeout: Duration::from_secs(config.timeouts.upstream_secs),
            buffer_limit: config.retries.buffer_limit_bytes,
        };

        let router = Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(RequestIdLayer)
            .layer(TraceLayer::new_for_http());

        Self { router }
    }

    /// Accept connections until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                while shutdown.changed().await.is_ok() {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler: forward to the selected backend under the retry
/// policy and stream the response back.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let start_time = Instant::now();
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let method = request.method().to_string();
    let (parts, body) = request.into_parts();
    let path = parts.uri.path().to_string();

    let backend = state.selected.current();
    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        backend = %backend.label(),
        "Proxying request"
    );

    let body = match ReplayBody::classify(body, state.buffer_limit).await {
        Ok(body) => body,
        Err(error) => {
            tracing::warn!(request_id = %request_id, error = %error, "Failed to read inbound body");
            metrics::record_request(
                &method,
                StatusCode::BAD_REQUEST.as_u16(),
                backend.label(),
                start_time,
            );
            return (StatusCode::BAD_REQUEST, "Failed to read request body.").into_response();
        }
    };

    let forwarder = Forwarder::new(state.client.clone(), backend.clone(), state.upstream_timeout);
    let response = run_with_retries(
        &state.retry_policy,
        &request_id,
        backend.label(),
        body,
        |attempt_body| forwarder.forward(&parts, attempt_body),
    )
    .await;

    metrics::record_request(
        &method,
        response.status().as_u16(),
        backend.label(),
        start_time,
    );
    response
}
