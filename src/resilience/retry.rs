//! Bounded-attempt retry control around request forwarding.
//!
//! One controller run wraps one logical inbound request:
//! `Pending → Attempting → {Succeeded | Pending(attempts-1) → Attempting | Failed}`.
//! A successful forward resolves the request immediately. A retryable
//! failure consumes one attempt and, when attempts remain and the body can
//! be replayed, waits the fixed delay before forwarding from scratch.
//! Exhaustion resolves the request with a fixed 500 outcome. Failure causes
//! are not distinguished for retry purposes.

use std::future::Future;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Response, StatusCode};
use axum::response::IntoResponse;

use crate::config::schema::RetryConfig;
use crate::http::forward::{ForwardError, ReplayBody};
use crate::observability::metrics;

/// Fixed diagnostic body returned when every attempt has failed.
pub const EXHAUSTED_BODY: &str = "Failed to process the request.";

/// Attempt cap and fixed inter-attempt delay.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay: Duration::from_millis(config.delay_ms),
        }
    }
}

/// The fixed client-visible outcome for a request whose attempts are gone.
pub fn failure_response() -> Response<Body> {
    (StatusCode::INTERNAL_SERVER_ERROR, EXHAUSTED_BODY).into_response()
}

/// Drive forwarding attempts for one inbound request until success,
/// a non-retryable failure, or attempt exhaustion.
///
/// `attempt_fn` receives the body for one attempt and performs one
/// complete forward. Each retry gets a freshly built outbound request;
/// nothing from a failed attempt is reused.
pub async fn run_with_retries<F, Fut>(
    policy: &RetryPolicy,
    request_id: &str,
    backend: &str,
    mut body: ReplayBody,
    mut attempt_fn: F,
) -> Response<Body>
where
    F: FnMut(Body) -> Fut,
    Fut: Future<Output = Result<Response<Body>, ForwardError>>,
{
    let mut attempts = 0u32;

    loop {
        let attempt_body = match body.take_attempt() {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(request_id, backend, error = %e, "Cannot start attempt");
                return failure_response();
            }
        };
        attempts += 1;

        match attempt_fn(attempt_body).await {
            Ok(response) => {
                tracing::debug!(
                    request_id,
                    backend,
                    attempt = attempts,
                    status = %response.status(),
                    "Upstream responded"
                );
                return response;
            }
            Err(error) => {
                let retryable =
                    error.is_retryable() && attempts < policy.max_attempts && body.is_replayable();

                if retryable {
                    tracing::warn!(
                        request_id,
                        backend,
                        attempt = attempts,
                        error = %error,
                        delay_ms = policy.delay.as_millis() as u64,
                        "Attempt failed, retrying"
                    );
                    metrics::record_retry(backend);
                    tokio::time::sleep(policy.delay).await;
                    continue;
                }

                tracing::error!(
                    request_id,
                    backend,
                    attempt = attempts,
                    error = %error,
                    "Forwarding failed"
                );
                return failure_response();
            }
        }
    }
}
