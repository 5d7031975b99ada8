//! Request forwarding to the selected backend.
//!
//! # Responsibilities
//! - Build the outbound request: backend base address + inbound path and
//!   query, same method, headers copied without value transformation
//! - Stream request and response bodies without full buffering
//! - Classify failures into explicit retryable / non-retryable values
//!
//! # Design Decisions
//! - One attempt either completes the full path or fails with a
//!   `ForwardError`; a failure mid-body after the response has started
//!   streaming surfaces as truncation, not a retry
//! - Small request bodies are buffered so retries can replay them;
//!   large or unsized bodies stream through and are sent at most once

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, request::Parts, Request, Response};
use bytes::Bytes;
use http_body::Body as _;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use thiserror::Error;

use crate::resilience::timeouts::deadline;
use crate::upstream::backend::Backend;

/// One forwarding attempt failed.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// Connection error, DNS failure, or stream interruption before the
    /// response headers were read. Retryable.
    #[error("upstream transport error: {0}")]
    Transport(#[source] hyper_util::client::legacy::Error),

    /// The upstream did not produce response headers in time. Retryable.
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    /// The outbound request could not be constructed.
    #[error("failed to build outbound request: {0}")]
    InvalidRequest(#[from] axum::http::Error),

    /// The inbound body streamed to a previous attempt and cannot be
    /// replayed.
    #[error("request body already consumed, cannot replay")]
    BodyNotReplayable,
}

impl ForwardError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

/// The inbound request body, prepared for one or more forwarding attempts.
#[derive(Debug)]
pub enum ReplayBody {
    /// No body; every attempt sends an empty one.
    Empty,
    /// Buffered in full; every attempt replays the same bytes.
    Buffered(Bytes),
    /// Streamed; only the first attempt can send it.
    Streaming(Option<Body>),
}

impl ReplayBody {
    /// Decide how the inbound body will be carried across attempts.
    ///
    /// Bodies with a known size of at most `buffer_limit` bytes are read
    /// into memory so retries can replay them. Anything larger, or of
    /// unknown size, streams through unbuffered.
    pub async fn classify(body: Body, buffer_limit: usize) -> Result<Self, axum::Error> {
        let hint = body.size_hint();
        if hint.exact() == Some(0) {
            return Ok(Self::Empty);
        }
        match hint.upper() {
            Some(upper) if upper <= buffer_limit as u64 => {
                let bytes = to_bytes(body, buffer_limit).await?;
                Ok(Self::Buffered(bytes))
            }
            _ => Ok(Self::streaming(body)),
        }
    }

    pub fn streaming(body: Body) -> Self {
        Self::Streaming(Some(body))
    }

    /// The body for the next attempt. Streamed bodies yield exactly once.
    pub fn take_attempt(&mut self) -> Result<Body, ForwardError> {
        match self {
            Self::Empty => Ok(Body::empty()),
            Self::Buffered(bytes) => Ok(Body::from(bytes.clone())),
            Self::Streaming(slot) => slot.take().ok_or(ForwardError::BodyNotReplayable),
        }
    }

    /// Whether a further attempt could carry this body again.
    pub fn is_replayable(&self) -> bool {
        !matches!(self, Self::Streaming(_))
    }
}

/// Forwards one inbound request to a fixed backend.
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    backend: Arc<Backend>,
    upstream_timeout: Duration,
}

impl Forwarder {
    pub fn new(
        client: Client<HttpConnector, Body>,
        backend: Arc<Backend>,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            client,
            backend,
            upstream_timeout,
        }
    }

    /// One complete forwarding attempt.
    ///
    /// Resolves once the upstream response headers have been read; the
    /// returned response streams its body from the upstream as it
    /// arrives. An upstream error status (4xx/5xx) is a successful
    /// forward and passes through verbatim.
    pub async fn forward(&self, parts: &Parts, body: Body) -> Result<Response<Body>, ForwardError> {
        let uri = self.backend.uri_for(parts.uri.path_and_query())?;

        let mut builder = Request::builder().method(parts.method.clone()).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in parts.headers.iter() {
                // Framing is re-established by the outbound transport.
                if name == &header::TRANSFER_ENCODING || name == &header::CONNECTION {
                    continue;
                }
                headers.append(name.clone(), value.clone());
            }
        }
        let request = builder.body(body)?;

        let response = match deadline(self.upstream_timeout, self.client.request(request)).await {
            Some(Ok(response)) => response,
            Some(Err(e)) => return Err(ForwardError::Transport(e)),
            None => return Err(ForwardError::Timeout(self.upstream_timeout)),
        };

        let (parts, incoming) = response.into_parts();
        Ok(Response::from_parts(parts, Body::new(incoming)))
    }
}
