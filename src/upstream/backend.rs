//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream server as an immutable base address
//! - Compose outbound and probe request URIs
//! - Carry per-backend probe measurements

use std::sync::Arc;
use std::time::Duration;

use axum::http::uri::{Authority, PathAndQuery, Scheme, Uri};
use thiserror::Error;
use url::Url;

/// A configured backend address could not be used.
#[derive(Debug, Error)]
#[error("invalid backend address `{address}`: {reason}")]
pub struct InvalidBackendAddress {
    pub address: String,
    pub reason: String,
}

/// A single upstream server. Immutable once configured.
#[derive(Debug)]
pub struct Backend {
    name: String,
    scheme: Scheme,
    authority: Authority,
}

impl Backend {
    /// Parse a base address (scheme + host + optional port, nothing else).
    pub fn new(name: &str, address: &str) -> Result<Self, InvalidBackendAddress> {
        let reject = |reason: &str| InvalidBackendAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(address).map_err(|e| reject(&e.to_string()))?;

        let scheme = match url.scheme() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            other => return Err(reject(&format!("unsupported scheme `{other}`"))),
        };

        if url.path() != "/" || url.query().is_some() {
            return Err(reject("base address must not carry a path or query"));
        }

        let host = url.host_str().ok_or_else(|| reject("missing host"))?;
        let authority_str = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority: Authority = authority_str
            .parse()
            .map_err(|_| reject("host is not a valid authority"))?;

        Ok(Self {
            name: name.to_string(),
            scheme,
            authority,
        })
    }

    /// Display name: the configured name, or the authority when unnamed.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            self.authority.as_str()
        } else {
            &self.name
        }
    }

    /// Outbound URI for a forwarded request: base address + inbound
    /// path and query.
    pub fn uri_for(
        &self,
        path_and_query: Option<&PathAndQuery>,
    ) -> Result<Uri, axum::http::Error> {
        let pq = path_and_query.map(PathAndQuery::as_str).unwrap_or("/");
        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(pq)
            .build()
    }

    /// URI for a latency probe against this backend.
    pub fn probe_uri(&self, path: &str) -> Result<Uri, axum::http::Error> {
        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path)
            .build()
    }
}

/// The measured outcome of probing one backend.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub backend: Arc<Backend>,
    pub latency: Duration,
}

impl ProbeResult {
    /// Sentinel latency for a backend that did not answer its probe.
    /// The maximum representable duration, so it never wins selection.
    pub const UNREACHABLE: Duration = Duration::MAX;

    pub fn reachable(backend: Arc<Backend>, latency: Duration) -> Self {
        Self { backend, latency }
    }

    pub fn unreachable(backend: Arc<Backend>) -> Self {
        Self {
            backend,
            latency: Self::UNREACHABLE,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.latency < Self::UNREACHABLE
    }
}
