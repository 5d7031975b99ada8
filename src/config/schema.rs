//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Ordered list of candidate backend servers. Must be non-empty.
    pub backends: Vec<BackendConfig>,

    /// Latency probe settings.
    pub probe: ProbeConfig,

    /// Backend selection settings.
    pub selection: SelectionConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// A single candidate backend server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Optional display name; the address is used when empty.
    #[serde(default)]
    pub name: String,

    /// Base address: absolute http/https URL with host and optional port,
    /// no path or query (e.g., "http://127.0.0.1:3000").
    pub address: String,
}

/// Latency probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Path requested by each probe.
    pub path: String,

    /// Per-probe timeout in milliseconds. A probe that exceeds it counts
    /// as unreachable.
    pub timeout_ms: u64,

    /// When set, re-probe all backends on this interval and atomically
    /// swap the selection. Disabled by default: selection happens once
    /// at startup.
    pub refresh_interval_secs: Option<u64>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            timeout_ms: 5000,
            refresh_interval_secs: None,
        }
    }
}

/// Backend selection configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SelectionConfig {
    /// What to do when every probe reports unreachable.
    pub on_all_unreachable: AllUnreachablePolicy,
}

/// Policy for the case where no backend answered its probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AllUnreachablePolicy {
    /// Select the first backend in configuration order anyway.
    #[default]
    FirstConfigured,

    /// Refuse to start serving.
    Fail,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total forwarding attempts per inbound request.
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds.
    pub delay_ms: u64,

    /// Request bodies up to this size are buffered so they can be
    /// replayed on retry; larger bodies stream through and are sent
    /// at most once.
    pub buffer_limit_bytes: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 500,
            buffer_limit_bytes: 1024 * 1024,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Inbound request timeout (time to response headers) in seconds.
    pub request_secs: u64,

    /// Per-attempt upstream timeout (time to response headers) in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            upstream_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: ProxyConfig = toml::from_str("").unwrap();
        assert!(config.backends.is_empty());
        assert_eq!(config.retries.max_attempts, 3);
        assert_eq!(config.retries.delay_ms, 500);
        assert_eq!(config.probe.timeout_ms, 5000);
        assert_eq!(config.probe.refresh_interval_secs, None);
        assert_eq!(
            config.selection.on_all_unreachable,
            AllUnreachablePolicy::FirstConfigured
        );
    }

    #[test]
    fn full_toml_round_trip() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [[backends]]
            name = "primary"
            address = "http://10.0.0.1:5001"

            [[backends]]
            address = "http://10.0.0.2:5002"

            [probe]
            path = "/healthz"
            timeout_ms = 2000
            refresh_interval_secs = 60

            [selection]
            on_all_unreachable = "fail"

            [retries]
            max_attempts = 5
            delay_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0].name, "primary");
        assert_eq!(config.backends[1].name, "");
        assert_eq!(config.probe.path, "/healthz");
        assert_eq!(config.probe.refresh_interval_secs, Some(60));
        assert_eq!(
            config.selection.on_all_unreachable,
            AllUnreachablePolicy::Fail
        );
        assert_eq!(config.retries.max_attempts, 5);
        assert_eq!(config.retries.delay_ms, 250);
    }
}
