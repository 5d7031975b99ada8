//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the backend list is usable (non-empty, parseable addresses)
//! - Validate value ranges (attempts >= 1, probe timeout > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function over the deserialized config
//! - Runs before the config is accepted into the system

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::upstream::backend::{Backend, InvalidBackendAddress};

/// A single semantic problem found in the configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("at least one backend must be configured")]
    NoBackends,

    #[error(transparent)]
    Backend(#[from] InvalidBackendAddress),

    #[error("retries.max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("probe.timeout_ms must be greater than zero")]
    ZeroProbeTimeout,
}

/// Validate a deserialized configuration, collecting every problem.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }

    for backend in &config.backends {
        if let Err(e) = Backend::new(&backend.name, &backend.address) {
            errors.push(ValidationError::Backend(e));
        }
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::ZeroAttempts);
    }

    if config.probe.timeout_ms == 0 {
        errors.push(ValidationError::ZeroProbeTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
