//! Backend selection from probe results.

use std::sync::Arc;

use thiserror::Error;

use crate::config::schema::AllUnreachablePolicy;
use crate::upstream::backend::{Backend, ProbeResult};

/// Selection could not produce a backend.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("no backends to select from")]
    NoBackends,

    #[error("all configured backends are unreachable")]
    AllUnreachable,
}

/// Choose the backend with the minimal probed latency.
///
/// Ties resolve to the earliest-configured backend (probe results keep
/// configuration order). When every backend is unreachable the outcome
/// is governed by `policy`: keep the original first-configured choice,
/// or refuse.
pub fn select_fastest(
    results: &[ProbeResult],
    policy: AllUnreachablePolicy,
) -> Result<Arc<Backend>, SelectionError> {
    let best = results
        .iter()
        .min_by_key(|result| result.latency)
        .ok_or(SelectionError::NoBackends)?;

    if !best.is_reachable() && policy == AllUnreachablePolicy::Fail {
        return Err(SelectionError::AllUnreachable);
    }

    Ok(best.backend.clone())
}
