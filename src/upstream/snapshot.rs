//! Process-wide selected-backend slot.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::upstream::backend::Backend;

/// The one backend all traffic is forwarded to.
///
/// Holds an atomically-swappable immutable snapshot. Written once before
/// the listener accepts traffic; the optional probe refresher is the only
/// later writer and swaps whole snapshots, so readers never observe a
/// partial update and the hot path takes no locks.
#[derive(Debug)]
pub struct SelectedBackend {
    slot: ArcSwap<Backend>,
}

impl SelectedBackend {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self {
            slot: ArcSwap::new(backend),
        }
    }

    /// The current selection. The returned snapshot stays valid for the
    /// whole request even if a refresh swaps the slot mid-flight.
    pub fn current(&self) -> Arc<Backend> {
        self.slot.load_full()
    }

    /// Atomically replace the selection.
    pub fn replace(&self, backend: Arc<Backend>) {
        self.slot.store(backend);
    }
}
