//! Upstream backend subsystem.
//!
//! # Data Flow
//! ```text
//! config backends
//!     → backend.rs (parsed, immutable Backend values)
//!     → probe results per backend
//!     → selection.rs (pick the minimal-latency backend)
//!     → snapshot.rs (process-wide selected-backend slot)
//!     → read lock-free by every request handler
//! ```
//!
//! # Design Decisions
//! - Backends are immutable once configured
//! - Selection state is an atomically-swapped snapshot, written before
//!   the listener accepts traffic and by the optional probe refresher
//! - Unreachable backends carry a sentinel latency that never wins

pub mod backend;
pub mod selection;
pub mod snapshot;

pub use backend::{Backend, ProbeResult};
pub use selection::select_fastest;
pub use snapshot::SelectedBackend;
