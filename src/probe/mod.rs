//! Latency probing subsystem.
//!
//! # Responsibilities
//! - Issue one lightweight probe per backend, concurrently
//! - Measure round-trip latency to response headers
//! - Map every probe failure to the unreachable sentinel
//! - Optionally re-probe on an interval and refresh the selection

pub mod latency;

pub use latency::{LatencyProber, ProbeRefresher};
