#![forbid(unsafe_code)]
//! quiver-mem: per-query memory consumption tracking.
//!
//! This crate provides the concrete implementation for the *interface*
//! defined in `quiver-core::quota`. Buffering operators (sort, collect,
//! distinct grouping) charge every buffered value here so the engine can
//! enforce the hard per-query ceiling.
//!
//! The counter is monotonic for the life of an execution: suspended state is
//! accounted the same as live state, so a query cannot dodge its ceiling by
//! bouncing across batch boundaries.

pub mod error;
pub mod tracker;

pub use tracker::{ConsumptionTracker, PeakTracker};
