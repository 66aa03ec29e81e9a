#![forbid(unsafe_code)]
//! quiver: a resumable execution runtime for compiled query plans.
//!
//! The runtime pulls results through an immutable plan-node tree using the
//! open/next/reset/close protocol, moves all data through a register file,
//! and can suspend any query mid-stream into a portable snapshot that a
//! later batch resumes from. See the member crates for the pieces:
//! `quiver-core` (values, comparison, numeric tower), `quiver-mem` (memory
//! ceiling), `quiver-ops` (operators), `quiver-wire` (serialization) and
//! `quiver-exec` (batch driver and in-memory storage).

pub use quiver_core as core;
pub use quiver_exec as exec;
pub use quiver_mem as mem;
pub use quiver_ops as ops;
pub use quiver_wire as wire;

pub use quiver_core::{Error, Result};
pub use quiver_exec::{Batch, Engine, ExecOptions, MemTableFactory, MemTableStore};
pub use quiver_ops::{CompiledPlan, PlanBuilder, ResumeInfo};
