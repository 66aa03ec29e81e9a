#![forbid(unsafe_code)]
//! quiver-exec: running compiled plans in batches.
//!
//! The [`engine::Engine`] executes one batch per call and hands back a
//! resume snapshot when the query is mid-stream; feeding the snapshot into
//! the next call continues exactly where the previous batch stopped.
//! [`mem_store`] provides the in-memory storage backend and its workers.

pub mod engine;
pub mod mem_store;

pub use engine::{Batch, Engine, ExecOptions};
pub use mem_store::{MemTableFactory, MemTableStore};
