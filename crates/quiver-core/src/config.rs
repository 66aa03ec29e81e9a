//! Execution configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

/// Where an execution runs. Several operators take different code paths
/// depending on the role: server-side nodes aggregate raw items, client-side
/// nodes merge pre-aggregated partial sequences shipped back from shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecRole {
    Server,
    Client,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Hard per-query memory ceiling (bytes) for buffering operators
    /// (sort, collect, distinct). Exceeding it aborts the query.
    pub mem_ceiling_bytes: u64,

    /// Default number of results per batch before the driver suspends.
    pub batch_size: usize,

    /// Trace verbosity for the runtime context (0 = off).
    pub trace_level: u8,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            mem_ceiling_bytes: 64 * 1024 * 1024, // 64 MiB default
            batch_size: 100,
            trace_level: 0,
        }
    }
}

impl ExecConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `QUIVER_MEM_CEILING_BYTES`: per-query memory ceiling in bytes
    /// - `QUIVER_BATCH_SIZE`: results per batch
    /// - `QUIVER_TRACE_LEVEL`: trace verbosity
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("QUIVER_MEM_CEILING_BYTES") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.mem_ceiling_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("QUIVER_BATCH_SIZE") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.batch_size = v;
            }
        }

        if let Ok(s) = std::env::var("QUIVER_TRACE_LEVEL") {
            if let Ok(v) = s.parse::<u8>() {
                cfg.trace_level = v;
            }
        }

        cfg
    }
}
