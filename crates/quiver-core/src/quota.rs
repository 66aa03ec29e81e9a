//! Abstract memory-quota interface.
//!
//! The concrete tracker lives in `quiver-mem`. Only the trait is here so any
//! crate can depend on the API without pulling the accounting logic.

use crate::error::Result;

/// A per-query memory quota with a hard ceiling.
///
/// The counter accumulates monotonically over the life of one execution;
/// buffering operators charge it before holding on to data and must surface
/// the error when the ceiling is hit rather than keep allocating.
pub trait MemoryQuota {
    /// Charge `bytes` against the quota. Errors when the ceiling would be
    /// exceeded; the charge is not applied in that case.
    fn consume(&self, bytes: u64, tag: &'static str) -> Result<()>;

    /// Configured ceiling (bytes).
    fn ceiling_bytes(&self) -> u64;

    /// Total bytes consumed so far (advisory; not a correctness API).
    fn consumed_bytes(&self) -> u64;
}

// NOTE: Do *not* add default impls here that would silently "allow"
// consumption. The mem crate is the only place trackers are constructed.
