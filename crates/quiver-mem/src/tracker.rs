//! Consumption tracker + peak tracking.
//!
//! One `ConsumptionTracker` belongs to exactly one execution context, so the
//! atomics are never contended; they keep the tracker shareable through an
//! `Arc` without interior-mutability ceremony.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use quiver_core::quota::MemoryQuota;

use crate::error::Error;

struct TrackerInner {
    ceiling: u64,
    consumed: AtomicU64,
}

/// Concrete `MemoryQuota` used by the runtime context.
#[derive(Clone)]
pub struct ConsumptionTracker {
    inner: Arc<TrackerInner>,
    peak: Arc<PeakTracker>,
}

impl ConsumptionTracker {
    pub fn new(ceiling_bytes: u64) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                ceiling: ceiling_bytes,
                consumed: AtomicU64::new(0),
            }),
            peak: Arc::new(PeakTracker::new()),
        }
    }

    pub fn peak_bytes(&self) -> u64 {
        self.peak.peak()
    }
}

impl MemoryQuota for ConsumptionTracker {
    fn consume(&self, bytes: u64, tag: &'static str) -> quiver_core::Result<()> {
        loop {
            let cur = self.inner.consumed.load(Ordering::Relaxed);
            let next = cur.saturating_add(bytes);
            if next > self.inner.ceiling {
                return Err(Error::CeilingExceeded {
                    tag,
                    requested: bytes,
                    ceiling: self.inner.ceiling,
                    consumed: cur,
                }
                .into());
            }
            if self
                .inner
                .consumed
                .compare_exchange(cur, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                self.peak.record_used(next);
                #[cfg(feature = "tracing")]
                tracing::trace!(bytes, tag, consumed = next, "mem consume");
                return Ok(());
            }
        }
    }

    fn ceiling_bytes(&self) -> u64 {
        self.inner.ceiling
    }

    fn consumed_bytes(&self) -> u64 {
        self.inner.consumed.load(Ordering::Relaxed)
    }
}

/// Lightweight peak tracking. Cheap enough to stay always-on.
#[derive(Default)]
pub struct PeakTracker {
    peak_bytes: AtomicU64,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self {
            peak_bytes: AtomicU64::new(0),
        }
    }

    /// Record a new "consumed bytes" value; updates peak if higher.
    pub fn record_used(&self, used_bytes: u64) {
        let mut cur = self.peak_bytes.load(Ordering::Relaxed);
        while used_bytes > cur {
            match self.peak_bytes.compare_exchange(
                cur,
                used_bytes,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
    }

    pub fn peak(&self) -> u64 {
        self.peak_bytes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_accumulates_monotonically() {
        let t = ConsumptionTracker::new(1000);
        t.consume(300, "test").unwrap();
        t.consume(300, "test").unwrap();
        assert_eq!(t.consumed_bytes(), 600);
        assert_eq!(t.peak_bytes(), 600);
    }

    #[test]
    fn ceiling_is_hard() {
        let t = ConsumptionTracker::new(500);
        t.consume(400, "test").unwrap();
        let err = t.consume(200, "test").unwrap_err();
        assert!(matches!(err, quiver_core::Error::Memory { .. }));
        // Failed charge is not applied.
        assert_eq!(t.consumed_bytes(), 400);
    }
}
