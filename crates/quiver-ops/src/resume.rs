//! Resumption records.
//!
//! A `ResumeInfo` is the portable snapshot of every stateful operator's
//! progress, taken at a batch boundary and replayed into `open` on the next
//! batch. Entries are keyed by the operator's `StateId`, which is stable
//! across batches because both sides hold the same compiled plan.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use quiver_core::value::Value;
use quiver_core::StateId;

use crate::state::ChildStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResumeEntry {
    /// Constant-sequence position.
    Seq { idx: usize },

    /// Storage scan position. `last` is the worker's continuation key (the
    /// key of the last row it produced). `on_current` is set by an enclosing
    /// join during `open`: true re-delivers the last row so outer-branch
    /// bindings can be re-established; false continues strictly after it.
    Scan {
        last: Option<Value>,
        on_current: bool,
    },

    OffsetLimit { skipped: u64, emitted: u64 },

    /// Sort buffer. When the input paused the rows are unsorted and the
    /// resumed execution keeps filling; when it was exhausted mid-drain the
    /// rows are sorted and draining continues at `next_idx`.
    Sort {
        rows: Vec<Value>,
        sorted: bool,
        next_idx: usize,
        input_status: ChildStatus,
    },

    /// In-flight group: its key and one extracted partial per aggregate
    /// column, re-seeded into fresh accumulators on resume.
    Group {
        key: Option<Vec<Value>>,
        partials: Vec<Value>,
    },

    SeqAggr { partial: Value },
}

/// Snapshot of all suspended operator state for one execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeInfo {
    entries: BTreeMap<u32, ResumeEntry>,
}

impl ResumeInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn insert(&mut self, id: StateId, entry: ResumeEntry) {
        self.entries.insert(id.get(), entry);
    }

    pub fn get(&self, id: StateId) -> Option<&ResumeEntry> {
        self.entries.get(&id.get())
    }

    pub fn get_mut(&mut self, id: StateId) -> Option<&mut ResumeEntry> {
        self.entries.get_mut(&id.get())
    }

    /// Remove and return the entry for `id`. Operators consume their entry
    /// during `open`; a later generic `reset` then starts from scratch.
    pub fn take(&mut self, id: StateId) -> Option<ResumeEntry> {
        self.entries.remove(&id.get())
    }

    pub fn contains(&self, id: StateId) -> bool {
        self.entries.contains_key(&id.get())
    }
}
