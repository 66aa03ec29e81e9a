//! Aggregation accumulators.
//!
//! The accumulator contract is three operations:
//! - `seed`: start from nothing, or from a previously extracted partial
//!   (resuming a suspended group or merging a shard partial);
//! - `accumulate` / `merge`: fold one raw item (server role) or one partial
//!   value shipped back from a shard (client role);
//! - `extract(reset)`: read the current result. With `reset = true` the
//!   accumulator also returns to its seed state; group boundaries use this
//!   dual read-and-clear deliberately, so "retrieve final value" and "start
//!   the next group" are a single call that cannot be torn apart.
//!
//! SUM promotes lazily along Long -> Double -> Decimal as operand kinds
//! appear. MIN/MAX skip complex values (binary, array, map, record) the same
//! way sort keys reject them. COLLECT in distinct mode deduplicates through
//! the canonical value hash, so `Int(1)` and `Long(1)` are one element.

use std::collections::HashSet;

use quiver_core::compare::total_cmp;
use quiver_core::error::{Error, Result};
use quiver_core::hash::hash_value;
use quiver_core::loc::Location;
use quiver_core::numeric::{apply, widen, ArithOp, NumericKind};
use quiver_core::value::Value;
use serde::{Deserialize, Serialize};

/// Aggregate function selector, shared by grouping and whole-sequence
/// aggregation nodes and by the wire codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggrKind {
    /// Item count; NULL and EMPTY items do not count.
    Count,
    /// Count of numeric items only.
    CountNumeric,
    Sum,
    Min,
    Max,
    /// Array-collect; `distinct` deduplicates by value hash.
    Collect { distinct: bool },
}

impl AggrKind {
    pub fn name(&self) -> &'static str {
        match self {
            AggrKind::Count => "count",
            AggrKind::CountNumeric => "count-numeric",
            AggrKind::Sum => "sum",
            AggrKind::Min => "min",
            AggrKind::Max => "max",
            AggrKind::Collect { distinct: false } => "collect",
            AggrKind::Collect { distinct: true } => "collect-distinct",
        }
    }
}

/// Live accumulator state for one aggregate column.
#[derive(Debug, Clone)]
pub enum AggrAcc {
    Count(i64),
    CountNumeric(i64),
    Sum {
        kind: NumericKind,
        total: Value,
        saw_any: bool,
    },
    Min(Option<Value>),
    Max(Option<Value>),
    Collect {
        items: Vec<Value>,
        seen: Option<HashSet<[u8; 32]>>,
    },
}

impl AggrAcc {
    /// Fresh accumulator, or one re-seeded from a previously extracted
    /// partial value (`extract(false)` output).
    pub fn seed(kind: AggrKind, partial: Option<&Value>) -> Result<Self> {
        let mut acc = match kind {
            AggrKind::Count => AggrAcc::Count(0),
            AggrKind::CountNumeric => AggrAcc::CountNumeric(0),
            AggrKind::Sum => AggrAcc::Sum {
                kind: NumericKind::Long,
                total: Value::Long(0),
                saw_any: false,
            },
            AggrKind::Min => AggrAcc::Min(None),
            AggrKind::Max => AggrAcc::Max(None),
            AggrKind::Collect { distinct } => AggrAcc::Collect {
                items: Vec::new(),
                seen: distinct.then(HashSet::new),
            },
        };
        if let Some(v) = partial {
            acc.absorb_partial(v)?;
        }
        Ok(acc)
    }

    fn absorb_partial(&mut self, v: &Value) -> Result<()> {
        if v.is_any_null() || v.is_empty_marker() {
            return Ok(());
        }
        match self {
            AggrAcc::Count(n) | AggrAcc::CountNumeric(n) => {
                *n = v.as_long().ok_or_else(|| {
                    Error::invariant(format!("count partial is {}, not a long", v.type_name()))
                })?;
            }
            AggrAcc::Sum { .. } => self.add_numeric(v)?,
            AggrAcc::Min(slot) | AggrAcc::Max(slot) => *slot = Some(v.clone()),
            AggrAcc::Collect { .. } => {
                let Value::Array(elems) = v else {
                    return Err(Error::invariant(format!(
                        "collect partial is {}, not an array",
                        v.type_name()
                    )));
                };
                for e in elems {
                    self.collect_one(e)?;
                }
            }
        }
        Ok(())
    }

    /// Fold one raw input item (server role).
    pub fn accumulate(&mut self, v: &Value) -> Result<()> {
        if v.is_any_null() || v.is_empty_marker() {
            return Ok(());
        }
        match self {
            AggrAcc::Count(n) => *n += 1,
            AggrAcc::CountNumeric(n) => {
                if v.is_numeric() {
                    *n += 1;
                }
            }
            AggrAcc::Sum { .. } => self.add_numeric(v)?,
            AggrAcc::Min(slot) => {
                if !v.is_complex() {
                    take_extreme(slot, v, std::cmp::Ordering::Less);
                }
            }
            AggrAcc::Max(slot) => {
                if !v.is_complex() {
                    take_extreme(slot, v, std::cmp::Ordering::Greater);
                }
            }
            AggrAcc::Collect { .. } => self.collect_one(v)?,
        }
        Ok(())
    }

    /// Fold one partial shipped back from a shard (client role). Counts add
    /// their partial counts; everything else folds the partial like a raw
    /// value.
    pub fn merge(&mut self, v: &Value) -> Result<()> {
        if v.is_any_null() || v.is_empty_marker() {
            return Ok(());
        }
        match self {
            AggrAcc::Count(n) | AggrAcc::CountNumeric(n) => {
                let add = v.as_long().ok_or_else(|| {
                    Error::invariant(format!("count partial is {}, not a long", v.type_name()))
                })?;
                *n += add;
            }
            AggrAcc::Sum { .. } | AggrAcc::Min(_) | AggrAcc::Max(_) => self.accumulate(v)?,
            AggrAcc::Collect { .. } => self.absorb_partial(v)?,
        }
        Ok(())
    }

    fn add_numeric(&mut self, v: &Value) -> Result<()> {
        let AggrAcc::Sum {
            kind,
            total,
            saw_any,
        } = self
        else {
            return Err(Error::invariant("add_numeric on a non-sum accumulator"));
        };
        let Some(own) = v.numeric_kind() else {
            // Non-numeric items do not contribute to SUM.
            return Ok(());
        };
        // Lazy promotion: float input lifts the running total to Double,
        // decimal input to Decimal. The total never narrows back.
        let next_kind = match kind.lub(own) {
            NumericKind::Int => NumericKind::Long,
            NumericKind::Float => NumericKind::Double,
            k => k,
        };
        let loc = Location::default();
        let lhs = widen(total, next_kind, loc)?;
        let rhs = widen(v, next_kind, loc)?;
        *total = apply(ArithOp::Add, &lhs, &rhs, next_kind, loc)?;
        *kind = next_kind;
        *saw_any = true;
        Ok(())
    }

    fn collect_one(&mut self, v: &Value) -> Result<()> {
        let AggrAcc::Collect { items, seen } = self else {
            return Err(Error::invariant("collect_one on a non-collect accumulator"));
        };
        if let Some(set) = seen {
            if !set.insert(hash_value(v).0) {
                return Ok(());
            }
        }
        items.push(v.clone());
        Ok(())
    }

    /// Current result. `reset` also returns the accumulator to its seed
    /// state, which is how a group boundary closes one group and opens the
    /// next in a single call.
    pub fn extract(&mut self, reset: bool) -> Value {
        let out = match self {
            AggrAcc::Count(n) | AggrAcc::CountNumeric(n) => Value::Long(*n),
            AggrAcc::Sum {
                total, saw_any, ..
            } => {
                if *saw_any {
                    total.clone()
                } else {
                    Value::Null
                }
            }
            AggrAcc::Min(slot) | AggrAcc::Max(slot) => {
                slot.clone().unwrap_or(Value::Null)
            }
            AggrAcc::Collect { items, .. } => Value::Array(items.clone()),
        };
        if reset {
            match self {
                AggrAcc::Count(n) | AggrAcc::CountNumeric(n) => *n = 0,
                AggrAcc::Sum {
                    kind,
                    total,
                    saw_any,
                } => {
                    *kind = NumericKind::Long;
                    *total = Value::Long(0);
                    *saw_any = false;
                }
                AggrAcc::Min(slot) | AggrAcc::Max(slot) => *slot = None,
                AggrAcc::Collect { items, seen } => {
                    items.clear();
                    if let Some(set) = seen {
                        set.clear();
                    }
                }
            }
        }
        out
    }
}

fn take_extreme(slot: &mut Option<Value>, v: &Value, want: std::cmp::Ordering) {
    match slot {
        None => *slot = Some(v.clone()),
        Some(cur) => {
            if total_cmp(v, cur) == want {
                *slot = Some(v.clone());
            }
        }
    }
}
