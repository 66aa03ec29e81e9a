//! Convenient re-exports for downstream crates.

pub use crate::compare::{compare_kv, equal, total_cmp};
pub use crate::config::{ExecConfig, ExecRole};
pub use crate::error::{Error, Result};
pub use crate::hash::{hash_value, Hash256};
pub use crate::id::{RegId, StateId};
pub use crate::loc::Location;
pub use crate::numeric::{ArithOp, NumericKind};
pub use crate::quota::MemoryQuota;
pub use crate::value::{Record, Value};
