//! Value ordering and equality.
//!
//! Three related but distinct notions live here:
//! - `total_cmp`: a total order over all values, used by sort and min/max.
//!   Numerics compare by magnitude across kinds; otherwise unrelated types
//!   order by a fixed type rank so the order stays total.
//! - `equal`: deep, type-aware value equality. `Long(1)` equals `Int(1)`
//!   and `Double(1.0)`; arrays/maps/records compare element-wise.
//! - `compare_kv`: the three-valued comparison used by key membership.
//!   Any NULL-ish side yields "unknown" (`None`); unrelated non-null types
//!   are a hard type-mismatch error, not a quiet false.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::loc::Location;
use crate::numeric::numeric_cmp;
use crate::value::Value;

/// Fixed rank per type for ordering across unrelated types.
fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Empty => 0,
        Value::Null => 1,
        Value::JsonNull => 2,
        Value::Bool(_) => 3,
        Value::Int(_) | Value::Long(_) | Value::Float(_) | Value::Double(_) | Value::Decimal(_) => 4,
        Value::Timestamp(_) => 5,
        Value::Str(_) => 6,
        Value::Binary(_) => 7,
        Value::Array(_) => 8,
        Value::Map(_) => 9,
        Value::Record(_) => 10,
    }
}

/// Total order over all values. EMPTY < NULL < JSON-null < atoms; complex
/// values compare element-wise within their own type.
pub fn total_cmp(a: &Value, b: &Value) -> Ordering {
    use Value::*;
    match (a, b) {
        (Bool(x), Bool(y)) => x.cmp(y),
        (Str(x), Str(y)) => x.cmp(y),
        (Timestamp(x), Timestamp(y)) => x.cmp(y),
        (Binary(x), Binary(y)) => x.cmp(y),
        (Array(x), Array(y)) => {
            for (ax, bx) in x.iter().zip(y.iter()) {
                match total_cmp(ax, bx) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            x.len().cmp(&y.len())
        }
        (Map(x), Map(y)) => {
            for ((ka, va), (kb, vb)) in x.iter().zip(y.iter()) {
                match ka.cmp(kb) {
                    Ordering::Equal => {}
                    other => return other,
                }
                match total_cmp(va, vb) {
                    Ordering::Equal => {}
                    other => return other,
                }
            }
            x.len().cmp(&y.len())
        }
        (Record(x), Record(y)) => {
            for ((na, va), (nb, vb)) in x.fields().zip(y.fields()) {
                match na.cmp(nb) {
                    Ordering::Equal => {}
                    other => return other,
                }
                match total_cmp(va, vb) {
                    Ordering::Equal => {}
                    other => return other,
                }
            }
            x.len().cmp(&y.len())
        }
        _ => {
            if a.is_numeric() && b.is_numeric() {
                numeric_cmp(a, b)
            } else {
                type_rank(a).cmp(&type_rank(b))
            }
        }
    }
}

/// Deep, type-aware value equality. Numerics are equal when numerically
/// equal regardless of representation.
pub fn equal(a: &Value, b: &Value) -> bool {
    total_cmp(a, b) == Ordering::Equal
}

/// Three-valued comparison for membership keys.
///
/// `Ok(None)` means unknown (a NULL/JSON-null/EMPTY side). `Err` means the
/// two sides have unrelated non-null types, which is a user error at `loc`.
pub fn compare_kv(a: &Value, b: &Value, loc: Location) -> Result<Option<Ordering>> {
    use Value::*;
    if a.is_any_null() || b.is_any_null() || a.is_empty_marker() || b.is_empty_marker() {
        return Ok(None);
    }
    if a.is_numeric() && b.is_numeric() {
        return Ok(Some(numeric_cmp(a, b)));
    }
    match (a, b) {
        (Bool(x), Bool(y)) => Ok(Some(x.cmp(y))),
        (Str(x), Str(y)) => Ok(Some(x.cmp(y))),
        (Timestamp(x), Timestamp(y)) => Ok(Some(x.cmp(y))),
        (Binary(x), Binary(y)) => Ok(Some(x.cmp(y))),
        _ => Err(Error::query(
            format!(
                "cannot compare values of types {} and {}",
                a.type_name(),
                b.type_name()
            ),
            loc,
        )),
    }
}
