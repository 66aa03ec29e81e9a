//! Numeric promotion lattice and per-kind arithmetic.
//!
//! The lattice is `Int < Long < Float < Double < Decimal`. Arithmetic first
//! fixes a result kind (the least upper bound of all operand kinds, seeded by
//! the operator family), then evaluates every position in that kind.
//!
//! Int/Long arithmetic wraps on overflow. Division by a zero divisor is an
//! arithmetic error for every kind, including the floating ones; the engine
//! never produces IEEE infinities from user division.

use bigdecimal::{BigDecimal, FromPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::loc::Location;
use crate::value::Value;

/// Result-type lattice for mixed-type arithmetic and aggregation.
/// Variant order is the lattice order; `max` is the least upper bound.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum NumericKind {
    Int,
    Long,
    Float,
    Double,
    Decimal,
}

impl NumericKind {
    pub fn lub(self, other: NumericKind) -> NumericKind {
        self.max(other)
    }
}

/// Per-position arithmetic operator codes.
///
/// `Add`/`Sub` form the additive family, `Mul`/`Div`/`IDiv` the
/// multiplicative one. `Div` is the real-division marker: its presence in an
/// operator sequence seeds the promotion scan at `Double`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
}

/// Convert a numeric value to `kind`, which must be >= the value's own kind.
pub fn widen(v: &Value, kind: NumericKind, loc: Location) -> Result<Value> {
    let own = v
        .numeric_kind()
        .ok_or_else(|| Error::query(format!("operand of type {} is not numeric", v.type_name()), loc))?;
    if own > kind {
        return Err(Error::invariant(format!(
            "cannot narrow {own:?} operand to {kind:?}"
        )));
    }
    Ok(match kind {
        NumericKind::Int => v.clone(),
        NumericKind::Long => Value::Long(long_of(v)),
        NumericKind::Float => Value::Float(match v {
            Value::Int(i) => *i as f32,
            Value::Long(l) => *l as f32,
            Value::Float(f) => *f,
            _ => unreachable!("narrowing rejected above"),
        }),
        NumericKind::Double => Value::Double(double_of(v)),
        NumericKind::Decimal => Value::Decimal(decimal_of(v, loc)?),
    })
}

fn long_of(v: &Value) -> i64 {
    match v {
        Value::Int(i) => *i as i64,
        Value::Long(l) => *l,
        _ => 0,
    }
}

fn double_of(v: &Value) -> f64 {
    match v {
        Value::Int(i) => *i as f64,
        Value::Long(l) => *l as f64,
        Value::Float(f) => *f as f64,
        Value::Double(d) => *d,
        _ => 0.0,
    }
}

/// Lossless decimal view of any numeric value. Non-finite floats have no
/// decimal form and surface as an arithmetic error.
pub fn decimal_of(v: &Value, loc: Location) -> Result<BigDecimal> {
    match v {
        Value::Int(i) => Ok(BigDecimal::from(*i)),
        Value::Long(l) => Ok(BigDecimal::from(*l)),
        Value::Float(f) => BigDecimal::from_f32(*f)
            .ok_or_else(|| Error::arithmetic("non-finite float has no decimal value", loc)),
        Value::Double(d) => BigDecimal::from_f64(*d)
            .ok_or_else(|| Error::arithmetic("non-finite double has no decimal value", loc)),
        Value::Decimal(d) => Ok(d.clone()),
        other => Err(Error::query(
            format!("operand of type {} is not numeric", other.type_name()),
            loc,
        )),
    }
}

/// Apply one arithmetic operator at a fixed kind. Both sides must already be
/// widened to `kind`.
pub fn apply(op: ArithOp, lhs: &Value, rhs: &Value, kind: NumericKind, loc: Location) -> Result<Value> {
    match kind {
        NumericKind::Int => {
            let (a, b) = (long_of(lhs) as i32, long_of(rhs) as i32);
            Ok(Value::Int(apply_i32(op, a, b, loc)?))
        }
        NumericKind::Long => {
            let (a, b) = (long_of(lhs), long_of(rhs));
            Ok(Value::Long(apply_i64(op, a, b, loc)?))
        }
        NumericKind::Float => {
            let (a, b) = (f32_of(lhs), f32_of(rhs));
            Ok(Value::Float(apply_f32(op, a, b, loc)?))
        }
        NumericKind::Double => {
            let (a, b) = (double_of(lhs), double_of(rhs));
            Ok(Value::Double(apply_f64(op, a, b, loc)?))
        }
        NumericKind::Decimal => {
            let a = decimal_of(lhs, loc)?;
            let b = decimal_of(rhs, loc)?;
            Ok(Value::Decimal(apply_decimal(op, &a, &b, loc)?))
        }
    }
}

fn f32_of(v: &Value) -> f32 {
    match v {
        Value::Float(f) => *f,
        other => double_of(other) as f32,
    }
}

fn div_by_zero(loc: Location) -> Error {
    Error::arithmetic("division by zero", loc)
}

fn apply_i32(op: ArithOp, a: i32, b: i32, loc: Location) -> Result<i32> {
    Ok(match op {
        ArithOp::Add => a.wrapping_add(b),
        ArithOp::Sub => a.wrapping_sub(b),
        ArithOp::Mul => a.wrapping_mul(b),
        ArithOp::Div | ArithOp::IDiv => {
            if b == 0 {
                return Err(div_by_zero(loc));
            }
            a.wrapping_div(b)
        }
    })
}

fn apply_i64(op: ArithOp, a: i64, b: i64, loc: Location) -> Result<i64> {
    Ok(match op {
        ArithOp::Add => a.wrapping_add(b),
        ArithOp::Sub => a.wrapping_sub(b),
        ArithOp::Mul => a.wrapping_mul(b),
        ArithOp::Div | ArithOp::IDiv => {
            if b == 0 {
                return Err(div_by_zero(loc));
            }
            a.wrapping_div(b)
        }
    })
}

fn apply_f32(op: ArithOp, a: f32, b: f32, loc: Location) -> Result<f32> {
    Ok(match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => {
            if b == 0.0 {
                return Err(div_by_zero(loc));
            }
            a / b
        }
        ArithOp::IDiv => {
            if b == 0.0 {
                return Err(div_by_zero(loc));
            }
            (a / b).trunc()
        }
    })
}

fn apply_f64(op: ArithOp, a: f64, b: f64, loc: Location) -> Result<f64> {
    Ok(match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => {
            if b == 0.0 {
                return Err(div_by_zero(loc));
            }
            a / b
        }
        ArithOp::IDiv => {
            if b == 0.0 {
                return Err(div_by_zero(loc));
            }
            (a / b).trunc()
        }
    })
}

fn apply_decimal(op: ArithOp, a: &BigDecimal, b: &BigDecimal, loc: Location) -> Result<BigDecimal> {
    Ok(match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => {
            if b.is_zero() {
                return Err(div_by_zero(loc));
            }
            a / b
        }
        ArithOp::IDiv => {
            if b.is_zero() {
                return Err(div_by_zero(loc));
            }
            // Truncate toward zero: dropping the fractional digits of the
            // quotient keeps the integer part only.
            (a / b).with_scale(0)
        }
    })
}

/// Unary negate at the operand's own kind; no promotion scan.
pub fn negate(v: &Value, loc: Location) -> Result<Value> {
    Ok(match v {
        Value::Int(i) => Value::Int(i.wrapping_neg()),
        Value::Long(l) => Value::Long(l.wrapping_neg()),
        Value::Float(f) => Value::Float(-f),
        Value::Double(d) => Value::Double(-d),
        Value::Decimal(d) => Value::Decimal(-d.clone()),
        other => {
            return Err(Error::query(
                format!("cannot negate value of type {}", other.type_name()),
                loc,
            ))
        }
    })
}

/// Canonical decimal form used by value hashing: numerically equal values of
/// any kind map to the same decimal. Returns `None` for non-finite floats.
pub fn canonical_decimal(v: &Value) -> Option<BigDecimal> {
    match v {
        Value::Int(i) => Some(BigDecimal::from(*i)),
        Value::Long(l) => Some(BigDecimal::from(*l)),
        Value::Float(f) => BigDecimal::from_f32(*f),
        Value::Double(d) => BigDecimal::from_f64(*d),
        Value::Decimal(d) => Some(d.normalized()),
        _ => None,
    }
}

/// Numeric cross-kind comparison helper shared by `compare`.
pub fn numeric_cmp(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    let kind = match (a.numeric_kind(), b.numeric_kind()) {
        (Some(x), Some(y)) => x.lub(y),
        _ => return Ordering::Equal,
    };
    match kind {
        NumericKind::Int | NumericKind::Long => long_of(a).cmp(&long_of(b)),
        NumericKind::Float | NumericKind::Double => {
            let (x, y) = (double_of(a), double_of(b));
            if x.is_nan() && y.is_nan() {
                Ordering::Equal
            } else if x.is_nan() {
                Ordering::Greater
            } else if y.is_nan() {
                Ordering::Less
            } else {
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        }
        NumericKind::Decimal => {
            let zero = Location::default();
            match (decimal_of(a, zero), decimal_of(b, zero)) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                // A non-finite float against a decimal: NaN/inf sort greatest.
                (Err(_), Ok(_)) => Ordering::Greater,
                (Ok(_), Err(_)) => Ordering::Less,
                (Err(_), Err(_)) => Ordering::Equal,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const LOC: Location = Location::new(1, 1);

    #[test]
    fn lattice_lub() {
        assert_eq!(NumericKind::Int.lub(NumericKind::Long), NumericKind::Long);
        assert_eq!(
            NumericKind::Double.lub(NumericKind::Float),
            NumericKind::Double
        );
        assert_eq!(
            NumericKind::Int.lub(NumericKind::Decimal),
            NumericKind::Decimal
        );
    }

    #[test]
    fn int_division_truncates() {
        let v = apply(
            ArithOp::IDiv,
            &Value::Int(7),
            &Value::Int(2),
            NumericKind::Int,
            LOC,
        )
        .unwrap();
        assert_eq!(v, Value::Int(3));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        for kind in [NumericKind::Int, NumericKind::Double, NumericKind::Decimal] {
            let lhs = widen(&Value::Int(1), kind, LOC).unwrap();
            let rhs = widen(&Value::Int(0), kind, LOC).unwrap();
            let err = apply(ArithOp::Div, &lhs, &rhs, kind, LOC).unwrap_err();
            assert!(matches!(err, Error::Arithmetic { .. }), "{kind:?}: {err}");
        }
    }

    #[test]
    fn decimal_idiv_truncates_toward_zero() {
        let a = Value::Decimal(BigDecimal::from_str("7.5").unwrap());
        let b = Value::Decimal(BigDecimal::from_str("2").unwrap());
        let v = apply(ArithOp::IDiv, &a, &b, NumericKind::Decimal, LOC).unwrap();
        assert_eq!(v, Value::Decimal(BigDecimal::from(3)));
    }

    #[test]
    fn negate_keeps_kind() {
        assert_eq!(negate(&Value::Int(5), LOC).unwrap(), Value::Int(-5));
        assert_eq!(negate(&Value::Double(2.5), LOC).unwrap(), Value::Double(-2.5));
        assert!(negate(&Value::Str("x".into()), LOC).is_err());
    }
}
