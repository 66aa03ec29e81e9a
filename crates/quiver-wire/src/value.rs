//! Value encoding for the internal plan format.
//!
//! Each value is a one-byte type tag plus a tag-specific payload. Decimals
//! travel as their canonical string form and timestamps as RFC 3339, so
//! the encoding has no precision cliffs.

use std::collections::BTreeMap;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

use quiver_core::error::{Error, Result};
use quiver_core::value::{Record, Value};

use crate::bytes::{Reader, Writer};

const TAG_NULL: u8 = 0;
const TAG_JSON_NULL: u8 = 1;
const TAG_EMPTY: u8 = 2;
const TAG_BOOL: u8 = 3;
const TAG_INT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_FLOAT: u8 = 6;
const TAG_DOUBLE: u8 = 7;
const TAG_DECIMAL: u8 = 8;
const TAG_STR: u8 = 9;
const TAG_TIMESTAMP: u8 = 10;
const TAG_BINARY: u8 = 11;
const TAG_ARRAY: u8 = 12;
const TAG_MAP: u8 = 13;
const TAG_RECORD: u8 = 14;

pub fn write_value(w: &mut Writer, v: &Value) {
    match v {
        Value::Null => w.u8(TAG_NULL),
        Value::JsonNull => w.u8(TAG_JSON_NULL),
        Value::Empty => w.u8(TAG_EMPTY),
        Value::Bool(b) => {
            w.u8(TAG_BOOL);
            w.bool(*b);
        }
        Value::Int(i) => {
            w.u8(TAG_INT);
            w.zigzag(i64::from(*i));
        }
        Value::Long(l) => {
            w.u8(TAG_LONG);
            w.zigzag(*l);
        }
        Value::Float(f) => {
            w.u8(TAG_FLOAT);
            w.f32_bits(*f);
        }
        Value::Double(d) => {
            w.u8(TAG_DOUBLE);
            w.f64_bits(*d);
        }
        Value::Decimal(d) => {
            w.u8(TAG_DECIMAL);
            w.str(&d.to_string());
        }
        Value::Str(s) => {
            w.u8(TAG_STR);
            w.str(s);
        }
        Value::Timestamp(ts) => {
            w.u8(TAG_TIMESTAMP);
            w.str(&ts.to_rfc3339());
        }
        Value::Binary(b) => {
            w.u8(TAG_BINARY);
            w.bytes(b);
        }
        Value::Array(items) => {
            w.u8(TAG_ARRAY);
            w.varint(items.len() as u64);
            for item in items {
                write_value(w, item);
            }
        }
        Value::Map(entries) => {
            w.u8(TAG_MAP);
            w.varint(entries.len() as u64);
            for (k, val) in entries {
                w.str(k);
                write_value(w, val);
            }
        }
        Value::Record(rec) => {
            w.u8(TAG_RECORD);
            w.varint(rec.len() as u64);
            for (name, val) in rec.fields() {
                w.str(name);
                write_value(w, val);
            }
        }
    }
}

pub fn read_value(r: &mut Reader<'_>) -> Result<Value> {
    let tag = r.u8()?;
    Ok(match tag {
        TAG_NULL => Value::Null,
        TAG_JSON_NULL => Value::JsonNull,
        TAG_EMPTY => Value::Empty,
        TAG_BOOL => Value::Bool(r.bool()?),
        TAG_INT => {
            let raw = r.zigzag()?;
            let v = i32::try_from(raw)
                .map_err(|_| Error::Wire(format!("integer value {raw} out of range")))?;
            Value::Int(v)
        }
        TAG_LONG => Value::Long(r.zigzag()?),
        TAG_FLOAT => Value::Float(r.f32_bits()?),
        TAG_DOUBLE => Value::Double(r.f64_bits()?),
        TAG_DECIMAL => {
            let s = r.str()?;
            let d = BigDecimal::from_str(&s)
                .map_err(|e| Error::Wire(format!("invalid decimal '{s}': {e}")))?;
            Value::Decimal(d)
        }
        TAG_STR => Value::Str(r.str()?),
        TAG_TIMESTAMP => {
            let s = r.str()?;
            let ts = DateTime::parse_from_rfc3339(&s)
                .map_err(|e| Error::Wire(format!("invalid timestamp '{s}': {e}")))?;
            Value::Timestamp(ts.with_timezone(&Utc))
        }
        TAG_BINARY => Value::Binary(r.bytes()?),
        TAG_ARRAY => {
            let n = r.varint()? as usize;
            let mut items = Vec::with_capacity(n.min(1024));
            for _ in 0..n {
                items.push(read_value(r)?);
            }
            Value::Array(items)
        }
        TAG_MAP => {
            let n = r.varint()? as usize;
            let mut entries = BTreeMap::new();
            for _ in 0..n {
                let k = r.str()?;
                let v = read_value(r)?;
                entries.insert(k, v);
            }
            Value::Map(entries)
        }
        TAG_RECORD => {
            let n = r.varint()? as usize;
            let mut rec = Record::new();
            for _ in 0..n {
                let name = r.str()?;
                let v = read_value(r)?;
                rec.set(name, v);
            }
            Value::Record(rec)
        }
        other => return Err(Error::Wire(format!("unknown value tag {other:#04x}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(v: &Value) -> Value {
        let mut w = Writer::new();
        write_value(&mut w, v);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        let out = read_value(&mut r).unwrap();
        assert_eq!(r.remaining(), 0);
        out
    }

    #[test]
    fn scalars_round_trip() {
        for v in [
            Value::Null,
            Value::JsonNull,
            Value::Empty,
            Value::Bool(true),
            Value::Int(-42),
            Value::Long(1 << 40),
            Value::Float(2.5),
            Value::Double(-0.125),
            Value::Decimal(BigDecimal::from_str("123.456").unwrap()),
            Value::Str("héllo".into()),
            Value::Binary(vec![0, 255, 7]),
        ] {
            assert_eq!(round_trip(&v), v);
        }
    }

    #[test]
    fn nested_values_round_trip() {
        let v = Value::Record(
            Record::new()
                .with("id", Value::Long(7))
                .with(
                    "tags",
                    Value::Array(vec![Value::Str("a".into()), Value::Null]),
                ),
        );
        assert_eq!(round_trip(&v), v);
    }
}
