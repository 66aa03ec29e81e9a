//! Stable deep hashing of values, used by distinct sets.
//!
//! The hash must agree with `compare::equal`: numerically equal values of
//! different kinds (e.g. `Int(1)` and `Long(1)`) hash identically, which is
//! why numerics go through their canonical decimal form first.

use blake3::Hasher;

use crate::numeric::canonical_decimal;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub fn hash_value(v: &Value) -> Hash256 {
    let mut h = Hasher::new();
    update(&mut h, v);
    Hash256(h.finalize().into())
}

fn update(h: &mut Hasher, v: &Value) {
    match v {
        Value::Null => {
            h.update(b"null");
        }
        Value::JsonNull => {
            h.update(b"jnull");
        }
        Value::Empty => {
            h.update(b"empty");
        }
        Value::Bool(b) => {
            h.update(b"bool");
            h.update(&[*b as u8]);
        }
        Value::Int(_) | Value::Long(_) | Value::Float(_) | Value::Double(_) | Value::Decimal(_) => {
            match canonical_decimal(v) {
                Some(d) => {
                    h.update(b"num");
                    h.update(d.normalized().to_string().as_bytes());
                }
                // Non-finite floats: fall back to the raw bits.
                None => {
                    h.update(b"fbits");
                    match v {
                        Value::Float(f) => {
                            h.update(&(*f as f64).to_bits().to_le_bytes());
                        }
                        Value::Double(d) => {
                            h.update(&d.to_bits().to_le_bytes());
                        }
                        _ => {}
                    }
                }
            }
        }
        Value::Str(s) => {
            h.update(b"str");
            h.update(&(s.len() as u64).to_le_bytes());
            h.update(s.as_bytes());
        }
        Value::Timestamp(ts) => {
            h.update(b"ts");
            h.update(&ts.timestamp().to_le_bytes());
            h.update(&ts.timestamp_subsec_nanos().to_le_bytes());
        }
        Value::Binary(b) => {
            h.update(b"bin");
            h.update(&(b.len() as u64).to_le_bytes());
            h.update(b);
        }
        Value::Array(items) => {
            h.update(b"arr");
            h.update(&(items.len() as u64).to_le_bytes());
            for item in items {
                update(h, item);
            }
        }
        Value::Map(entries) => {
            h.update(b"map");
            h.update(&(entries.len() as u64).to_le_bytes());
            for (k, val) in entries {
                h.update(&(k.len() as u64).to_le_bytes());
                h.update(k.as_bytes());
                update(h, val);
            }
        }
        Value::Record(rec) => {
            h.update(b"rec");
            h.update(&(rec.len() as u64).to_le_bytes());
            for (name, val) in rec.fields() {
                h.update(&(name.len() as u64).to_le_bytes());
                h.update(name.as_bytes());
                update(h, val);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numerically_equal_values_hash_equal() {
        assert_eq!(hash_value(&Value::Int(1)), hash_value(&Value::Long(1)));
        assert_eq!(
            hash_value(&Value::Double(2.5)),
            hash_value(&Value::Float(2.5))
        );
        assert_ne!(hash_value(&Value::Int(1)), hash_value(&Value::Int(2)));
    }

    #[test]
    fn strings_and_binaries_do_not_collide() {
        assert_ne!(
            hash_value(&Value::Str("ab".into())),
            hash_value(&Value::Binary(b"ab".to_vec()))
        );
    }
}
