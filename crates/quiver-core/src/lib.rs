#![forbid(unsafe_code)]
//! quiver-core: value model, numeric promotion, comparison, hashing, ids,
//! errors, and configuration for the quiver plan runtime.
//!
//! This crate is pure data + arithmetic. No IO, no async, no operator logic;
//! those live in `quiver-ops` and above.

pub mod compare;
pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod loc;
pub mod numeric;
pub mod prelude;
pub mod quota;
pub mod value;

pub use error::{Error, Result};
pub use id::{RegId, StateId};
pub use loc::Location;
pub use numeric::NumericKind;
pub use value::Value;
