#![forbid(unsafe_code)]
//! quiver-wire: plan and snapshot serialization.
//!
//! Two plan formats live here. The [`internal`] format is the versioned
//! binary representation shipped between server nodes; it carries every
//! node kind and round-trips exactly. The [`proxy`] format is the reduced
//! write-only encoding of the expression fragment language drivers execute
//! themselves. [`resume`] moves suspension snapshots between batches.

pub mod bytes;
pub mod internal;
pub mod proxy;
pub mod resume;
mod value;

pub use internal::{decode_plan, encode_plan, required_version, VERSION_BASE, VERSION_CURRENT};
pub use proxy::{encode_proxy, PROXY_VERSION};
pub use resume::{decode_resume, encode_resume, RESUME_VERSION};
