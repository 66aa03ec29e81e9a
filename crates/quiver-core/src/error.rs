use thiserror::Error;

use crate::loc::Location;

/// Canonical result for the runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for query execution.
///
/// `Query`/`Arithmetic`/`SizeLimit` are user-facing and carry the source
/// location of the offending plan node. `Invariant` marks states the engine
/// considers impossible (programmer error); it aborts the query and must never
/// be swallowed. `Version` fires before any bytes are written when a plan uses
/// a feature the negotiated wire version cannot carry.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Query error at {loc}: {message}")]
    Query { message: String, loc: Location },

    #[error("Arithmetic error at {loc}: {message}")]
    Arithmetic { message: String, loc: Location },

    #[error("Size limit exceeded at {loc}: {message}")]
    SizeLimit { message: String, loc: Location },

    #[error("Memory ceiling exceeded: requested {requested} bytes, ceiling {ceiling}, consumed {consumed}")]
    Memory {
        requested: u64,
        ceiling: u64,
        consumed: u64,
    },

    #[error("Internal invariant failed: {0}")]
    Invariant(String),

    #[error("Protocol version error: {0}")]
    Version(String),

    #[error("Wire format error: {0}")]
    Wire(String),
}

impl Error {
    pub fn query(message: impl Into<String>, loc: Location) -> Self {
        Error::Query {
            message: message.into(),
            loc,
        }
    }

    pub fn arithmetic(message: impl Into<String>, loc: Location) -> Self {
        Error::Arithmetic {
            message: message.into(),
            loc,
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Error::Invariant(message.into())
    }

    /// True for user/query errors (reported to the caller with a location),
    /// false for engine-fatal ones.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::Query { .. } | Error::Arithmetic { .. } | Error::SizeLimit { .. }
        )
    }
}
