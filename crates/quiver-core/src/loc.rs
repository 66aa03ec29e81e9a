//! Source locations carried by plan nodes for diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of the expression a plan node was compiled from.
///
/// Compile-time metadata only; execution never branches on it. User-facing
/// errors attach the location of the offending node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
