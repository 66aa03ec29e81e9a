use thiserror::Error;

/// Result type local to quiver-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("memory ceiling exceeded for tag '{tag}': requested {requested} bytes, ceiling {ceiling}, consumed {consumed}")]
    CeilingExceeded {
        tag: &'static str,
        requested: u64,
        ceiling: u64,
        consumed: u64,
    },
}

impl From<Error> for quiver_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::CeilingExceeded {
                requested,
                ceiling,
                consumed,
                ..
            } => quiver_core::Error::Memory {
                requested,
                ceiling,
                consumed,
            },
        }
    }
}
