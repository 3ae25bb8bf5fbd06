//! Error types for the revision log.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by revision log operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A revision was appended out of order.
    #[error("revision {attempted} is not newer than head revision {head}")]
    NonMonotonicRevision {
        /// Current head revision id.
        head: u64,
        /// Rejected revision id.
        attempted: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::NonMonotonicRevision {
            head: 10,
            attempted: 7,
        };
        let msg = err.to_string();
        assert!(msg.contains("10"));
        assert!(msg.contains("7"));
    }
}
