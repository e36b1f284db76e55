//! B-tree error types
//!
//! Structural corruption is not represented here: a tree whose shape breaks
//! its own invariants is unusable, and the code that finds out asserts.

use thiserror::Error;

/// Errors returned by tree modifications
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TreeError {
    /// Record does not have the number of fields the index stores
    #[error("Field count mismatch: expected {expected}, got {got}")]
    FieldCount { expected: usize, got: usize },

    /// A live record with the same unique prefix already exists
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// No record with the given unique prefix exists
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Tree parameters are unusable
    #[error("Invalid tree configuration: {0}")]
    Config(String),
}

/// Result type alias for tree operations
pub type TreeResult<T> = Result<T, TreeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TreeError::FieldCount {
            expected: 3,
            got: 2,
        };
        assert_eq!(err.to_string(), "Field count mismatch: expected 3, got 2");

        let err = TreeError::KeyNotFound("(1, 2)".to_string());
        assert_eq!(err.to_string(), "Key not found: (1, 2)");
    }
}
