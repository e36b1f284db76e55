//! Statistics error types
//!
//! Concurrent modification of a tree is not an error: an analysis that loses
//! the race reports `AnalyzeOutcome::Interrupted` and the previous values stay.

use thiserror::Error;

/// Errors that can occur around statistics recalculation
#[derive(Error, Debug)]
pub enum StatsError {
    /// No table with this name is registered
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Tree operation failed
    #[error("Tree error: {0}")]
    Tree(#[from] crate::btree::TreeError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// A background task did not finish
    #[error("Background task failed: {0}")]
    Task(String),
}

/// Result type alias for statistics operations
pub type StatsResult<T> = Result<T, StatsError>;
