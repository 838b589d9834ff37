//! Graph store error types.

use thiserror::Error;

/// Errors that can occur in the dependency graph store.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),

    /// An atomic replace did not commit; the previous state is unchanged.
    #[error("Transaction failed for {key}: {message}")]
    Transaction { key: String, message: String },

    /// Graph schema not initialized.
    #[error("Dependency graph not initialized. Run 'sma init' first.")]
    NotInitialized,

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GraphError {
    pub fn transaction(key: impl Into<String>, err: impl std::fmt::Display) -> Self {
        GraphError::Transaction {
            key: key.into(),
            message: err.to_string(),
        }
    }
}

impl From<surrealdb::Error> for GraphError {
    fn from(err: surrealdb::Error) -> Self {
        GraphError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::Serialization(err.to_string())
    }
}
