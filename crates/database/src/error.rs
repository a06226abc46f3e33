//! Database error types.

use thiserror::Error;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// SQLx error (connection, query, etc.)
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Record not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Operation is not valid for the record's current status
    #[error("{entity} {id} is in state {status}")]
    InvalidState {
        entity: &'static str,
        id: String,
        status: String,
    },

    /// Conditional update matched no rows
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: &'static str, id: String },

    /// Another writer already completed this booking
    #[error("booking {id} already processed")]
    AlreadyProcessed { id: String },

    /// Unique ticket code generation gave up after the retry cap
    #[error("could not generate a unique ticket code")]
    CodeGenerationExhausted,

    /// A stored value could not be decoded into its model type
    #[error("corrupt {column} value: {value}")]
    Decode {
        column: &'static str,
        value: String,
    },
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
