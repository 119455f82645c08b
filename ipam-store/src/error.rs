//! Error types for the record store

use ipam_common::IpamError;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Store error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// A uniqueness constraint rejected the write
    #[error("Constraint violation: {0}")]
    Conflict(String),

    /// Connection pool error
    #[error("Connection pool error: {0}")]
    PoolError(String),

    /// A stored value could not be decoded
    #[error("Invalid value in column {column}: {message}")]
    Decode {
        /// Column holding the bad value
        column: &'static str,
        /// What went wrong
        message: String,
    },

    /// JSON column could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a decode error for `column`
    pub fn decode<S: Into<String>>(column: &'static str, message: S) -> Self {
        Error::Decode {
            column,
            message: message.into(),
        }
    }

    /// Create a new pool error
    pub fn pool_error<S: Into<String>>(message: S) -> Self {
        Error::PoolError(message.into())
    }

    /// Whether the write collided with an existing row
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// Check if retrying the operation may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Io(_)) => true,
            Error::Database(sqlx::Error::PoolTimedOut) => true,
            Error::Database(_) => false,
            Error::Conflict(_) => false,
            Error::PoolError(_) => true,
            Error::Decode { .. } => false,
            Error::Serialization(_) => false,
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Error::Conflict(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut => Error::pool_error("timed out waiting for a connection"),
            sqlx::Error::PoolClosed => Error::pool_error("pool is closed"),
            other => Error::Database(other),
        }
    }
}

impl From<Error> for IpamError {
    fn from(e: Error) -> Self {
        match e {
            Error::Serialization(e) => IpamError::Serialization(e),
            other => IpamError::Database(other.to_string()),
        }
    }
}
