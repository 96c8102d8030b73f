//! Error types for relorm

use thiserror::Error;

/// Result type alias for relorm operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for storage and model operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// Storage connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// A statement failed in the driver
    #[error("Query error: {message} (sql: {sql})")]
    Query { sql: String, message: String },

    /// Construction from a query matched no row
    #[error("Not found: {0}")]
    NotFound(String),

    /// A record could not be built from the given input
    #[error("Invalid construction: {0}")]
    InvalidConstruction(String),

    /// The builder or registry was asked for something it cannot do
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a query failure for a statement
    pub fn query(sql: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            sql: sql.into(),
            message: message.into(),
        }
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a driver-level query failure (including constraint violations)
    pub fn is_query_failure(&self) -> bool {
        matches!(
            self,
            Self::Query { .. }
                | Self::UniqueViolation(_)
                | Self::ForeignKeyViolation(_)
                | Self::CheckViolation(_)
        )
    }

    /// Parse a tokio_postgres error raised by `sql` into a more specific OrmError
    pub fn from_pg_error(sql: &str, err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                _ => {}
            }
            return Self::query(sql, message);
        }
        if err.is_closed() {
            return Self::Connection(err.to_string());
        }
        Self::query(sql, err.to_string())
    }

    /// Parse an sqlx error raised by `sql` into a more specific OrmError
    #[cfg(feature = "sqlite")]
    pub fn from_sqlx_error(sql: &str, err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        match &err {
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.kind() {
                    ErrorKind::UniqueViolation => Self::UniqueViolation(message),
                    ErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(message),
                    ErrorKind::CheckViolation => Self::CheckViolation(message),
                    _ => Self::query(sql, message),
                }
            }
            sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
                Self::Connection(err.to_string())
            }
            sqlx::Error::ColumnDecode { index, source } => Self::decode(index, source.to_string()),
            _ => Self::query(sql, err.to_string()),
        }
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
