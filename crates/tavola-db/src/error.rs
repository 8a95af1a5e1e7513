//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          Business rule (CoreError)         │
//! │       │                                     │                           │
//! │       ▼                                     ▼                           │
//! │  DbError (this module) ◄──────────── DbError::Domain                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CommandTx dropped → transaction rolled back                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Caller inspects DbError::kind() / message                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tavola_core::{CoreError, ErrorKind, ValidationError};
use thiserror::Error;

/// Database operation errors.
///
/// These errors wrap sqlx errors and the domain errors raised while a
/// command is running, so every command returns one [`DbResult`].
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - `fetch_one` returns no rows
    /// - Cart line or KOT id doesn't exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Two KOTs racing for the same sequence number
    /// - Duplicate cart row for a product
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Cart write against a session id that was never created
    /// - Bill item referencing a non-existent bill
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    ///
    /// ## When This Occurs
    /// - Runtime SQL error
    /// - CHECK constraint rejected a value
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed to begin or commit.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// A stored row could not be decoded into its entity.
    ///
    /// ## When This Occurs
    /// - Unknown enum text in a status column
    /// - Timestamp column that is not RFC 3339
    #[error("Malformed row: {0}")]
    MalformedRow(String),

    /// Configuration value could not be used.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Business rule violation raised by a command.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Domain classification, if this error carries a business rule failure.
    ///
    /// Storage-level `NotFound` also maps to [`ErrorKind::NotFound`].
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            DbError::Domain(err) => Some(err.kind()),
            DbError::NotFound { .. } => Some(ErrorKind::NotFound),
            _ => None,
        }
    }

    /// Returns the wrapped domain error, if any.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            DbError::Domain(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::Domain(CoreError::Validation(err))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::ColumnDecode   → DbError::MalformedRow
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite constraint messages:
                // UNIQUE: "UNIQUE constraint failed: <table>.<column>"
                // FK:     "FOREIGN KEY constraint failed"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::ColumnDecode { index, source } => {
                DbError::MalformedRow(format!("column {index}: {source}"))
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Internal(format!("audit payload: {err}"))
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
