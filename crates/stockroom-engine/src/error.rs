//! # Engine Error Type
//!
//! What callers of [`crate::Engine`] see.
//!
//! ## Error Mapping
//! ```text
//! ┌──────────────────────────────────────┬──────────────────────┐
//! │ Source                               │ ErrorCode            │
//! ├──────────────────────────────────────┼──────────────────────┤
//! │ CoreError::Validation                │ VALIDATION_ERROR     │
//! │ CoreError::NotFound, DbError::NotFound│ NOT_FOUND           │
//! │ CoreError::InsufficientStock         │ INSUFFICIENT_STOCK   │
//! │ CoreError::Conflict                  │ CONFLICT             │
//! │ DbError::RetriesExhausted / conflict │ CONFLICT             │
//! │ DbError::UniqueViolation             │ CONFLICT             │
//! │ DbError transient (connection/pool)  │ UNAVAILABLE          │
//! │ any other DbError                    │ DATABASE_ERROR       │
//! └──────────────────────────────────────┴──────────────────────┘
//! ```

use serde::Serialize;
use stockroom_core::{CoreError, ValidationError};
use stockroom_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Db(DbError::from(err))
    }
}

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NotFound,
    ValidationError,
    InsufficientStock,
    Conflict,
    DatabaseError,
    /// The store could not be reached.
    Unavailable,
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Core(CoreError::Validation(_)) => ErrorCode::ValidationError,
            EngineError::Core(CoreError::NotFound { .. }) => ErrorCode::NotFound,
            EngineError::Core(CoreError::InsufficientStock { .. }) => ErrorCode::InsufficientStock,
            EngineError::Core(CoreError::Conflict { .. }) => ErrorCode::Conflict,
            EngineError::Db(DbError::NotFound { .. }) => ErrorCode::NotFound,
            EngineError::Db(
                DbError::WriteConflict { .. }
                | DbError::RetriesExhausted { .. }
                | DbError::UniqueViolation { .. },
            ) => ErrorCode::Conflict,
            EngineError::Db(e) if e.is_transient() => ErrorCode::Unavailable,
            EngineError::Db(_) => ErrorCode::DatabaseError,
        }
    }

    /// True when the call failed only because the store is unreachable.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Db(e) if e.is_transient())
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Serializable error body.
///
/// ```json
/// { "code": "INSUFFICIENT_STOCK", "message": "Insufficient stock for Acme Soap: available 1, requested 2" }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&EngineError> for ErrorResponse {
    fn from(err: &EngineError) -> Self {
        let message = match err {
            EngineError::Db(e @ (DbError::QueryFailed(_) | DbError::Internal(_))) => {
                tracing::error!("Database operation failed: {}", e);
                "Database operation failed".to_string()
            }
            other => other.to_string(),
        };
        ErrorResponse {
            code: err.code(),
            message,
        }
    }
}
