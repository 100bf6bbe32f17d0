//! # Sync Error Types
//!
//! Error types for the online/offline boundary.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Execution     │  │     Replay              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Engine         │  │  ReplayHalted           │ │
//! │  │  ConfigLoad...  │  │  DatabaseError  │  │                         │ │
//! │  │  ConfigSave...  │  │  Serialization  │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use stockroom_db::DbError;
use stockroom_engine::EngineError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Execution Errors
    // =========================================================================
    /// The queue database failed.
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbError),

    /// The command itself failed against the store.
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Replay Errors
    // =========================================================================
    /// The head entry failed and stays at the head.
    #[error("Replay halted at queue entry {entry_id}: {reason}")]
    ReplayHalted {
        entry_id: String,
        reason: String,
        transient: bool,
    },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Replay worker is shutting down")]
    ShuttingDown,

    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

impl From<stockroom_core::ValidationError> for SyncError {
    fn from(err: stockroom_core::ValidationError) -> Self {
        SyncError::Engine(EngineError::from(err))
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the store was unreachable rather than the call wrong.
    ///
    /// ## Retryable Errors
    /// - Connection loss or pool exhaustion, from either database
    /// - A replay halted by one of the above
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Validation, not-found, insufficient stock and conflicts
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::DatabaseError(e) => e.is_transient(),
            SyncError::Engine(e) => e.is_transient(),
            SyncError::ReplayHalted { transient, .. } => *transient,
            _ => false,
        }
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
