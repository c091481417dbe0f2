//! # Engine Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      EngineError                                        │
//! │                                                                         │
//! │  Core(CoreError)            validation, illegal transition, commands   │
//! │  Store(StoreError)          port failures                              │
//! │     ├── Overlap { conflicts }     authoritative commit-time conflict   │
//! │     ├── NotFound { entity, id }                                        │
//! │     └── Backend(String)           transport / query failure            │
//! │  Timeout { operation, ms }                                             │
//! │  InvalidConfig / ConfigLoad / ConfigSave                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rental_core::{BookingSummary, CoreError, TransitionError, ValidationError};
use rental_db::DbError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Port Errors
// =============================================================================

/// Error returned by the repository ports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The write would double-book the vehicle.
    #[error("Vehicle is already booked: {} conflicting booking(s)", .conflicts.len())]
    Overlap { conflicts: Vec<BookingSummary> },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Anything the caller can't act on beyond reporting it.
    #[error("Store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend(message.into())
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::BookingOverlap { conflicts, .. } => StoreError::Overlap { conflicts },
            DbError::NotFound { entity, id } => StoreError::NotFound { entity, id },
            other => StoreError::Backend(other.to_string()),
        }
    }
}

// =============================================================================
// Engine Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{operation} timed out after {ms} ms")]
    Timeout { operation: &'static str, ms: u64 },

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl From<TransitionError> for EngineError {
    fn from(err: TransitionError) -> Self {
        EngineError::Core(CoreError::Transition(err))
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        EngineError::Store(err.into())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl EngineError {
    /// True if running the same operation again may succeed.
    ///
    /// Backend failures and timeouts are retryable. Validation, illegal
    /// transitions, overlaps and configuration problems are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Store(StoreError::Backend(_)) | EngineError::Timeout { .. }
        )
    }

    /// True for configuration problems.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfig(_)
                | EngineError::ConfigLoadFailed(_)
                | EngineError::ConfigSaveFailed(_)
        )
    }

    /// The conflicting bookings, when this is a commit-time overlap.
    pub fn conflicts(&self) -> Option<&[BookingSummary]> {
        match self {
            EngineError::Store(StoreError::Overlap { conflicts }) => Some(conflicts),
            _ => None,
        }
    }
}
