//! # Error Types
//!
//! Domain-specific error types for rental-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  rental-core errors (this file)                                        │
//! │  ├── CoreError        - General booking rule violations                │
//! │  ├── ValidationError  - Date range and service line failures           │
//! │  └── TransitionError  - Events the current status does not accept      │
//! │                                                                         │
//! │  rental-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  rental-engine errors (separate crate)                                 │
//! │  ├── StoreError       - What the repository ports report               │
//! │  └── EngineError      - What orchestrator callers see                  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A missing vehicle during a transition is NOT an error here. The state write
//! succeeds and the skipped side effect shows up as a
//! [`TransitionWarning`](crate::lifecycle::TransitionWarning).

use thiserror::Error;

use crate::types::{BookingStatus, DocStatus};

/// Result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Field edits and saves are only accepted while the document is a draft.
    ///
    /// ## When This Occurs
    /// - Saving a booking after it was submitted
    /// - Editing the service lines of a cancelled booking
    #[error("Booking is {docstatus:?}, only draft bookings can be edited")]
    NotEditable { docstatus: DocStatus },

    /// The operation needs a submitted booking.
    #[error("Booking must be submitted before {operation}")]
    NotSubmitted { operation: &'static str },

    /// A rental contract already points at this booking.
    #[error("Rental contract {contract_id} already exists for this booking")]
    ContractAlreadyLinked { contract_id: String },

    /// A field the operation depends on has no value.
    #[error("Booking has no {field}")]
    MissingField { field: &'static str },

    /// Service line index out of bounds.
    #[error("No service line at position {index}")]
    ServiceLineNotFound { index: usize },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Lifecycle error (wraps TransitionError).
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// The date variants are checked in declaration order by
/// [`validate_dates`](crate::validation::validate_dates), so a caller always
/// learns about the earliest failing rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Rental start lies before today.
    #[error("Rental start date cannot be in the past")]
    PastStartDate,

    /// Rental end lies before today.
    #[error("Rental end date cannot be in the past")]
    PastEndDate,

    /// Rental end is not strictly after rental start.
    #[error("Rental end date must be after rental start date")]
    EndBeforeOrEqualStart,

    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must not be negative.
    #[error("{field} cannot be negative")]
    Negative { field: String },

    /// Value is outside the accepted range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },
}

// =============================================================================
// Transition Error
// =============================================================================

/// Rejected lifecycle events.
///
/// A rejected transition never leaves a partial change behind: the booking
/// passed to [`transition`](crate::lifecycle::transition) is exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The current state does not permit the event.
    ///
    /// ## Examples
    /// ```text
    /// Returned + PostInspectionCompleted  → IllegalTransition
    /// Cancelled + Submit                  → IllegalTransition
    /// Completed + Cancel                  → IllegalTransition
    /// ```
    #[error("Cannot apply {event} to a booking in status {from}")]
    IllegalTransition {
        from: BookingStatus,
        event: &'static str,
    },
}
