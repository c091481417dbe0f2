//! # Validation Module
//!
//! Date range and service line rules for rental bookings.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Orchestrator field change                                     │
//! │  ├── THIS MODULE: dates vs today, end after start                      │
//! │  └── Offending field cleared, error reported                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Save                                                          │
//! │  └── THIS MODULE again, before anything is persisted                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints (rental_end > rental_start, rates ≥ 0)         │
//! │  └── Overlap triggers                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use chrono::NaiveDate;
//! use rental_core::validation::validate_dates;
//! use rental_core::ValidationError;
//!
//! let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
//! let start = NaiveDate::from_ymd_opt(2025, 6, 3);
//! let end = NaiveDate::from_ymd_opt(2025, 6, 3);
//!
//! assert_eq!(
//!     validate_dates(start, end, today),
//!     Err(ValidationError::EndBeforeOrEqualStart)
//! );
//! ```

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::ServiceLine;
use crate::{MAX_RATE_CENTS, MAX_SERVICE_NAME_LEN, MAX_SERVICE_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Date Range
// =============================================================================

/// Validates a rental interval against `today`.
///
/// ## Rules (checked in this order)
/// 1. start, if present, is not before today → else `PastStartDate`
/// 2. end, if present, is not before today → else `PastEndDate`
/// 3. both present: end is strictly after start → else `EndBeforeOrEqualStart`
///
/// Missing dates are not an error; a half-filled form is normal.
pub fn validate_dates(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> ValidationResult<()> {
    if matches!(start, Some(s) if s < today) {
        return Err(ValidationError::PastStartDate);
    }

    if matches!(end, Some(e) if e < today) {
        return Err(ValidationError::PastEndDate);
    }

    if let (Some(s), Some(e)) = (start, end) {
        if e <= s {
            return Err(ValidationError::EndBeforeOrEqualStart);
        }
    }

    Ok(())
}

// =============================================================================
// Service Lines
// =============================================================================

/// Validates a service name.
///
/// ## Rules
/// - Must not be blank
/// - At most 140 characters
pub fn validate_service_name(name: &str) -> ValidationResult<()> {
    if name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "service_name".into(),
        });
    }

    if name.chars().count() > MAX_SERVICE_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "service_name".into(),
            max: MAX_SERVICE_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates the inputs of a service line before it is built.
pub fn validate_service_input(name: &str, quantity: i64, rate: Money) -> ValidationResult<()> {
    validate_service_name(name)?;
    validate_quantity(quantity)?;
    validate_rate("rate", rate)
}

/// Validates a service line before it is added or updated.
pub fn validate_service_line(line: &ServiceLine) -> ValidationResult<()> {
    validate_service_input(&line.service_name, line.quantity, line.rate)
}

/// Validates a service quantity.
///
/// ## Rules
/// - Must not be negative (zero is a placeholder line)
/// - Must not exceed MAX_SERVICE_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty < 0 {
        return Err(ValidationError::Negative {
            field: "quantity".into(),
        });
    }

    if qty > MAX_SERVICE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".into(),
            min: 0,
            max: MAX_SERVICE_QUANTITY,
        });
    }

    Ok(())
}

/// Rejects negative money values and rates above MAX_RATE_CENTS.
pub fn validate_rate(field: &str, rate: Money) -> ValidationResult<()> {
    if rate.is_negative() {
        return Err(ValidationError::Negative {
            field: field.into(),
        });
    }

    if rate.cents() > MAX_RATE_CENTS {
        return Err(ValidationError::OutOfRange {
            field: field.into(),
            min: 0,
            max: MAX_RATE_CENTS,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
