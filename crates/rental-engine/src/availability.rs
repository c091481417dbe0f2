//! # Availability Checker
//!
//! Asks the booking store for a vehicle's active bookings and runs the
//! closed-interval overlap test from `rental_core::availability`.
//!
//! ```text
//!   check(vehicle, start, end, excluding)
//!        │
//!        ▼
//!   tokio::time::timeout(check_timeout,
//!        store.find_active_bookings_for_vehicle)
//!        │
//!        ├── Ok(bookings) ──► find_conflicts ──► Available / Unavailable
//!        ├── Err(store)   ──► Unknown
//!        └── Elapsed      ──► Unknown
//! ```
//!
//! This is the advisory check run while a booking is being edited. The
//! authoritative one happens inside `BookingStore::commit_transition`.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use rental_core::availability::find_conflicts;
use rental_core::{AvailabilityOutcome, BookingSummary, DateRange};

use crate::error::{EngineError, EngineResult};
use crate::ports::BookingStore;

/// What the orchestrator can conclude from a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "detail", rename_all = "snake_case")]
pub enum AvailabilityVerdict {
    Available,
    /// Confirmed overlapping bookings, ordered by start date then id.
    Unavailable(Vec<BookingSummary>),
    /// The check could not be completed. Never to be read as Available.
    Unknown(String),
}

impl AvailabilityVerdict {
    pub fn is_available(&self) -> bool {
        matches!(self, AvailabilityVerdict::Available)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, AvailabilityVerdict::Unknown(_))
    }
}

impl From<AvailabilityOutcome> for AvailabilityVerdict {
    fn from(outcome: AvailabilityOutcome) -> Self {
        if outcome.available {
            AvailabilityVerdict::Available
        } else {
            AvailabilityVerdict::Unavailable(outcome.conflicts)
        }
    }
}

#[derive(Clone)]
pub struct AvailabilityChecker {
    bookings: Arc<dyn BookingStore>,
    timeout: Duration,
}

impl AvailabilityChecker {
    pub fn new(bookings: Arc<dyn BookingStore>, timeout: Duration) -> Self {
        AvailabilityChecker { bookings, timeout }
    }

    /// Checks `[start, end]` for `vehicle_id`.
    ///
    /// Zero matches is `available: true`, never an error.
    ///
    /// ## Errors
    /// - `Store` if the query failed
    /// - `Timeout` if it did not answer within the configured bound
    pub async fn check_availability(
        &self,
        vehicle_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        excluding_booking_id: Option<&str>,
    ) -> EngineResult<AvailabilityOutcome> {
        debug!(
            vehicle_id = %vehicle_id,
            %start,
            %end,
            excluding = ?excluding_booking_id,
            "Checking availability"
        );

        let query = self
            .bookings
            .find_active_bookings_for_vehicle(vehicle_id, excluding_booking_id);

        let existing = tokio::time::timeout(self.timeout, query)
            .await
            .map_err(|_| EngineError::Timeout {
                operation: "availability check",
                ms: self.timeout.as_millis() as u64,
            })??;

        let outcome = find_conflicts(DateRange::new(start, end), &existing, excluding_booking_id);

        if !outcome.available {
            debug!(
                vehicle_id = %vehicle_id,
                conflicts = ?outcome.conflict_ids(),
                "Vehicle unavailable"
            );
        }

        Ok(outcome)
    }

    /// Like [`check_availability`](Self::check_availability), with failures
    /// folded into `Unknown`.
    pub async fn verdict(
        &self,
        vehicle_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        excluding_booking_id: Option<&str>,
    ) -> AvailabilityVerdict {
        match self
            .check_availability(vehicle_id, start, end, excluding_booking_id)
            .await
        {
            Ok(outcome) => outcome.into(),
            Err(e) => {
                warn!(vehicle_id = %vehicle_id, error = %e, "Availability unknown");
                AvailabilityVerdict::Unknown(e.to_string())
            }
        }
    }
}
