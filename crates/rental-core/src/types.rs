//! # Domain Types
//!
//! Core domain types used throughout the rental engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Domain Types                                     │
//! │                                                                         │
//! │  Aggregate Root                                                         │
//! │  └── RentalBooking ──┬── ServiceLine (additional_services, ordered)    │
//! │                      ├── BookingStatus (lifecycle)                     │
//! │                      └── DocStatus (document state)                    │
//! │                                                                         │
//! │  Vehicles                                                               │
//! │  ├── Vehicle                                                            │
//! │  └── VehicleStatus (Available / Booked / Rented)                       │
//! │                                                                         │
//! │  Read Models                                                            │
//! │  ├── BookingSummary   - what the overlap check looks at                 │
//! │  └── VehicleSyncEntry - queued vehicle status write                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Calendar dates are `NaiveDate` (no time zone); lifecycle timestamps are
//! `DateTime<Utc>`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;

// =============================================================================
// Booking Status
// =============================================================================

/// Where a booking is in its lifecycle.
///
/// ## State Flow
/// ```text
/// Draft ──► Confirmed ──► Out ──► Returned ──► Completed
///   │           │          │          │
///   └───────────┴──────────┴──────────┴──────► Cancelled
/// ```
///
/// The string form (`"Draft"`, `"Confirmed"`, ...) is what goes to the
/// database and over serde, and it never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
pub enum BookingStatus {
    /// Quote being prepared, does not hold the vehicle.
    Draft,
    /// Submitted, vehicle reserved.
    Confirmed,
    /// Vehicle handed over to the customer.
    Out,
    /// Vehicle back, invoice pending.
    Returned,
    /// Invoice settled.
    Completed,
    /// Terminal, vehicle released.
    Cancelled,
}

impl BookingStatus {
    /// Stable string form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Draft => "Draft",
            BookingStatus::Confirmed => "Confirmed",
            BookingStatus::Out => "Out",
            BookingStatus::Returned => "Returned",
            BookingStatus::Completed => "Completed",
            BookingStatus::Cancelled => "Cancelled",
        }
    }

    /// Completed and Cancelled accept no further events.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Whether a booking in this status occupies its vehicle.
    pub fn is_active(&self) -> bool {
        !crate::INACTIVE_STATUSES.contains(self)
    }
}

impl Default for BookingStatus {
    fn default() -> Self {
        BookingStatus::Draft
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Document Status
// =============================================================================

/// Document state, independent of the lifecycle status.
///
/// Stored as an integer (0, 1, 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[serde(rename_all = "snake_case")]
#[repr(i32)]
pub enum DocStatus {
    Draft = 0,
    Submitted = 1,
    Cancelled = 2,
}

impl Default for DocStatus {
    fn default() -> Self {
        DocStatus::Draft
    }
}

// =============================================================================
// Vehicle
// =============================================================================

/// Operational status of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
pub enum VehicleStatus {
    Available,
    Booked,
    Rented,
}

impl VehicleStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            VehicleStatus::Available => "Available",
            VehicleStatus::Booked => "Booked",
            VehicleStatus::Rented => "Rented",
        }
    }
}

impl Default for VehicleStatus {
    fn default() -> Self {
        VehicleStatus::Available
    }
}

impl fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rentable vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    /// Business identifier (registration or fleet number).
    pub id: String,

    /// Daily rate copied onto bookings when the vehicle is selected.
    pub rate_per_day: Money,

    pub status: VehicleStatus,
}

// =============================================================================
// Inspection Type
// =============================================================================

/// Which end of the rental an inspection covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
pub enum InspectionType {
    /// Before handover. Completing it moves the booking Out.
    PreInspection,
    /// After return. Completing it moves the booking to Returned.
    PostInspection,
}

// =============================================================================
// Service Line
// =============================================================================

/// An additional service (child seat, GPS, extra driver) on a booking.
///
/// `total` is derived. Call [`ServiceLine::recompute_total`] after touching
/// `quantity` or `rate` directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLine {
    pub service_name: String,
    pub quantity: i64,
    pub rate: Money,
    pub total: Money,
}

impl ServiceLine {
    /// Creates a line with its total already computed.
    pub fn new(service_name: impl Into<String>, quantity: i64, rate: Money) -> Self {
        let mut line = Self {
            service_name: service_name.into(),
            quantity,
            rate,
            total: Money::zero(),
        };
        line.recompute_total();
        line
    }

    /// `total = rate × quantity`.
    #[inline]
    pub fn recompute_total(&mut self) {
        self.total = crate::pricing::line_total(self.quantity, self.rate);
    }
}

// =============================================================================
// Rental Booking
// =============================================================================

/// The aggregate root: one customer renting one vehicle for a date range.
///
/// ## Derived Fields
/// ```text
/// rental_start ─┐
///               ├──► no_days ──┐
/// rental_end ───┘              │
///                              ├──► amount
/// rate_per_day ────────────────┤
///                              │
/// additional_services[].total ─┘
/// ```
///
/// `no_days` and `amount` are never edited directly; they are refreshed by
/// [`pricing::recompute`](crate::pricing::recompute).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalBooking {
    /// UUID v4, `None` until the booking is first saved.
    pub id: Option<String>,

    pub vehicle: Option<String>,
    pub customer: Option<String>,
    pub rental_start: Option<NaiveDate>,
    pub rental_end: Option<NaiveDate>,

    /// Derived: calendar days between start and end.
    pub no_days: i64,

    pub rate_per_day: Money,
    pub additional_services: Vec<ServiceLine>,

    /// Derived: grand total.
    pub amount: Money,

    pub status: BookingStatus,
    pub docstatus: DocStatus,

    // Linked documents
    pub pre_inspection: Option<String>,
    pub post_inspection: Option<String>,
    pub sales_invoice: Option<String>,
    pub rental_contract: Option<String>,

    // Lifecycle timestamps
    pub submitted_at: Option<DateTime<Utc>>,
    pub pre_inspection_at: Option<DateTime<Utc>>,
    pub post_inspection_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,

    /// Set by the repository.
    pub created_at: Option<DateTime<Utc>>,
    /// Set by the repository.
    pub updated_at: Option<DateTime<Utc>>,
}

impl RentalBooking {
    /// A fresh draft with nothing selected.
    pub fn draft() -> Self {
        Self {
            id: None,
            vehicle: None,
            customer: None,
            rental_start: None,
            rental_end: None,
            no_days: 0,
            rate_per_day: Money::zero(),
            additional_services: Vec::new(),
            amount: Money::zero(),
            status: BookingStatus::Draft,
            docstatus: DocStatus::Draft,
            pre_inspection: None,
            post_inspection: None,
            sales_invoice: None,
            rental_contract: None,
            submitted_at: None,
            pre_inspection_at: None,
            post_inspection_at: None,
            completed_at: None,
            cancelled_at: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Field edits are accepted only on draft documents.
    #[inline]
    pub fn is_editable(&self) -> bool {
        self.docstatus == DocStatus::Draft
    }

    /// Both dates, if set.
    pub fn period(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.rental_start?, self.rental_end?))
    }
}

impl Default for RentalBooking {
    fn default() -> Self {
        Self::draft()
    }
}

// =============================================================================
// Read Models
// =============================================================================

/// The slice of a booking the overlap check needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingSummary {
    pub id: String,
    pub rental_start: NaiveDate,
    pub rental_end: NaiveDate,
    pub status: BookingStatus,
}

/// An entry in the vehicle-sync outbox.
///
/// Written in the same transaction as the booking change that requested it,
/// then applied to the vehicle record after commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleSyncEntry {
    pub id: String,
    /// Booking whose transition requested the write.
    pub booking_id: Option<String>,
    pub vehicle_id: String,
    pub status: VehicleStatus,
    /// Number of apply attempts.
    pub attempts: i64,
    /// Last error message if applying failed.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub applied_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_defaults() {
        assert_eq!(BookingStatus::default(), BookingStatus::Draft);
        assert_eq!(DocStatus::default(), DocStatus::Draft);
        assert_eq!(VehicleStatus::default(), VehicleStatus::Available);
    }

    #[test]
    fn test_booking_status_string_form_is_stable() {
        assert_eq!(
            serde_json::to_string(&BookingStatus::Confirmed).unwrap(),
            "\"Confirmed\""
        );
        assert_eq!(BookingStatus::Out.to_string(), "Out");
        let back: BookingStatus = serde_json::from_str("\"Returned\"").unwrap();
        assert_eq!(back, BookingStatus::Returned);
    }

    #[test]
    fn test_active_and_terminal() {
        assert!(!BookingStatus::Draft.is_active());
        assert!(BookingStatus::Confirmed.is_active());
        assert!(BookingStatus::Out.is_active());
        assert!(BookingStatus::Returned.is_active());
        assert!(!BookingStatus::Completed.is_active());
        assert!(!BookingStatus::Cancelled.is_active());

        assert!(BookingStatus::Completed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(!BookingStatus::Returned.is_terminal());
    }

    #[test]
    fn test_service_line_total() {
        let line = ServiceLine::new("GPS", 3, Money::from_cents(750));
        assert_eq!(line.total.cents(), 2250);
    }

    #[test]
    fn test_period_needs_both_dates() {
        let mut booking = RentalBooking::draft();
        booking.rental_start = NaiveDate::from_ymd_opt(2025, 6, 1);
        assert!(booking.period().is_none());
        booking.rental_end = NaiveDate::from_ymd_opt(2025, 6, 4);
        assert!(booking.period().is_some());
    }
}
