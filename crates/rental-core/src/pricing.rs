//! # Pricing Calculator
//!
//! Day counting and grand-total computation for bookings.
//!
//! ## Formula
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   no_days = rental_end − rental_start          (0 if either missing)   │
//! │                                                                         │
//! │   line.total = line.rate × line.quantity                                │
//! │                                                                         │
//! │   amount = no_days × rate_per_day + Σ line.total                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is integer arithmetic on [`Money`]. Running [`recompute`]
//! twice gives the same booking as running it once.

use chrono::NaiveDate;

use crate::money::Money;
use crate::types::{RentalBooking, ServiceLine};

/// Calendar days between two dates.
///
/// Returns 0 when either date is missing or the end is not after the start.
///
/// ```rust
/// use chrono::NaiveDate;
/// use rental_core::pricing::rental_days;
///
/// let start = NaiveDate::from_ymd_opt(2025, 6, 1);
/// let end = NaiveDate::from_ymd_opt(2025, 6, 4);
/// assert_eq!(rental_days(start, end), 3);
/// assert_eq!(rental_days(start, None), 0);
/// ```
pub fn rental_days(start: Option<NaiveDate>, end: Option<NaiveDate>) -> i64 {
    match (start, end) {
        (Some(start), Some(end)) => (end - start).num_days().max(0),
        _ => 0,
    }
}

/// `rate × quantity` for one service line.
#[inline]
pub fn line_total(quantity: i64, rate: Money) -> Money {
    rate.multiply_quantity(quantity)
}

/// Grand total for a booking. Missing inputs count as zero.
///
/// Line totals are computed from each line's own rate and quantity, so a
/// stale `total` field on a line does not leak into the result.
pub fn compute_total(
    no_days: Option<i64>,
    rate_per_day: Option<Money>,
    service_lines: &[ServiceLine],
) -> Money {
    let days = no_days.unwrap_or(0);
    let rate = rate_per_day.unwrap_or_else(Money::zero);

    let services: Money = service_lines
        .iter()
        .map(|line| line_total(line.quantity, line.rate))
        .sum();

    rate.multiply_quantity(days) + services
}

/// Refreshes every derived field on the booking.
pub fn recompute(booking: &mut RentalBooking) {
    booking.no_days = rental_days(booking.rental_start, booking.rental_end);

    for line in &mut booking.additional_services {
        line.recompute_total();
    }

    booking.amount = compute_total(
        Some(booking.no_days),
        Some(booking.rate_per_day),
        &booking.additional_services,
    );
}

// =============================================================================
// Unit Tests
// =============================================================================
