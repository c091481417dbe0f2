//! # Availability
//!
//! The overlap predicate behind double-booking prevention.
//!
//! ## Closed Intervals
//! ```text
//!   A:  [06-01 ─────────── 06-05]
//!   B:                     [06-05 ──── 06-07]
//!                             ▲
//!                  shared day → CONFLICT
//!
//!   conflict ⇔ s1 ≤ e2 ∧ s2 ≤ e1
//! ```
//!
//! Both ends are inclusive, so a vehicle returned on a date cannot go out
//! again the same date.
//!
//! This module only decides. Fetching the candidate bookings is the
//! repository's job and bounding that fetch in time is the engine's.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::BookingSummary;

// =============================================================================
// Date Range
// =============================================================================

/// An inclusive date interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub const fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Closed-interval overlap. Touching ranges overlap.
    #[inline]
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl From<&BookingSummary> for DateRange {
    fn from(summary: &BookingSummary) -> Self {
        DateRange::new(summary.rental_start, summary.rental_end)
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Result of an availability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityOutcome {
    pub available: bool,
    /// Ordered by start date, then id.
    pub conflicts: Vec<BookingSummary>,
}

impl AvailabilityOutcome {
    pub fn available() -> Self {
        Self {
            available: true,
            conflicts: Vec::new(),
        }
    }

    /// Ids of the conflicting bookings, in outcome order.
    pub fn conflict_ids(&self) -> Vec<String> {
        self.conflicts.iter().map(|c| c.id.clone()).collect()
    }
}

/// Checks a candidate range against existing bookings for one vehicle.
///
/// Inactive bookings (Draft, Cancelled, Completed) and the booking named by
/// `excluding` are skipped even if the caller passed them in.
///
/// ```rust
/// use chrono::NaiveDate;
/// use rental_core::availability::{find_conflicts, DateRange};
/// use rental_core::{BookingStatus, BookingSummary};
///
/// let d = |day| NaiveDate::from_ymd_opt(2025, 6, day).unwrap();
/// let existing = vec![BookingSummary {
///     id: "A".into(),
///     rental_start: d(1),
///     rental_end: d(5),
///     status: BookingStatus::Confirmed,
/// }];
///
/// let outcome = find_conflicts(DateRange::new(d(5), d(7)), &existing, None);
/// assert!(!outcome.available);
/// assert_eq!(outcome.conflict_ids(), vec!["A".to_string()]);
/// ```
pub fn find_conflicts(
    candidate: DateRange,
    existing: &[BookingSummary],
    excluding: Option<&str>,
) -> AvailabilityOutcome {
    let mut conflicts: Vec<BookingSummary> = existing
        .iter()
        .filter(|b| b.status.is_active())
        .filter(|b| Some(b.id.as_str()) != excluding)
        .filter(|b| DateRange::from(*b).overlaps(&candidate))
        .cloned()
        .collect();

    conflicts.sort_by(|a, b| {
        a.rental_start
            .cmp(&b.rental_start)
            .then_with(|| a.id.cmp(&b.id))
    });

    AvailabilityOutcome {
        available: conflicts.is_empty(),
        conflicts,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
