//! # rental-core: Pure Business Logic for Rental Bookings
//!
//! This crate is the **heart** of the rental engine. It contains the booking
//! rules as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Rental Engine Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 rental-engine (Orchestrator)                    │   │
//! │  │    field change ──► save ──► submit ──► inspection ──► invoice  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ rental-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────┐  ┌───────────┐  │   │
//! │  │   │  pricing  │  │validation │  │availability│  │ lifecycle │  │   │
//! │  │   │  days     │  │ dates     │  │  overlap   │  │  states   │  │   │
//! │  │   │  totals   │  │ services  │  │  outcome   │  │  events   │  │   │
//! │  │   └───────────┘  └───────────┘  └────────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                   rental-db (Database Layer)                    │   │
//! │  │        SQLite repositories, overlap triggers, sync outbox       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (RentalBooking, ServiceLine, statuses)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`pricing`] - Day counting and grand total recomputation
//! - [`validation`] - Date range and service line rules
//! - [`availability`] - Interval overlap detection
//! - [`lifecycle`] - Booking state machine and domain events
//! - [`commands`] - Command objects handed to downstream document services
//!
//! ## Example Usage
//!
//! ```rust
//! use rental_core::money::Money;
//! use rental_core::pricing::compute_total;
//! use rental_core::types::ServiceLine;
//!
//! let services = vec![ServiceLine::new("Child seat", 2, Money::from_cents(2000))];
//! let amount = compute_total(Some(3), Some(Money::from_cents(5000)), &services);
//!
//! assert_eq!(amount.cents(), 19000); // 3 × 50.00 + 2 × 20.00
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod availability;
pub mod commands;
pub mod error;
pub mod lifecycle;
pub mod money;
pub mod pricing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use availability::{AvailabilityOutcome, DateRange};
pub use error::{CoreError, CoreResult, TransitionError, ValidationError};
pub use lifecycle::{BookingEvent, DomainEvent, Transition, TransitionWarning};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Statuses that do not occupy a vehicle.
///
/// A booking in any of these states is ignored by the overlap check, both in
/// the UI-time query and in the commit-time constraint.
pub const INACTIVE_STATUSES: [BookingStatus; 3] = [
    BookingStatus::Draft,
    BookingStatus::Cancelled,
    BookingStatus::Completed,
];

/// Quantity assigned to a newly added service line that has none.
pub const DEFAULT_SERVICE_QUANTITY: i64 = 1;

/// Maximum length of a service line name.
pub const MAX_SERVICE_NAME_LEN: usize = 140;

/// Maximum units on one service line.
pub const MAX_SERVICE_QUANTITY: i64 = 999;

/// Maximum daily or per-unit rate, in cents (1,000,000.00).
pub const MAX_RATE_CENTS: i64 = 100_000_000;
