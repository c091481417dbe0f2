//! # Booking Lifecycle
//!
//! The state machine that owns `RentalBooking.status`.
//!
//! ## Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │            Submit            PreInspection       PostInspection         │
//! │   Draft ────────────► Confirmed ───────────► Out ──────────────► Returned
//! │     │  vehicle→Booked     │     vehicle→Rented  │  vehicle→Available    │
//! │     │                     │                     │                  │    │
//! │     │  PreInspection (auto-submit, then Out)    │    InvoiceSettled│    │
//! │     └──────────────────────────────────────────►│                  ▼    │
//! │                                                 │             Completed │
//! │   Cancel from Draft / Confirmed / Out / Returned                        │
//! │     ─────────────────────────────────────────────────────► Cancelled    │
//! │                             vehicle→Available (except from Draft)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Completed and Cancelled are absorbing. There are no backward arcs. A draft
//! never held its vehicle, so cancelling one leaves the vehicle alone.
//!
//! ## Side Effects
//! The machine never touches a vehicle. Each transition returns the vehicle
//! status writes it wants as [`DomainEvent`]s, and a dispatcher in the engine
//! applies them after the booking is persisted.
//!
//! ## Atomicity
//! [`transition`] works on a copy and only writes it back on success. A
//! rejected event leaves the booking exactly as it was, including for the
//! two-step Draft → Confirmed → Out path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;
use crate::types::{BookingStatus, DocStatus, RentalBooking, VehicleStatus};

// =============================================================================
// Events In
// =============================================================================

/// Something that happened to a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BookingEvent {
    /// The user submitted the booking.
    Submit,

    /// Inspection service: pre-rental inspection submitted.
    PreInspectionCompleted {
        inspection_id: String,
        at: DateTime<Utc>,
    },

    /// Inspection service: post-rental inspection submitted.
    PostInspectionCompleted {
        inspection_id: String,
        at: DateTime<Utc>,
    },

    /// Billing service: sales invoice submitted and fully paid.
    InvoiceSettled { invoice_id: String },

    /// The user cancelled the booking.
    Cancel,
}

impl BookingEvent {
    /// Name used in errors and the status history.
    pub const fn name(&self) -> &'static str {
        match self {
            BookingEvent::Submit => "Submit",
            BookingEvent::PreInspectionCompleted { .. } => "PreInspectionCompleted",
            BookingEvent::PostInspectionCompleted { .. } => "PostInspectionCompleted",
            BookingEvent::InvoiceSettled { .. } => "InvoiceSettled",
            BookingEvent::Cancel => "Cancel",
        }
    }
}

// =============================================================================
// Events Out
// =============================================================================

/// A side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    VehicleStatusRequested {
        booking_id: Option<String>,
        vehicle_id: String,
        status: VehicleStatus,
    },
}

/// A side effect that was skipped. The transition still happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransitionWarning {
    /// The side effect needed a linked record the booking does not have.
    MissingDependency {
        dependency: &'static str,
        wanted: VehicleStatus,
    },
}

/// What an accepted event did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub event: &'static str,
    pub from: BookingStatus,
    pub to: BookingStatus,
    /// Every status entered, in order. `[Confirmed, Out]` for a pre-inspection
    /// on a draft.
    pub steps: Vec<BookingStatus>,
    pub effects: Vec<DomainEvent>,
    pub warnings: Vec<TransitionWarning>,
}

impl Transition {
    fn begin(event: &BookingEvent, from: BookingStatus) -> Self {
        Self {
            event: event.name(),
            from,
            to: from,
            steps: Vec::new(),
            effects: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Status pairs for each step: `(from, to)`.
    pub fn step_pairs(&self) -> Vec<(BookingStatus, BookingStatus)> {
        let mut prev = self.from;
        self.steps
            .iter()
            .map(|&to| {
                let pair = (prev, to);
                prev = to;
                pair
            })
            .collect()
    }
}

// =============================================================================
// State Machine
// =============================================================================

/// Applies `event` to `booking`.
///
/// On success the booking carries its new status, docstatus, linked document
/// references and timestamps. On error it is untouched.
///
/// ```rust
/// use chrono::Utc;
/// use rental_core::lifecycle::{transition, BookingEvent};
/// use rental_core::{BookingStatus, RentalBooking};
///
/// let mut booking = RentalBooking::draft();
/// booking.vehicle = Some("KA-01-1234".into());
///
/// let t = transition(&mut booking, &BookingEvent::Submit, Utc::now()).unwrap();
/// assert_eq!(t.to, BookingStatus::Confirmed);
/// assert_eq!(t.effects.len(), 1);
///
/// // Submitting twice is illegal
/// assert!(transition(&mut booking, &BookingEvent::Submit, Utc::now()).is_err());
/// ```
pub fn transition(
    booking: &mut RentalBooking,
    event: &BookingEvent,
    now: DateTime<Utc>,
) -> Result<Transition, TransitionError> {
    use BookingStatus::*;

    let from = booking.status;
    let mut next = booking.clone();
    let mut t = Transition::begin(event, from);

    let submittable = next.docstatus == DocStatus::Draft;

    match (from, event) {
        (Draft, BookingEvent::Submit) if submittable => {
            confirm(&mut next, now, &mut t);
        }
        (Draft, BookingEvent::PreInspectionCompleted { inspection_id, at }) if submittable => {
            confirm(&mut next, now, &mut t);
            hand_over(&mut next, inspection_id, *at, &mut t);
        }
        (Confirmed, BookingEvent::PreInspectionCompleted { inspection_id, at }) => {
            hand_over(&mut next, inspection_id, *at, &mut t);
        }
        (Out, BookingEvent::PostInspectionCompleted { inspection_id, at }) => {
            next.post_inspection = Some(inspection_id.clone());
            next.post_inspection_at = Some(*at);
            enter(&mut next, Returned, &mut t);
            request_vehicle(&next, VehicleStatus::Available, &mut t);
        }
        (Returned, BookingEvent::InvoiceSettled { invoice_id }) => {
            next.sales_invoice = Some(invoice_id.clone());
            next.completed_at = Some(now);
            enter(&mut next, Completed, &mut t);
        }
        (status, BookingEvent::Cancel) if !status.is_terminal() => {
            next.docstatus = DocStatus::Cancelled;
            next.cancelled_at = Some(now);
            enter(&mut next, Cancelled, &mut t);
            if status != Draft {
                request_vehicle(&next, VehicleStatus::Available, &mut t);
            }
        }
        _ => {
            return Err(TransitionError::IllegalTransition {
                from,
                event: event.name(),
            })
        }
    }

    t.to = next.status;
    *booking = next;
    Ok(t)
}

/// Draft → Confirmed with submit bookkeeping.
fn confirm(next: &mut RentalBooking, now: DateTime<Utc>, t: &mut Transition) {
    next.docstatus = DocStatus::Submitted;
    next.submitted_at = Some(now);
    enter(next, BookingStatus::Confirmed, t);
    request_vehicle(next, VehicleStatus::Booked, t);
}

/// Confirmed → Out.
fn hand_over(
    next: &mut RentalBooking,
    inspection_id: &str,
    at: DateTime<Utc>,
    t: &mut Transition,
) {
    next.pre_inspection = Some(inspection_id.to_string());
    next.pre_inspection_at = Some(at);
    enter(next, BookingStatus::Out, t);
    request_vehicle(next, VehicleStatus::Rented, t);
}

fn enter(next: &mut RentalBooking, status: BookingStatus, t: &mut Transition) {
    next.status = status;
    t.steps.push(status);
}

fn request_vehicle(next: &RentalBooking, status: VehicleStatus, t: &mut Transition) {
    match &next.vehicle {
        Some(vehicle_id) => t.effects.push(DomainEvent::VehicleStatusRequested {
            booking_id: next.id.clone(),
            vehicle_id: vehicle_id.clone(),
            status,
        }),
        None => t.warnings.push(TransitionWarning::MissingDependency {
            dependency: "vehicle",
            wanted: status,
        }),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
