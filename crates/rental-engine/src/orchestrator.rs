//! # Booking Lifecycle Orchestrator
//!
//! Entry point for everything that happens to a booking: field edits,
//! save, lifecycle events and the commands handed to the inspection and
//! contract collaborators.
//!
//! ## Field Edit Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  apply_change(booking, FieldChange)                                     │
//! │                                                                         │
//! │  Date / vehicle edit                                                   │
//! │    1. vehicle edit: get_rate (cleared vehicle → 0)                     │
//! │    2. validate_dates ── error ──► clear offending field, report        │
//! │    3. dates + vehicle set: AvailabilityChecker                         │
//! │         Unavailable ──► clear vehicle, rate = 0                        │
//! │         Unknown     ──► keep selection, report                         │
//! │                                                                         │
//! │  Service edit                                                          │
//! │    validate_service_line ── error ──► line untouched, report          │
//! │                                                                         │
//! │  Always: pricing::recompute                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifecycle Pipeline
//! ```text
//!   transition(copy, event)          rental-core, pure
//!        │  IllegalTransition ──► Err, booking untouched
//!        ▼
//!   commit_transition(copy)          one transaction, overlap re-checked
//!        │  Overlap ──► Err, booking untouched
//!        ▼
//!   *booking = copy
//!        │
//!        ▼
//!   dispatcher.dispatch(queued)      best effort, failures become warnings
//! ```

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use rental_core::commands::{self, CreateContractCommand, CreateInspectionCommand};
use rental_core::lifecycle::transition;
use rental_core::pricing::recompute;
use rental_core::validation::{
    validate_dates, validate_rate, validate_service_input, validate_service_line,
};
use rental_core::{
    BookingEvent, BookingStatus, CoreError, InspectionType, Money, RentalBooking, ServiceLine,
    Transition, TransitionWarning, ValidationError, VehicleStatus, DEFAULT_SERVICE_QUANTITY,
};
use rental_db::Database;

use crate::availability::{AvailabilityChecker, AvailabilityVerdict};
use crate::config::EngineConfig;
use crate::dispatcher::{SyncFailure, VehicleSyncDispatcher};
use crate::error::{EngineResult, StoreError};
use crate::ports::{BookingStore, Clock, EffectOutbox, SystemClock, VehicleStore};

// =============================================================================
// Inputs and Outcomes
// =============================================================================

/// One edit to a draft booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldChange {
    RentalStart(Option<NaiveDate>),
    RentalEnd(Option<NaiveDate>),
    Vehicle(Option<String>),
    Customer(Option<String>),
    RatePerDay(Money),
    AddService {
        service_name: String,
        /// `None` defaults to one.
        quantity: Option<i64>,
        rate: Money,
    },
    UpdateService {
        index: usize,
        quantity: Option<i64>,
        rate: Option<Money>,
    },
    RemoveService {
        index: usize,
    },
}

/// What a field edit did beyond the edit itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeOutcome {
    /// The rule the edit broke. The offending value was cleared or not
    /// applied.
    pub validation_error: Option<ValidationError>,
    /// Present when both dates and a vehicle were set after the edit.
    pub availability: Option<AvailabilityVerdict>,
    /// Fields the engine cleared.
    pub cleared: Vec<&'static str>,
    pub amount: Money,
}

impl ChangeOutcome {
    fn new() -> Self {
        ChangeOutcome {
            validation_error: None,
            availability: None,
            cleared: Vec::new(),
            amount: Money::zero(),
        }
    }
}

/// A side effect that did not happen. The booking change stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleWarning {
    MissingDependency {
        dependency: &'static str,
        wanted: VehicleStatus,
    },
    VehicleSyncFailed(SyncFailure),
}

impl From<TransitionWarning> for LifecycleWarning {
    fn from(w: TransitionWarning) -> Self {
        match w {
            TransitionWarning::MissingDependency { dependency, wanted } => {
                LifecycleWarning::MissingDependency { dependency, wanted }
            }
        }
    }
}

/// Result of an accepted lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleOutcome {
    pub booking_id: String,
    pub transition: Transition,
    pub warnings: Vec<LifecycleWarning>,
}

// =============================================================================
// Orchestrator
// =============================================================================

#[derive(Clone)]
pub struct BookingOrchestrator {
    bookings: Arc<dyn BookingStore>,
    vehicles: Arc<dyn VehicleStore>,
    availability: AvailabilityChecker,
    dispatcher: VehicleSyncDispatcher,
    clock: Arc<dyn Clock>,
}

impl BookingOrchestrator {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        vehicles: Arc<dyn VehicleStore>,
        outbox: Arc<dyn EffectOutbox>,
        clock: Arc<dyn Clock>,
        config: &EngineConfig,
    ) -> Self {
        let availability =
            AvailabilityChecker::new(bookings.clone(), config.availability.check_timeout());
        let dispatcher =
            VehicleSyncDispatcher::new(vehicles.clone(), outbox, config.vehicle_sync.clone());

        BookingOrchestrator {
            bookings,
            vehicles,
            availability,
            dispatcher,
            clock,
        }
    }

    /// Every port backed by one database, wall clock.
    pub fn with_database(db: Database, config: &EngineConfig) -> Self {
        let db = Arc::new(db);
        Self::new(
            db.clone(),
            db.clone(),
            db,
            Arc::new(SystemClock),
            config,
        )
    }

    pub fn availability(&self) -> &AvailabilityChecker {
        &self.availability
    }

    pub fn dispatcher(&self) -> &VehicleSyncDispatcher {
        &self.dispatcher
    }

    // =========================================================================
    // Field Edits
    // =========================================================================

    /// Applies one edit to a draft booking.
    ///
    /// Rule violations are reported in the outcome, not as errors.
    ///
    /// ## Errors
    /// - `NotEditable` unless the booking is a draft
    /// - `ServiceLineNotFound` for a bad index
    /// - `Store` if the vehicle rate could not be read; the booking is
    ///   untouched then
    pub async fn apply_change(
        &self,
        booking: &mut RentalBooking,
        change: FieldChange,
    ) -> EngineResult<ChangeOutcome> {
        ensure_editable(booking)?;

        let mut outcome = ChangeOutcome::new();

        match change {
            FieldChange::RentalStart(date) => {
                booking.rental_start = date;
                self.revalidate_selection(booking, Edited::Start, &mut outcome)
                    .await;
            }
            FieldChange::RentalEnd(date) => {
                booking.rental_end = date;
                self.revalidate_selection(booking, Edited::End, &mut outcome)
                    .await;
            }
            FieldChange::Vehicle(vehicle) => {
                let rate = match &vehicle {
                    Some(id) => self.vehicles.get_rate(id).await?,
                    None => Money::zero(),
                };
                booking.vehicle = vehicle;
                booking.rate_per_day = rate;
                self.revalidate_selection(booking, Edited::Vehicle, &mut outcome)
                    .await;
            }
            FieldChange::Customer(customer) => {
                booking.customer = customer;
            }
            FieldChange::RatePerDay(rate) => match validate_rate("rate_per_day", rate) {
                Ok(()) => booking.rate_per_day = rate,
                Err(e) => outcome.validation_error = Some(e),
            },
            FieldChange::AddService {
                service_name,
                quantity,
                rate,
            } => {
                let quantity = quantity.unwrap_or(DEFAULT_SERVICE_QUANTITY);
                match validate_service_input(&service_name, quantity, rate) {
                    Ok(()) => booking
                        .additional_services
                        .push(ServiceLine::new(service_name, quantity, rate)),
                    Err(e) => outcome.validation_error = Some(e),
                }
            }
            FieldChange::UpdateService {
                index,
                quantity,
                rate,
            } => {
                let current = booking
                    .additional_services
                    .get(index)
                    .ok_or(CoreError::ServiceLineNotFound { index })?;

                let mut line = current.clone();
                if let Some(q) = quantity {
                    line.quantity = q;
                }
                if let Some(r) = rate {
                    line.rate = r;
                }

                match validate_service_line(&line) {
                    Ok(()) => {
                        line.recompute_total();
                        booking.additional_services[index] = line;
                    }
                    Err(e) => outcome.validation_error = Some(e),
                }
            }
            FieldChange::RemoveService { index } => {
                if index >= booking.additional_services.len() {
                    return Err(CoreError::ServiceLineNotFound { index }.into());
                }
                booking.additional_services.remove(index);
            }
        }

        recompute(booking);
        outcome.amount = booking.amount;
        Ok(outcome)
    }

    /// Date validation followed by the advisory availability check.
    async fn revalidate_selection(
        &self,
        booking: &mut RentalBooking,
        edited: Edited,
        outcome: &mut ChangeOutcome,
    ) {
        let today = self.clock.today();

        if let Err(e) = validate_dates(booking.rental_start, booking.rental_end, today) {
            let clear_start = match e {
                ValidationError::PastStartDate => true,
                ValidationError::PastEndDate => false,
                // After a vehicle edit the end date goes
                _ => matches!(edited, Edited::Start),
            };
            let field = if clear_start {
                booking.rental_start = None;
                "rental_start"
            } else {
                booking.rental_end = None;
                "rental_end"
            };

            debug!(booking_id = ?booking.id, field, error = %e, "Cleared invalid date");
            outcome.cleared.push(field);
            outcome.validation_error = Some(e);
            return;
        }

        let (Some(vehicle_id), Some((start, end))) = (booking.vehicle.clone(), booking.period())
        else {
            return;
        };

        let verdict = self
            .availability
            .verdict(&vehicle_id, start, end, booking.id.as_deref())
            .await;

        if let AvailabilityVerdict::Unavailable(conflicts) = &verdict {
            info!(
                booking_id = ?booking.id,
                vehicle_id = %vehicle_id,
                conflicts = conflicts.len(),
                "Vehicle unavailable for period, clearing selection"
            );
            booking.vehicle = None;
            booking.rate_per_day = Money::zero();
            outcome.cleared.push("vehicle");
        }

        outcome.availability = Some(verdict);
    }

    // =========================================================================
    // Save
    // =========================================================================

    /// Persists a draft after recomputing and validating it.
    pub async fn save(&self, booking: &mut RentalBooking) -> EngineResult<()> {
        ensure_editable(booking)?;

        let mut candidate = booking.clone();
        recompute(&mut candidate);
        validate_dates(
            candidate.rental_start,
            candidate.rental_end,
            self.clock.today(),
        )?;

        self.bookings.save(&mut candidate).await?;
        *booking = candidate;

        debug!(booking_id = ?booking.id, amount = %booking.amount, "Draft saved");
        Ok(())
    }

    // =========================================================================
    // Lifecycle Events
    // =========================================================================

    /// Draft → Confirmed.
    ///
    /// Dates are required; the commit rejects the submit if another active
    /// booking holds the vehicle for any of those days.
    pub async fn submit(&self, booking: &mut RentalBooking) -> EngineResult<LifecycleOutcome> {
        if booking.rental_start.is_none() {
            return Err(CoreError::MissingField {
                field: "rental_start",
            }
            .into());
        }
        if booking.rental_end.is_none() {
            return Err(CoreError::MissingField { field: "rental_end" }.into());
        }

        validate_dates(booking.rental_start, booking.rental_end, self.clock.today())?;

        self.apply_event(booking, BookingEvent::Submit).await
    }

    /// Any non-terminal status → Cancelled. A submitted booking releases its
    /// vehicle on a best-effort basis; a draft never held it.
    pub async fn cancel(&self, booking: &mut RentalBooking) -> EngineResult<LifecycleOutcome> {
        self.apply_event(booking, BookingEvent::Cancel).await
    }

    /// Inspection service: a pre- or post-rental inspection was submitted.
    pub async fn handle_inspection(
        &self,
        booking_id: &str,
        inspection_type: InspectionType,
        inspection_id: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<(RentalBooking, LifecycleOutcome)> {
        let inspection_id = inspection_id.to_string();
        let event = match inspection_type {
            InspectionType::PreInspection => {
                BookingEvent::PreInspectionCompleted { inspection_id, at }
            }
            InspectionType::PostInspection => {
                BookingEvent::PostInspectionCompleted { inspection_id, at }
            }
        };

        self.handle_event(booking_id, event).await
    }

    /// Billing service: the sales invoice is submitted and fully paid.
    pub async fn handle_invoice_settled(
        &self,
        booking_id: &str,
        invoice_id: &str,
    ) -> EngineResult<(RentalBooking, LifecycleOutcome)> {
        let event = BookingEvent::InvoiceSettled {
            invoice_id: invoice_id.to_string(),
        };
        self.handle_event(booking_id, event).await
    }

    /// Loads a stored booking and applies `event` to it.
    pub async fn handle_event(
        &self,
        booking_id: &str,
        event: BookingEvent,
    ) -> EngineResult<(RentalBooking, LifecycleOutcome)> {
        let mut booking = self.load(booking_id).await?;
        let outcome = self.apply_event(&mut booking, event).await?;
        Ok((booking, outcome))
    }

    /// Transition, commit, dispatch.
    ///
    /// `booking` is only updated once the commit succeeded.
    pub async fn apply_event(
        &self,
        booking: &mut RentalBooking,
        event: BookingEvent,
    ) -> EngineResult<LifecycleOutcome> {
        let mut candidate = booking.clone();
        if candidate.status == BookingStatus::Draft {
            recompute(&mut candidate);
        }

        let t = transition(&mut candidate, &event, self.clock.now())?;

        let queued = self
            .bookings
            .commit_transition(&mut candidate, &t)
            .await
            .inspect_err(|e| {
                if let StoreError::Overlap { conflicts } = e {
                    warn!(
                        booking_id = ?booking.id,
                        vehicle_id = ?booking.vehicle,
                        conflicts = conflicts.len(),
                        "Transition rejected: vehicle already booked"
                    );
                }
            })?;

        *booking = candidate;
        let booking_id = booking.id.clone().unwrap_or_default();

        info!(
            booking_id = %booking_id,
            event = t.event,
            from = %t.from,
            to = %t.to,
            "Booking transition applied"
        );

        let mut warnings: Vec<LifecycleWarning> =
            t.warnings.iter().cloned().map(LifecycleWarning::from).collect();

        for w in &warnings {
            warn!(booking_id = %booking_id, warning = ?w, "Side effect skipped");
        }

        let report = self.dispatcher.dispatch(&queued).await;
        warnings.extend(
            report
                .failures
                .into_iter()
                .map(LifecycleWarning::VehicleSyncFailed),
        );

        Ok(LifecycleOutcome {
            booking_id,
            transition: t,
            warnings,
        })
    }

    // =========================================================================
    // Downstream Documents
    // =========================================================================

    /// Pre-filled data for a new inspection.
    pub async fn prepare_inspection(
        &self,
        booking_id: &str,
        inspection_type: InspectionType,
        date: NaiveDate,
    ) -> EngineResult<CreateInspectionCommand> {
        let booking = self.load(booking_id).await?;
        Ok(CreateInspectionCommand::for_booking(
            &booking,
            inspection_type,
            date,
        )?)
    }

    /// Pre-filled data for a new rental contract.
    ///
    /// ## Errors
    /// - `NotSubmitted` unless the booking was submitted
    /// - `ContractAlreadyLinked` if a contract already exists
    pub async fn prepare_contract(&self, booking_id: &str) -> EngineResult<CreateContractCommand> {
        let booking = self.load(booking_id).await?;
        Ok(CreateContractCommand::for_booking(&booking)?)
    }

    /// Contract service: a contract for this booking was submitted.
    pub async fn link_contract(
        &self,
        booking_id: &str,
        contract_id: &str,
    ) -> EngineResult<RentalBooking> {
        let mut booking = self.load(booking_id).await?;
        commands::link_contract(&mut booking, contract_id);
        self.bookings.save(&mut booking).await?;

        info!(booking_id = %booking_id, contract_id = %contract_id, "Contract linked");
        Ok(booking)
    }

    /// Contract service: a contract was cancelled.
    ///
    /// Returns whether the booking still pointed at it.
    pub async fn unlink_contract(&self, booking_id: &str, contract_id: &str) -> EngineResult<bool> {
        let mut booking = self.load(booking_id).await?;
        if !commands::unlink_contract(&mut booking, contract_id) {
            return Ok(false);
        }

        self.bookings.save(&mut booking).await?;
        info!(booking_id = %booking_id, contract_id = %contract_id, "Contract unlinked");
        Ok(true)
    }

    async fn load(&self, booking_id: &str) -> EngineResult<RentalBooking> {
        self.bookings
            .get(booking_id)
            .await?
            .ok_or_else(|| {
                StoreError::NotFound {
                    entity: "Rental Booking".into(),
                    id: booking_id.into(),
                }
                .into()
            })
    }
}

#[derive(Debug, Clone, Copy)]
enum Edited {
    Start,
    End,
    Vehicle,
}

fn ensure_editable(booking: &RentalBooking) -> Result<(), CoreError> {
    if booking.is_editable() {
        Ok(())
    } else {
        Err(CoreError::NotEditable {
            docstatus: booking.docstatus,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, StoreError};
    use crate::ports::FixedClock;
    use crate::testing::{d, fast_sync_settings, FailingBookings, FlakyVehicles};
    use rental_core::{DocStatus, TransitionError, Vehicle};
    use rental_db::DbConfig;

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.vehicle_sync = fast_sync_settings();
        config
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock::on(
            NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
        ))
    }

    async fn setup() -> (Database, BookingOrchestrator) {
        setup_with(DbConfig::in_memory()).await
    }

    /// Fresh file-backed database under the temp dir.
    fn test_db_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("rental_test_orchestrator");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
        path
    }

    async fn setup_with(db_config: DbConfig) -> (Database, BookingOrchestrator) {
        let db = Database::new(db_config).await.unwrap();
        for (id, cents) in [("V-1", 5000), ("V-2", 4500)] {
            db.vehicles()
                .upsert(&Vehicle {
                    id: id.into(),
                    rate_per_day: Money::from_cents(cents),
                    status: VehicleStatus::Available,
                })
                .await
                .unwrap();
        }

        let db_arc = Arc::new(db.clone());
        let orch = BookingOrchestrator::new(
            db_arc.clone(),
            db_arc.clone(),
            db_arc,
            clock(),
            &config(),
        );
        (db, orch)
    }

    /// A saved draft on `vehicle` for 2025-06-`start`..`end`.
    async fn draft(
        orch: &BookingOrchestrator,
        vehicle: &str,
        start: u32,
        end: u32,
    ) -> RentalBooking {
        let mut b = RentalBooking::draft();
        b.customer = Some("CUST-1".into());
        orch.apply_change(&mut b, FieldChange::RentalStart(Some(d(start))))
            .await
            .unwrap();
        orch.apply_change(&mut b, FieldChange::RentalEnd(Some(d(end))))
            .await
            .unwrap();
        let outcome = orch
            .apply_change(&mut b, FieldChange::Vehicle(Some(vehicle.into())))
            .await
            .unwrap();
        assert_eq!(outcome.availability, Some(AvailabilityVerdict::Available));
        orch.save(&mut b).await.unwrap();
        b
    }

    async fn vehicle_status(db: &Database, id: &str) -> VehicleStatus {
        db.vehicles().get(id).await.unwrap().unwrap().status
    }

    // -------------------------------------------------------------------------
    // Field edits
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_amount_with_service_line() {
        let (_db, orch) = setup().await;
        let mut b = draft(&orch, "V-1", 1, 4).await;
        assert_eq!(b.no_days, 3);
        assert_eq!(b.rate_per_day, Money::from_cents(5000));

        let outcome = orch
            .apply_change(
                &mut b,
                FieldChange::AddService {
                    service_name: "Child seat".into(),
                    quantity: Some(2),
                    rate: Money::from_cents(2000),
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.amount, Money::from_cents(19000));
        assert_eq!(b.additional_services[0].total, Money::from_cents(4000));
    }

    #[tokio::test]
    async fn test_service_line_edits() {
        let (_db, orch) = setup().await;
        let mut b = draft(&orch, "V-1", 1, 3).await;

        orch.apply_change(
            &mut b,
            FieldChange::AddService {
                service_name: "GPS".into(),
                quantity: None,
                rate: Money::from_cents(700),
            },
        )
        .await
        .unwrap();
        assert_eq!(b.additional_services[0].quantity, 1);

        let outcome = orch
            .apply_change(
                &mut b,
                FieldChange::UpdateService {
                    index: 0,
                    quantity: Some(3),
                    rate: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.amount, Money::from_cents(2 * 5000 + 3 * 700));

        let outcome = orch
            .apply_change(
                &mut b,
                FieldChange::UpdateService {
                    index: 0,
                    quantity: Some(-1),
                    rate: None,
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            outcome.validation_error,
            Some(ValidationError::Negative { .. })
        ));
        assert_eq!(b.additional_services[0].quantity, 3);

        let outcome = orch
            .apply_change(
                &mut b,
                FieldChange::AddService {
                    service_name: "  ".into(),
                    quantity: Some(1),
                    rate: Money::from_cents(100),
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            outcome.validation_error,
            Some(ValidationError::Required { .. })
        ));
        assert_eq!(b.additional_services.len(), 1);

        let outcome = orch
            .apply_change(&mut b, FieldChange::RemoveService { index: 0 })
            .await
            .unwrap();
        assert_eq!(outcome.amount, Money::from_cents(10000));

        assert!(matches!(
            orch.apply_change(&mut b, FieldChange::RemoveService { index: 0 })
                .await,
            Err(EngineError::Core(CoreError::ServiceLineNotFound { index: 0 }))
        ));
    }

    #[tokio::test]
    async fn test_oversized_service_inputs_are_rejected() {
        let (_db, orch) = setup().await;
        let mut b = draft(&orch, "V-1", 1, 3).await;

        let outcome = orch
            .apply_change(
                &mut b,
                FieldChange::AddService {
                    service_name: "GPS".into(),
                    quantity: Some(i64::MAX / 10),
                    rate: Money::from_cents(500),
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            outcome.validation_error,
            Some(ValidationError::OutOfRange { .. })
        ));
        assert!(b.additional_services.is_empty());
        assert_eq!(outcome.amount, Money::from_cents(10000));

        orch.apply_change(
            &mut b,
            FieldChange::AddService {
                service_name: "GPS".into(),
                quantity: Some(1),
                rate: Money::from_cents(500),
            },
        )
        .await
        .unwrap();
        let outcome = orch
            .apply_change(
                &mut b,
                FieldChange::UpdateService {
                    index: 0,
                    quantity: None,
                    rate: Some(Money::from_cents(i64::MAX)),
                },
            )
            .await
            .unwrap();
        assert!(matches!(
            outcome.validation_error,
            Some(ValidationError::OutOfRange { .. })
        ));
        assert_eq!(b.additional_services[0].rate, Money::from_cents(500));
    }

    #[tokio::test]
    async fn test_past_start_is_cleared() {
        let (_db, orch) = setup().await;
        let mut b = RentalBooking::draft();

        let outcome = orch
            .apply_change(
                &mut b,
                FieldChange::RentalStart(NaiveDate::from_ymd_opt(2025, 4, 20)),
            )
            .await
            .unwrap();

        assert_eq!(outcome.validation_error, Some(ValidationError::PastStartDate));
        assert_eq!(outcome.cleared, vec!["rental_start"]);
        assert!(b.rental_start.is_none());
    }

    #[tokio::test]
    async fn test_end_before_start_clears_edited_field() {
        let (_db, orch) = setup().await;
        let mut b = RentalBooking::draft();
        b.rental_start = Some(d(5));

        let outcome = orch
            .apply_change(&mut b, FieldChange::RentalEnd(Some(d(5))))
            .await
            .unwrap();
        assert_eq!(
            outcome.validation_error,
            Some(ValidationError::EndBeforeOrEqualStart)
        );
        assert_eq!(b.rental_start, Some(d(5)));
        assert!(b.rental_end.is_none());

        b.rental_end = Some(d(8));
        let outcome = orch
            .apply_change(&mut b, FieldChange::RentalStart(Some(d(9))))
            .await
            .unwrap();
        assert_eq!(outcome.cleared, vec!["rental_start"]);
        assert_eq!(b.rental_end, Some(d(8)));
        assert_eq!(b.no_days, 0);
    }

    #[tokio::test]
    async fn test_touching_booking_clears_vehicle() {
        let (_db, orch) = setup().await;
        let mut a = draft(&orch, "V-1", 1, 5).await;
        orch.submit(&mut a).await.unwrap();

        let mut b = RentalBooking::draft();
        orch.apply_change(&mut b, FieldChange::RentalStart(Some(d(5))))
            .await
            .unwrap();
        orch.apply_change(&mut b, FieldChange::RentalEnd(Some(d(7))))
            .await
            .unwrap();
        let outcome = orch
            .apply_change(&mut b, FieldChange::Vehicle(Some("V-1".into())))
            .await
            .unwrap();

        match outcome.availability {
            Some(AvailabilityVerdict::Unavailable(conflicts)) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(Some(conflicts[0].id.clone()), a.id);
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        assert!(b.vehicle.is_none());
        assert_eq!(b.rate_per_day, Money::zero());
        assert_eq!(outcome.amount, Money::zero());

        // Another vehicle is free
        let outcome = orch
            .apply_change(&mut b, FieldChange::Vehicle(Some("V-2".into())))
            .await
            .unwrap();
        assert_eq!(outcome.availability, Some(AvailabilityVerdict::Available));
        assert_eq!(outcome.amount, Money::from_cents(2 * 4500));
    }

    #[tokio::test]
    async fn test_unknown_availability_keeps_selection() {
        let (db, _) = setup().await;
        let db_arc = Arc::new(db.clone());
        let orch = BookingOrchestrator::new(
            Arc::new(FailingBookings),
            db_arc.clone(),
            db_arc,
            clock(),
            &config(),
        );

        let mut b = RentalBooking::draft();
        b.rental_start = Some(d(1));
        b.rental_end = Some(d(3));
        let outcome = orch
            .apply_change(&mut b, FieldChange::Vehicle(Some("V-1".into())))
            .await
            .unwrap();

        assert!(outcome.availability.unwrap().is_unknown());
        assert_eq!(b.vehicle.as_deref(), Some("V-1"));
        assert_eq!(b.rate_per_day, Money::from_cents(5000));
        assert!(outcome.cleared.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_vehicle_leaves_booking_untouched() {
        let (_db, orch) = setup().await;
        let mut b = draft(&orch, "V-1", 1, 3).await;
        let before = b.clone();

        let result = orch
            .apply_change(&mut b, FieldChange::Vehicle(Some("NOPE".into())))
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Store(StoreError::NotFound { .. }))
        ));
        assert_eq!(b, before);
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_submit_books_vehicle() {
        let (db, orch) = setup().await;
        let mut b = draft(&orch, "V-1", 1, 4).await;

        let outcome = orch.submit(&mut b).await.unwrap();

        assert!(outcome.warnings.is_empty());
        assert_eq!(b.status, BookingStatus::Confirmed);
        assert_eq!(b.docstatus, DocStatus::Submitted);
        assert_eq!(vehicle_status(&db, "V-1").await, VehicleStatus::Booked);

        // Submitted bookings are read-only
        assert!(matches!(
            orch.save(&mut b).await,
            Err(EngineError::Core(CoreError::NotEditable { .. }))
        ));
        assert!(matches!(
            orch.apply_change(&mut b, FieldChange::RatePerDay(Money::zero()))
                .await,
            Err(EngineError::Core(CoreError::NotEditable { .. }))
        ));
    }

    #[tokio::test]
    async fn test_pre_inspection_on_draft_goes_out() {
        let (db, orch) = setup().await;
        let b = draft(&orch, "V-1", 1, 4).await;
        let id = b.id.clone().unwrap();

        let (booking, outcome) = orch
            .handle_inspection(&id, InspectionType::PreInspection, "INSP-1", Utc::now())
            .await
            .unwrap();

        assert_eq!(booking.status, BookingStatus::Out);
        assert_eq!(booking.docstatus, DocStatus::Submitted);
        assert_eq!(booking.pre_inspection.as_deref(), Some("INSP-1"));
        assert_eq!(
            outcome.transition.steps,
            vec![BookingStatus::Confirmed, BookingStatus::Out]
        );

        let history = db.bookings().status_history(&id).await.unwrap();
        let pairs: Vec<_> = history.iter().map(|h| (h.from_status, h.to_status)).collect();
        assert_eq!(
            pairs,
            vec![
                (BookingStatus::Draft, BookingStatus::Confirmed),
                (BookingStatus::Confirmed, BookingStatus::Out),
            ]
        );
        assert_eq!(vehicle_status(&db, "V-1").await, VehicleStatus::Rented);
    }

    #[tokio::test]
    async fn test_full_rental_and_cancel_from_out() {
        let (db, orch) = setup().await;

        // Return and settle
        let mut a = draft(&orch, "V-1", 1, 4).await;
        orch.submit(&mut a).await.unwrap();
        let id = a.id.clone().unwrap();
        orch.handle_inspection(&id, InspectionType::PreInspection, "PRE-1", Utc::now())
            .await
            .unwrap();
        let (returned, _) = orch
            .handle_inspection(&id, InspectionType::PostInspection, "POST-1", Utc::now())
            .await
            .unwrap();
        assert_eq!(returned.status, BookingStatus::Returned);
        assert_eq!(vehicle_status(&db, "V-1").await, VehicleStatus::Available);

        let (completed, _) = orch.handle_invoice_settled(&id, "SINV-1").await.unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);
        assert_eq!(completed.sales_invoice.as_deref(), Some("SINV-1"));

        // Cancel while out
        let mut b = draft(&orch, "V-1", 10, 12).await;
        orch.submit(&mut b).await.unwrap();
        let (mut out, _) = orch
            .handle_inspection(
                b.id.as_deref().unwrap(),
                InspectionType::PreInspection,
                "PRE-2",
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(vehicle_status(&db, "V-1").await, VehicleStatus::Rented);

        orch.cancel(&mut out).await.unwrap();
        assert_eq!(out.status, BookingStatus::Cancelled);
        assert_eq!(out.docstatus, DocStatus::Cancelled);
        assert_eq!(vehicle_status(&db, "V-1").await, VehicleStatus::Available);
    }

    #[tokio::test]
    async fn test_illegal_transition_changes_nothing() {
        let (db, orch) = setup().await;
        let mut b = draft(&orch, "V-1", 1, 4).await;
        orch.submit(&mut b).await.unwrap();
        let id = b.id.clone().unwrap();

        let err = orch.handle_invoice_settled(&id, "SINV-1").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::Transition(TransitionError::IllegalTransition {
                from: BookingStatus::Confirmed,
                ..
            }))
        ));

        let stored = db.bookings().get(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
        assert!(stored.sales_invoice.is_none());
        assert_eq!(db.bookings().status_history(&id).await.unwrap().len(), 1);

        let mut cancelled = stored;
        orch.cancel(&mut cancelled).await.unwrap();
        assert!(orch.cancel(&mut cancelled).await.is_err());
    }

    #[tokio::test]
    async fn test_cancelling_a_draft_keeps_another_rental_out() {
        let (db, orch) = setup().await;
        let mut out = draft(&orch, "V-1", 1, 5).await;
        orch.submit(&mut out).await.unwrap();
        let id = out.id.clone().unwrap();
        orch.handle_inspection(&id, InspectionType::PreInspection, "INS-1", Utc::now())
            .await
            .unwrap();
        assert_eq!(vehicle_status(&db, "V-1").await, VehicleStatus::Rented);

        let mut later = draft(&orch, "V-1", 10, 12).await;
        let outcome = orch.cancel(&mut later).await.unwrap();

        assert_eq!(later.status, BookingStatus::Cancelled);
        assert!(outcome.warnings.is_empty());
        assert_eq!(vehicle_status(&db, "V-1").await, VehicleStatus::Rented);
    }

    #[tokio::test]
    async fn test_commit_rejects_double_booking() {
        let (db, orch) = setup().await;
        // Both drafts checked out as available; neither held the vehicle yet
        let mut a = draft(&orch, "V-1", 1, 5).await;
        let mut b = draft(&orch, "V-1", 5, 7).await;

        orch.submit(&mut a).await.unwrap();
        let err = orch.submit(&mut b).await.unwrap_err();

        let conflicts = err.conflicts().unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(Some(conflicts[0].id.clone()), a.id);
        assert!(!err.is_retryable());

        assert_eq!(b.status, BookingStatus::Draft);
        let stored = db.bookings().get(b.id.as_deref().unwrap()).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Draft);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submits_book_the_vehicle_once() {
        for round in 0..5 {
            let path = test_db_path(&format!("concurrent_submit_{round}.db"));
            let (db, orch) = setup_with(DbConfig::new(path.clone()).max_connections(5)).await;

            let mut drafts = Vec::new();
            for (start, end) in [(1, 5), (3, 8), (5, 6), (2, 10)] {
                drafts.push(draft(&orch, "V-1", start, end).await);
            }

            let barrier = Arc::new(tokio::sync::Barrier::new(drafts.len()));
            let tasks: Vec<_> = drafts
                .into_iter()
                .map(|mut b| {
                    let orch = orch.clone();
                    let barrier = barrier.clone();
                    tokio::spawn(async move {
                        barrier.wait().await;
                        orch.submit(&mut b).await
                    })
                })
                .collect();

            let mut booked = 0;
            for task in tasks {
                match task.await.unwrap() {
                    Ok(_) => booked += 1,
                    Err(EngineError::Store(StoreError::Overlap { conflicts })) => {
                        assert!(!conflicts.is_empty());
                    }
                    Err(other) => panic!("round {round}: unexpected error {other}"),
                }
            }
            assert_eq!(booked, 1, "round {round}");

            let active = db.bookings().find_active_for_vehicle("V-1", None).await.unwrap();
            assert_eq!(active.len(), 1);
            assert_eq!(vehicle_status(&db, "V-1").await, VehicleStatus::Booked);

            db.close().await;
        }
    }

    #[tokio::test]
    async fn test_vehicle_failure_is_a_warning() {
        let (db, _) = setup().await;
        let db_arc = Arc::new(db.clone());
        let orch = BookingOrchestrator::new(
            db_arc.clone(),
            Arc::new(FlakyVehicles::always_failing(db.clone())),
            db_arc,
            clock(),
            &config(),
        );

        let mut b = draft(&orch, "V-1", 1, 4).await;
        let outcome = orch.submit(&mut b).await.unwrap();

        assert_eq!(outcome.warnings.len(), 1);
        assert!(matches!(
            &outcome.warnings[0],
            LifecycleWarning::VehicleSyncFailed(f) if f.status == VehicleStatus::Booked
        ));
        let json = serde_json::to_value(&outcome.warnings[0]).unwrap();
        assert_eq!(json["kind"], "vehicle_sync_failed");
        assert_eq!(json["vehicle_id"], "V-1");

        let stored = db.bookings().get(&outcome.booking_id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
        assert_eq!(vehicle_status(&db, "V-1").await, VehicleStatus::Available);
        assert_eq!(db.vehicle_sync_outbox().count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_submit_without_vehicle_warns() {
        let (_db, orch) = setup().await;
        let mut b = RentalBooking::draft();
        b.rental_start = Some(d(1));
        b.rental_end = Some(d(2));
        orch.save(&mut b).await.unwrap();

        let outcome = orch.submit(&mut b).await.unwrap();
        assert_eq!(
            outcome.warnings,
            vec![LifecycleWarning::MissingDependency {
                dependency: "vehicle",
                wanted: VehicleStatus::Booked
            }]
        );
        assert_eq!(b.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_submit_requires_dates() {
        let (_db, orch) = setup().await;
        let mut b = RentalBooking::draft();
        b.rental_start = Some(d(1));

        assert!(matches!(
            orch.submit(&mut b).await,
            Err(EngineError::Core(CoreError::MissingField {
                field: "rental_end"
            }))
        ));
    }

    // -------------------------------------------------------------------------
    // Downstream documents
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_contract_lifecycle() {
        let (_db, orch) = setup().await;
        let mut b = draft(&orch, "V-1", 1, 4).await;
        let id = b.id.clone().unwrap();

        assert!(matches!(
            orch.prepare_contract(&id).await,
            Err(EngineError::Core(CoreError::NotSubmitted { .. }))
        ));

        orch.submit(&mut b).await.unwrap();
        let cmd = orch.prepare_contract(&id).await.unwrap();
        assert_eq!(cmd.vehicle_id.as_deref(), Some("V-1"));
        assert_eq!(cmd.customer_id.as_deref(), Some("CUST-1"));
        assert_eq!(cmd.rental_days, 3);
        assert_eq!(cmd.total_amount, Money::from_cents(15000));

        let linked = orch.link_contract(&id, "CON-1").await.unwrap();
        assert_eq!(linked.rental_contract.as_deref(), Some("CON-1"));
        assert!(matches!(
            orch.prepare_contract(&id).await,
            Err(EngineError::Core(CoreError::ContractAlreadyLinked { .. }))
        ));

        assert!(!orch.unlink_contract(&id, "CON-OTHER").await.unwrap());
        assert!(orch.unlink_contract(&id, "CON-1").await.unwrap());
        assert!(orch.prepare_contract(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_prepare_inspection() {
        let (_db, orch) = setup().await;
        let b = draft(&orch, "V-2", 1, 4).await;
        let id = b.id.clone().unwrap();

        let cmd = orch
            .prepare_inspection(&id, InspectionType::PreInspection, d(1))
            .await
            .unwrap();
        assert_eq!(cmd.booking_id, id);
        assert_eq!(cmd.vehicle_id.as_deref(), Some("V-2"));
        assert_eq!(cmd.customer_id.as_deref(), Some("CUST-1"));
        assert_eq!(cmd.date, d(1));

        assert!(matches!(
            orch.prepare_inspection("missing", InspectionType::PostInspection, d(1))
                .await,
            Err(EngineError::Store(StoreError::NotFound { .. }))
        ));
    }
}
