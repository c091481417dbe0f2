//! # Commands
//!
//! Data handed to the services that create inspections and contracts.
//!
//! The booking does not create those documents itself. It builds a command
//! describing what the new document should contain, and the downstream
//! service reports back with an event (`PreInspectionCompleted`, contract
//! submitted, ...) once the document exists.
//!
//! ```text
//! RentalBooking ──prepare──► CreateInspectionCommand ──► inspection service
//!                                                              │
//! RentalBooking ◄──────── PreInspectionCompleted ◄─────────────┘
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{DocStatus, InspectionType, RentalBooking, ServiceLine};

// =============================================================================
// Inspection
// =============================================================================

/// Everything a new vehicle inspection is pre-filled with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInspectionCommand {
    pub booking_id: String,
    pub inspection_type: InspectionType,
    pub vehicle_id: Option<String>,
    pub customer_id: Option<String>,
    pub date: NaiveDate,
}

impl CreateInspectionCommand {
    /// Builds the command from a saved booking.
    pub fn for_booking(
        booking: &RentalBooking,
        inspection_type: InspectionType,
        date: NaiveDate,
    ) -> CoreResult<Self> {
        let booking_id = booking
            .id
            .clone()
            .ok_or(CoreError::MissingField { field: "id" })?;

        Ok(Self {
            booking_id,
            inspection_type,
            vehicle_id: booking.vehicle.clone(),
            customer_id: booking.customer.clone(),
            date,
        })
    }
}

// =============================================================================
// Contract
// =============================================================================

/// Everything a new rental contract is pre-filled with.
///
/// Totals are copied from the booking as they are; the contract does not
/// recompute them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateContractCommand {
    pub booking_id: String,
    pub customer_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub rental_start: Option<NaiveDate>,
    pub rental_end: Option<NaiveDate>,
    pub rental_days: i64,
    pub rate_per_day: Money,
    pub total_amount: Money,
    pub additional_services: Vec<ServiceLine>,
}

impl CreateContractCommand {
    /// Builds the command from a submitted booking with no contract yet.
    ///
    /// ## Errors
    /// - `NotSubmitted` unless docstatus is Submitted
    /// - `ContractAlreadyLinked` if `rental_contract` is set
    pub fn for_booking(booking: &RentalBooking) -> CoreResult<Self> {
        if booking.docstatus != DocStatus::Submitted {
            return Err(CoreError::NotSubmitted {
                operation: "creating a contract",
            });
        }

        if let Some(contract_id) = &booking.rental_contract {
            return Err(CoreError::ContractAlreadyLinked {
                contract_id: contract_id.clone(),
            });
        }

        let booking_id = booking
            .id
            .clone()
            .ok_or(CoreError::MissingField { field: "id" })?;

        Ok(Self {
            booking_id,
            customer_id: booking.customer.clone(),
            vehicle_id: booking.vehicle.clone(),
            rental_start: booking.rental_start,
            rental_end: booking.rental_end,
            rental_days: booking.no_days,
            rate_per_day: booking.rate_per_day,
            total_amount: booking.amount,
            additional_services: booking.additional_services.clone(),
        })
    }
}

/// Records a submitted contract on the booking.
pub fn link_contract(booking: &mut RentalBooking, contract_id: &str) {
    booking.rental_contract = Some(contract_id.to_string());
}

/// Clears the contract reference if it still points at `contract_id`.
///
/// Returns whether anything changed.
pub fn unlink_contract(booking: &mut RentalBooking, contract_id: &str) -> bool {
    if booking.rental_contract.as_deref() == Some(contract_id) {
        booking.rental_contract = None;
        true
    } else {
        false
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
