//! # Repository Ports
//!
//! Traits the orchestrator and the vehicle-sync dispatcher are written
//! against. `rental_db::Database` implements all of them (see `store.rs`);
//! tests swap in failing or slow implementations.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use rental_core::{
    BookingSummary, Money, RentalBooking, Transition, VehicleStatus, VehicleSyncEntry,
};

use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Booking persistence.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Active bookings on a vehicle, excluding `excluding_id`, ordered by
    /// start date then id.
    async fn find_active_bookings_for_vehicle(
        &self,
        vehicle_id: &str,
        excluding_id: Option<&str>,
    ) -> StoreResult<Vec<BookingSummary>>;

    async fn get(&self, id: &str) -> StoreResult<Option<RentalBooking>>;

    /// Persists a draft. Assigns the id on first save.
    async fn save(&self, booking: &mut RentalBooking) -> StoreResult<()>;

    /// Persists the booking, its status history and the transition's effects
    /// atomically. Returns the queued vehicle-sync entries.
    ///
    /// Fails with `StoreError::Overlap` if the new state double-books the
    /// vehicle; nothing is written then.
    async fn commit_transition(
        &self,
        booking: &mut RentalBooking,
        transition: &Transition,
    ) -> StoreResult<Vec<VehicleSyncEntry>>;
}

/// Fleet records.
#[async_trait]
pub trait VehicleStore: Send + Sync {
    async fn get_rate(&self, vehicle_id: &str) -> StoreResult<Money>;

    async fn set_status(&self, vehicle_id: &str, status: VehicleStatus) -> StoreResult<()>;
}

/// Pending vehicle status writes.
#[async_trait]
pub trait EffectOutbox: Send + Sync {
    async fn pending(&self, limit: u32) -> StoreResult<Vec<VehicleSyncEntry>>;

    /// Closes the entry and every older pending entry for the same vehicle.
    /// Returns how many older entries were superseded.
    async fn mark_applied(&self, entry_id: &str) -> StoreResult<u64>;

    async fn mark_failed(&self, entry_id: &str, error: &str) -> StoreResult<()>;

    /// Deletes entries applied more than `older_than_days` ago.
    async fn cleanup_applied(&self, older_than_days: u32) -> StoreResult<u64>;
}

/// Source of "now" and "today".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Midnight UTC on `date`.
    pub fn on(date: NaiveDate) -> Self {
        FixedClock(date.and_time(chrono::NaiveTime::MIN).and_utc())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
