//! Port implementations and fixtures for tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use rental_core::{
    BookingStatus, BookingSummary, Money, RentalBooking, Transition, VehicleStatus,
    VehicleSyncEntry,
};
use rental_db::Database;

use crate::config::VehicleSyncSettings;
use crate::error::StoreError;
use crate::ports::{BookingStore, StoreResult, VehicleStore};

/// 2025-06-`day`.
pub fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
}

pub fn summary(id: &str, start: u32, end: u32, status: BookingStatus) -> BookingSummary {
    BookingSummary {
        id: id.into(),
        rental_start: d(start),
        rental_end: d(end),
        status,
    }
}

/// Millisecond backoff so retry tests finish quickly.
pub fn fast_sync_settings() -> VehicleSyncSettings {
    VehicleSyncSettings {
        initial_backoff_ms: 1,
        max_elapsed_ms: 200,
        poll_interval_secs: 1,
        batch_size: 50,
        max_attempts: 10,
        retention_days: 7,
    }
}

// =============================================================================
// Booking Stores
// =============================================================================

/// Returns a fixed list of active bookings. Writes are accepted and dropped.
pub struct StaticBookings(pub Vec<BookingSummary>);

#[async_trait]
impl BookingStore for StaticBookings {
    async fn find_active_bookings_for_vehicle(
        &self,
        _vehicle_id: &str,
        _excluding_id: Option<&str>,
    ) -> StoreResult<Vec<BookingSummary>> {
        Ok(self.0.clone())
    }

    async fn get(&self, _id: &str) -> StoreResult<Option<RentalBooking>> {
        Ok(None)
    }

    async fn save(&self, _booking: &mut RentalBooking) -> StoreResult<()> {
        Ok(())
    }

    async fn commit_transition(
        &self,
        _booking: &mut RentalBooking,
        _transition: &Transition,
    ) -> StoreResult<Vec<VehicleSyncEntry>> {
        Ok(Vec::new())
    }
}

/// Every call fails.
pub struct FailingBookings;

#[async_trait]
impl BookingStore for FailingBookings {
    async fn find_active_bookings_for_vehicle(
        &self,
        _vehicle_id: &str,
        _excluding_id: Option<&str>,
    ) -> StoreResult<Vec<BookingSummary>> {
        Err(StoreError::backend("connection reset"))
    }

    async fn get(&self, _id: &str) -> StoreResult<Option<RentalBooking>> {
        Err(StoreError::backend("connection reset"))
    }

    async fn save(&self, _booking: &mut RentalBooking) -> StoreResult<()> {
        Err(StoreError::backend("connection reset"))
    }

    async fn commit_transition(
        &self,
        _booking: &mut RentalBooking,
        _transition: &Transition,
    ) -> StoreResult<Vec<VehicleSyncEntry>> {
        Err(StoreError::backend("connection reset"))
    }
}

/// Availability queries answer only after the given delay. Writes are
/// accepted and dropped.
pub struct SlowBookings(pub Duration);

#[async_trait]
impl BookingStore for SlowBookings {
    async fn find_active_bookings_for_vehicle(
        &self,
        _vehicle_id: &str,
        _excluding_id: Option<&str>,
    ) -> StoreResult<Vec<BookingSummary>> {
        tokio::time::sleep(self.0).await;
        Ok(Vec::new())
    }

    async fn get(&self, _id: &str) -> StoreResult<Option<RentalBooking>> {
        Ok(None)
    }

    async fn save(&self, _booking: &mut RentalBooking) -> StoreResult<()> {
        Ok(())
    }

    async fn commit_transition(
        &self,
        _booking: &mut RentalBooking,
        _transition: &Transition,
    ) -> StoreResult<Vec<VehicleSyncEntry>> {
        Ok(Vec::new())
    }
}

// =============================================================================
// Vehicle Store
// =============================================================================

/// Wraps the database vehicle store and fails status writes.
///
/// Rates are always read through.
pub struct FlakyVehicles {
    db: Database,
    failing_vehicle: Option<String>,
    failures_left: AtomicU32,
}

impl FlakyVehicles {
    /// Every status write fails.
    pub fn always_failing(db: Database) -> Self {
        FlakyVehicles {
            db,
            failing_vehicle: None,
            failures_left: AtomicU32::new(u32::MAX),
        }
    }

    /// Status writes for `vehicle_id` always fail; others go through.
    pub fn failing_for(db: Database, vehicle_id: &str) -> Self {
        FlakyVehicles {
            db,
            failing_vehicle: Some(vehicle_id.into()),
            failures_left: AtomicU32::new(u32::MAX),
        }
    }

    /// The first `times` status writes fail.
    pub fn failing_times(db: Database, times: u32) -> Self {
        FlakyVehicles {
            db,
            failing_vehicle: None,
            failures_left: AtomicU32::new(times),
        }
    }
}

#[async_trait]
impl VehicleStore for FlakyVehicles {
    async fn get_rate(&self, vehicle_id: &str) -> StoreResult<Money> {
        Ok(self.db.vehicles().get_rate(vehicle_id).await?)
    }

    async fn set_status(&self, vehicle_id: &str, status: VehicleStatus) -> StoreResult<()> {
        let targeted = self
            .failing_vehicle
            .as_deref()
            .map_or(true, |v| v == vehicle_id);

        if targeted {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                if left != u32::MAX {
                    self.failures_left.store(left - 1, Ordering::SeqCst);
                }
                return Err(StoreError::backend("vehicle service unavailable"));
            }
        }

        Ok(self.db.vehicles().set_status(vehicle_id, status).await?)
    }
}
