//! SQLite implementations of the ports, backed by `rental_db::Database`.

use async_trait::async_trait;

use rental_core::{
    BookingSummary, Money, RentalBooking, Transition, VehicleStatus, VehicleSyncEntry,
};
use rental_db::Database;

use crate::ports::{BookingStore, EffectOutbox, StoreResult, VehicleStore};

#[async_trait]
impl BookingStore for Database {
    async fn find_active_bookings_for_vehicle(
        &self,
        vehicle_id: &str,
        excluding_id: Option<&str>,
    ) -> StoreResult<Vec<BookingSummary>> {
        Ok(self
            .bookings()
            .find_active_for_vehicle(vehicle_id, excluding_id)
            .await?)
    }

    async fn get(&self, id: &str) -> StoreResult<Option<RentalBooking>> {
        Ok(self.bookings().get(id).await?)
    }

    async fn save(&self, booking: &mut RentalBooking) -> StoreResult<()> {
        Ok(self.bookings().save(booking).await?)
    }

    async fn commit_transition(
        &self,
        booking: &mut RentalBooking,
        transition: &Transition,
    ) -> StoreResult<Vec<VehicleSyncEntry>> {
        Ok(self.bookings().commit_transition(booking, transition).await?)
    }
}

#[async_trait]
impl VehicleStore for Database {
    async fn get_rate(&self, vehicle_id: &str) -> StoreResult<Money> {
        Ok(self.vehicles().get_rate(vehicle_id).await?)
    }

    async fn set_status(&self, vehicle_id: &str, status: VehicleStatus) -> StoreResult<()> {
        Ok(self.vehicles().set_status(vehicle_id, status).await?)
    }
}

#[async_trait]
impl EffectOutbox for Database {
    async fn pending(&self, limit: u32) -> StoreResult<Vec<VehicleSyncEntry>> {
        Ok(self.vehicle_sync_outbox().get_pending(limit).await?)
    }

    async fn mark_applied(&self, entry_id: &str) -> StoreResult<u64> {
        Ok(self.vehicle_sync_outbox().mark_applied(entry_id).await?)
    }

    async fn mark_failed(&self, entry_id: &str, error: &str) -> StoreResult<()> {
        Ok(self.vehicle_sync_outbox().mark_failed(entry_id, error).await?)
    }

    async fn cleanup_applied(&self, older_than_days: u32) -> StoreResult<u64> {
        Ok(self.vehicle_sync_outbox().cleanup_applied(older_than_days).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use rental_core::Vehicle;
    use rental_db::DbConfig;

    #[tokio::test]
    async fn test_database_maps_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store: &dyn VehicleStore = &db;

        assert!(matches!(
            store.get_rate("ghost").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_database_vehicle_port() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.vehicles()
            .upsert(&Vehicle {
                id: "SUV-001".into(),
                rate_per_day: Money::from_cents(7900),
                status: VehicleStatus::Available,
            })
            .await
            .unwrap();

        let store: &dyn VehicleStore = &db;
        assert_eq!(store.get_rate("SUV-001").await.unwrap(), Money::from_cents(7900));
        store.set_status("SUV-001", VehicleStatus::Booked).await.unwrap();

        let vehicle = db.vehicles().get("SUV-001").await.unwrap().unwrap();
        assert_eq!(vehicle.status, VehicleStatus::Booked);
    }
}
