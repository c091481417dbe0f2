//! # Vehicle Repository
//!
//! Daily rates and operational status of the fleet.
//!
//! ## Key Operations
//! - `get_rate()` - rate copied onto a booking when its vehicle is selected
//! - `set_status()` - target of the vehicle-sync dispatcher
//! - `upsert()` - fleet maintenance and the seed binary

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use rental_core::{Money, Vehicle, VehicleStatus};

use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct VehicleRow {
    id: String,
    rate_per_day_cents: i64,
    status: VehicleStatus,
}

impl From<VehicleRow> for Vehicle {
    fn from(row: VehicleRow) -> Self {
        Vehicle {
            id: row.id,
            rate_per_day: Money::from_cents(row.rate_per_day_cents),
            status: row.status,
        }
    }
}

/// Repository for vehicle database operations.
#[derive(Debug, Clone)]
pub struct VehicleRepository {
    pool: SqlitePool,
}

impl VehicleRepository {
    /// Creates a new VehicleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        VehicleRepository { pool }
    }

    /// Gets a vehicle by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<Vehicle>> {
        let row = sqlx::query_as::<_, VehicleRow>(
            "SELECT id, rate_per_day_cents, status FROM vehicles WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Vehicle::from))
    }

    /// Daily rate of a vehicle.
    ///
    /// ## Errors
    /// - `NotFound` if the vehicle doesn't exist
    pub async fn get_rate(&self, id: &str) -> DbResult<Money> {
        let cents: Option<i64> =
            sqlx::query_scalar("SELECT rate_per_day_cents FROM vehicles WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        cents
            .map(Money::from_cents)
            .ok_or_else(|| DbError::not_found("Vehicle", id))
    }

    /// Sets the operational status of a vehicle.
    ///
    /// ## Errors
    /// - `NotFound` if the vehicle doesn't exist
    pub async fn set_status(&self, id: &str, status: VehicleStatus) -> DbResult<()> {
        debug!(vehicle_id = %id, status = %status, "Updating vehicle status");

        let result = sqlx::query("UPDATE vehicles SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Vehicle", id));
        }

        Ok(())
    }

    /// Inserts a vehicle or updates its rate and status.
    pub async fn upsert(&self, vehicle: &Vehicle) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO vehicles (id, rate_per_day_cents, status, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                rate_per_day_cents = excluded.rate_per_day_cents,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&vehicle.id)
        .bind(vehicle.rate_per_day.cents())
        .bind(vehicle.status)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts vehicles.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vehicles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_rate_and_status() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.vehicles();

        repo.upsert(&Vehicle {
            id: "V-9".into(),
            rate_per_day: Money::from_cents(4500),
            status: VehicleStatus::Available,
        })
        .await
        .unwrap();

        assert_eq!(repo.get_rate("V-9").await.unwrap(), Money::from_cents(4500));

        repo.set_status("V-9", VehicleStatus::Rented).await.unwrap();
        let vehicle = repo.get("V-9").await.unwrap().unwrap();
        assert_eq!(vehicle.status, VehicleStatus::Rented);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_vehicle() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.vehicles();

        assert!(matches!(
            repo.get_rate("nope").await,
            Err(DbError::NotFound { .. })
        ));
        assert!(matches!(
            repo.set_status("nope", VehicleStatus::Booked).await,
            Err(DbError::NotFound { .. })
        ));
        assert!(repo.get("nope").await.unwrap().is_none());
    }
}
