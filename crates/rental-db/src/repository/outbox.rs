//! # Vehicle Sync Outbox Repository
//!
//! Queue of vehicle status writes requested by booking transitions.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  BOOKING TRANSITION (e.g., submit)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. UPSERT rental_bookings SET status = 'Confirmed'            │   │
//! │  │                                                                 │   │
//! │  │  2. INSERT INTO vehicle_sync_outbox (vehicle_id, status, ...)  │   │
//! │  │     VALUES (?, 'Booked', <DomainEvent JSON>)                   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← Both succeed or both fail                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  DISPATCHER (right after commit) / WORKER (leftovers)           │   │
//! │  │                                                                 │   │
//! │  │  a. UPDATE vehicles SET status = ?                              │   │
//! │  │  b. On success: UPDATE vehicle_sync_outbox SET applied_at = ?   │   │
//! │  │  c. On failure: attempts += 1, last_error = ?                   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entries for one vehicle must be applied in insertion order (Booked before
//! Rented), so every read orders by `created_at` and then `rowid`.

use chrono::{DateTime, Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use rental_core::{DomainEvent, VehicleStatus, VehicleSyncEntry};

use crate::error::DbResult;

#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    id: String,
    booking_id: Option<String>,
    vehicle_id: String,
    status: VehicleStatus,
    attempts: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    attempted_at: Option<DateTime<Utc>>,
    applied_at: Option<DateTime<Utc>>,
}

impl From<OutboxRow> for VehicleSyncEntry {
    fn from(row: OutboxRow) -> Self {
        VehicleSyncEntry {
            id: row.id,
            booking_id: row.booking_id,
            vehicle_id: row.vehicle_id,
            status: row.status,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            attempted_at: row.attempted_at,
            applied_at: row.applied_at,
        }
    }
}

/// Queues a vehicle status write inside the caller's transaction.
pub(crate) async fn queue(
    conn: &mut SqliteConnection,
    booking_id: &str,
    effect: &DomainEvent,
    now: DateTime<Utc>,
) -> DbResult<VehicleSyncEntry> {
    let DomainEvent::VehicleStatusRequested {
        vehicle_id, status, ..
    } = effect;

    let entry = VehicleSyncEntry {
        id: Uuid::new_v4().to_string(),
        booking_id: Some(booking_id.to_string()),
        vehicle_id: vehicle_id.clone(),
        status: *status,
        attempts: 0,
        last_error: None,
        created_at: now,
        attempted_at: None,
        applied_at: None,
    };

    let payload = serde_json::to_string(effect)?;

    debug!(
        booking_id = %booking_id,
        vehicle_id = %entry.vehicle_id,
        status = %entry.status,
        "Queuing vehicle status write"
    );

    sqlx::query(
        r#"
        INSERT INTO vehicle_sync_outbox (
            id, booking_id, vehicle_id, status, payload, attempts, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.booking_id)
    .bind(&entry.vehicle_id)
    .bind(entry.status)
    .bind(payload)
    .bind(entry.created_at)
    .execute(conn)
    .await?;

    Ok(entry)
}

/// Repository for vehicle-sync outbox operations.
#[derive(Debug, Clone)]
pub struct VehicleSyncOutboxRepository {
    pool: SqlitePool,
}

impl VehicleSyncOutboxRepository {
    /// Creates a new VehicleSyncOutboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        VehicleSyncOutboxRepository { pool }
    }

    /// Entries not yet applied, oldest first.
    pub async fn get_pending(&self, limit: u32) -> DbResult<Vec<VehicleSyncEntry>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, booking_id, vehicle_id, status, attempts, last_error,
                   created_at, attempted_at, applied_at
            FROM vehicle_sync_outbox
            WHERE applied_at IS NULL
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(VehicleSyncEntry::from).collect())
    }

    /// Marks an entry as applied to the vehicle record.
    ///
    /// Older pending entries for the same vehicle are closed in the same
    /// transaction: the vehicle now carries a newer status and replaying
    /// them would overwrite it. Returns the number of entries superseded.
    pub async fn mark_applied(&self, id: &str) -> DbResult<u64> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let superseded = sqlx::query(
            r#"
            UPDATE vehicle_sync_outbox SET
                applied_at = ?2,
                last_error = 'superseded by ' || ?1
            WHERE applied_at IS NULL
              AND id <> ?1
              AND vehicle_id = (SELECT vehicle_id FROM vehicle_sync_outbox WHERE id = ?1)
              AND (created_at, rowid) < (
                  SELECT created_at, rowid FROM vehicle_sync_outbox WHERE id = ?1
              )
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            r#"
            UPDATE vehicle_sync_outbox SET
                applied_at = ?2,
                attempted_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if superseded > 0 {
            debug!(entry_id = %id, superseded, "Superseded older vehicle sync entries");
        }

        Ok(superseded)
    }

    /// Records a failed apply attempt.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE vehicle_sync_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts entries not yet applied.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM vehicle_sync_outbox WHERE applied_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Deletes entries applied more than `days_old` days ago.
    ///
    /// Returns the number of deleted entries.
    pub async fn cleanup_applied(&self, days_old: u32) -> DbResult<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_old));

        let result = sqlx::query(
            r#"
            DELETE FROM vehicle_sync_outbox
            WHERE applied_at IS NOT NULL
              AND applied_at < ?1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
