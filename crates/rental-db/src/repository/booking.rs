//! # Booking Repository
//!
//! Persistence for rental bookings, their service lines and status history.
//!
//! ## Commit Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      commit_transition()                                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. UPSERT rental_bookings          ← overlap trigger runs here │   │
//! │  │       └── booking_overlap? re-query the conflicts, roll back    │   │
//! │  │                                                                 │   │
//! │  │  2. REPLACE rental_booking_services                             │   │
//! │  │                                                                 │   │
//! │  │  3. INSERT booking_status_log       (one row per step)          │   │
//! │  │       Draft → Confirmed                                         │   │
//! │  │       Confirmed → Out                                           │   │
//! │  │                                                                 │   │
//! │  │  4. INSERT vehicle_sync_outbox      (one row per effect)        │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← booking, history and queued vehicle writes land together     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The upsert is the first statement so the transaction takes SQLite's write
//! lock before it reads anything. Two commits for the same vehicle therefore
//! run one after the other, and the second one sees the first.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{Sqlite, SqliteExecutor, SqlitePool, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use rental_core::{
    BookingStatus, BookingSummary, DocStatus, Money, RentalBooking, ServiceLine, Transition,
    VehicleSyncEntry,
};

use crate::error::{DbError, DbResult};
use crate::repository::outbox;

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct BookingRow {
    id: String,
    vehicle: Option<String>,
    customer: Option<String>,
    rental_start: Option<NaiveDate>,
    rental_end: Option<NaiveDate>,
    no_days: i64,
    rate_per_day_cents: i64,
    amount_cents: i64,
    status: BookingStatus,
    docstatus: DocStatus,
    pre_inspection: Option<String>,
    post_inspection: Option<String>,
    sales_invoice: Option<String>,
    rental_contract: Option<String>,
    submitted_at: Option<DateTime<Utc>>,
    pre_inspection_at: Option<DateTime<Utc>>,
    post_inspection_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_booking(self, additional_services: Vec<ServiceLine>) -> RentalBooking {
        RentalBooking {
            id: Some(self.id),
            vehicle: self.vehicle,
            customer: self.customer,
            rental_start: self.rental_start,
            rental_end: self.rental_end,
            no_days: self.no_days,
            rate_per_day: Money::from_cents(self.rate_per_day_cents),
            additional_services,
            amount: Money::from_cents(self.amount_cents),
            status: self.status,
            docstatus: self.docstatus,
            pre_inspection: self.pre_inspection,
            post_inspection: self.post_inspection,
            sales_invoice: self.sales_invoice,
            rental_contract: self.rental_contract,
            submitted_at: self.submitted_at,
            pre_inspection_at: self.pre_inspection_at,
            post_inspection_at: self.post_inspection_at,
            completed_at: self.completed_at,
            cancelled_at: self.cancelled_at,
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ServiceRow {
    service_name: String,
    quantity: i64,
    rate_cents: i64,
    total_cents: i64,
}

impl From<ServiceRow> for ServiceLine {
    fn from(row: ServiceRow) -> Self {
        ServiceLine {
            service_name: row.service_name,
            quantity: row.quantity,
            rate: Money::from_cents(row.rate_cents),
            total: Money::from_cents(row.total_cents),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    id: String,
    rental_start: NaiveDate,
    rental_end: NaiveDate,
    status: BookingStatus,
}

impl From<SummaryRow> for BookingSummary {
    fn from(row: SummaryRow) -> Self {
        BookingSummary {
            id: row.id,
            rental_start: row.rental_start,
            rental_end: row.rental_end,
            status: row.status,
        }
    }
}

/// One row of `booking_status_log`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StatusLogEntry {
    pub booking_id: String,
    pub from_status: BookingStatus,
    pub to_status: BookingStatus,
    pub event: String,
    pub recorded_at: DateTime<Utc>,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for booking database operations.
#[derive(Debug, Clone)]
pub struct BookingRepository {
    pool: SqlitePool,
}

impl BookingRepository {
    /// Creates a new BookingRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BookingRepository { pool }
    }

    /// Gets a booking with its service lines.
    pub async fn get(&self, id: &str) -> DbResult<Option<RentalBooking>> {
        let row: Option<BookingRow> =
            sqlx::query_as::<_, BookingRow>("SELECT * FROM rental_bookings WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let services = fetch_services(&self.pool, id).await?;
        Ok(Some(row.into_booking(services)))
    }

    /// Active bookings on a vehicle, ordered by start date then id.
    ///
    /// Skips Draft, Cancelled and Completed bookings, bookings without both
    /// dates, and `excluding_id`.
    pub async fn find_active_for_vehicle(
        &self,
        vehicle_id: &str,
        excluding_id: Option<&str>,
    ) -> DbResult<Vec<BookingSummary>> {
        debug!(vehicle_id = %vehicle_id, "Fetching active bookings for vehicle");

        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT id, rental_start, rental_end, status
            FROM rental_bookings
            WHERE vehicle = ?1
              AND status NOT IN ('Draft', 'Cancelled', 'Completed')
              AND rental_start IS NOT NULL
              AND rental_end IS NOT NULL
              AND (?2 IS NULL OR id <> ?2)
            ORDER BY rental_start, id
            "#,
        )
        .bind(vehicle_id)
        .bind(excluding_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(BookingSummary::from).collect())
    }

    /// Inserts or updates a booking and its service lines.
    ///
    /// Assigns a UUID and `created_at` on first save and refreshes
    /// `updated_at`. No status history or outbox rows are written.
    pub async fn save(&self, booking: &mut RentalBooking) -> DbResult<()> {
        let mut candidate = booking.clone();
        let mut tx = self.pool.begin().await?;

        write_booking(&mut tx, &mut candidate).await?;

        tx.commit().await?;
        *booking = candidate;

        debug!(booking_id = ?booking.id, "Booking saved");
        Ok(())
    }

    /// Persists a booking after a lifecycle transition.
    ///
    /// Writes the booking, one status-log row per step and one outbox entry
    /// per effect in a single transaction, and returns the queued entries.
    ///
    /// ## Errors
    /// - `BookingOverlap` with the conflicting bookings if the new state would
    ///   double-book the vehicle. Nothing is written.
    pub async fn commit_transition(
        &self,
        booking: &mut RentalBooking,
        transition: &Transition,
    ) -> DbResult<Vec<VehicleSyncEntry>> {
        let mut candidate = booking.clone();
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let booking_id = write_booking(&mut tx, &mut candidate).await?;

        for (from, to) in transition.step_pairs() {
            sqlx::query(
                r#"
                INSERT INTO booking_status_log (booking_id, from_status, to_status, event, recorded_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&booking_id)
            .bind(from)
            .bind(to)
            .bind(transition.event)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let mut queued = Vec::with_capacity(transition.effects.len());
        for effect in &transition.effects {
            queued.push(outbox::queue(&mut *tx, &booking_id, effect, now).await?);
        }

        tx.commit().await?;
        *booking = candidate;

        info!(
            booking_id = %booking_id,
            from = %transition.from,
            to = %transition.to,
            queued = queued.len(),
            "Booking transition committed"
        );

        Ok(queued)
    }

    /// Status history of a booking, oldest first.
    pub async fn status_history(&self, booking_id: &str) -> DbResult<Vec<StatusLogEntry>> {
        let rows = sqlx::query_as::<_, StatusLogEntry>(
            r#"
            SELECT booking_id, from_status, to_status, event, recorded_at
            FROM booking_status_log
            WHERE booking_id = ?1
            ORDER BY id
            "#,
        )
        .bind(booking_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Counts bookings (for diagnostics and the seed binary).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rental_bookings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

async fn fetch_services<'e>(
    executor: impl SqliteExecutor<'e>,
    booking_id: &str,
) -> DbResult<Vec<ServiceLine>> {
    let rows = sqlx::query_as::<_, ServiceRow>(
        r#"
        SELECT service_name, quantity, rate_cents, total_cents
        FROM rental_booking_services
        WHERE booking_id = ?1
        ORDER BY idx
        "#,
    )
    .bind(booking_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(ServiceLine::from).collect())
}

async fn fetch_overlapping<'e>(
    executor: impl SqliteExecutor<'e>,
    vehicle_id: &str,
    start: NaiveDate,
    end: NaiveDate,
    excluding_id: &str,
) -> DbResult<Vec<BookingSummary>> {
    let rows = sqlx::query_as::<_, SummaryRow>(
        r#"
        SELECT id, rental_start, rental_end, status
        FROM rental_bookings
        WHERE vehicle = ?1
          AND id <> ?4
          AND status NOT IN ('Draft', 'Cancelled', 'Completed')
          AND rental_start <= ?3
          AND ?2 <= rental_end
        ORDER BY rental_start, id
        "#,
    )
    .bind(vehicle_id)
    .bind(start)
    .bind(end)
    .bind(excluding_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(BookingSummary::from).collect())
}

/// Upserts the booking row and replaces its service lines. Returns the id.
async fn write_booking(
    tx: &mut Transaction<'_, Sqlite>,
    booking: &mut RentalBooking,
) -> DbResult<String> {
    let now = Utc::now();
    let id = booking
        .id
        .get_or_insert_with(|| Uuid::new_v4().to_string())
        .clone();
    let created_at = *booking.created_at.get_or_insert(now);
    booking.updated_at = Some(now);

    let result = sqlx::query(
        r#"
        INSERT INTO rental_bookings (
            id, vehicle, customer, rental_start, rental_end,
            no_days, rate_per_day_cents, amount_cents, status, docstatus,
            pre_inspection, post_inspection, sales_invoice, rental_contract,
            submitted_at, pre_inspection_at, post_inspection_at, completed_at, cancelled_at,
            created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8, ?9, ?10,
            ?11, ?12, ?13, ?14,
            ?15, ?16, ?17, ?18, ?19,
            ?20, ?21
        )
        ON CONFLICT(id) DO UPDATE SET
            vehicle = excluded.vehicle,
            customer = excluded.customer,
            rental_start = excluded.rental_start,
            rental_end = excluded.rental_end,
            no_days = excluded.no_days,
            rate_per_day_cents = excluded.rate_per_day_cents,
            amount_cents = excluded.amount_cents,
            status = excluded.status,
            docstatus = excluded.docstatus,
            pre_inspection = excluded.pre_inspection,
            post_inspection = excluded.post_inspection,
            sales_invoice = excluded.sales_invoice,
            rental_contract = excluded.rental_contract,
            submitted_at = excluded.submitted_at,
            pre_inspection_at = excluded.pre_inspection_at,
            post_inspection_at = excluded.post_inspection_at,
            completed_at = excluded.completed_at,
            cancelled_at = excluded.cancelled_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&id)
    .bind(&booking.vehicle)
    .bind(&booking.customer)
    .bind(booking.rental_start)
    .bind(booking.rental_end)
    .bind(booking.no_days)
    .bind(booking.rate_per_day.cents())
    .bind(booking.amount.cents())
    .bind(booking.status)
    .bind(booking.docstatus)
    .bind(&booking.pre_inspection)
    .bind(&booking.post_inspection)
    .bind(&booking.sales_invoice)
    .bind(&booking.rental_contract)
    .bind(booking.submitted_at)
    .bind(booking.pre_inspection_at)
    .bind(booking.post_inspection_at)
    .bind(booking.completed_at)
    .bind(booking.cancelled_at)
    .bind(created_at)
    .bind(now)
    .execute(&mut **tx)
    .await;

    if let Err(err) = result {
        return Err(match DbError::from(err) {
            DbError::BookingOverlap { .. } => overlap_error(tx, booking, &id).await,
            other => other,
        });
    }

    sqlx::query("DELETE FROM rental_booking_services WHERE booking_id = ?1")
        .bind(&id)
        .execute(&mut **tx)
        .await?;

    for (idx, line) in booking.additional_services.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO rental_booking_services
                (booking_id, idx, service_name, quantity, rate_cents, total_cents)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&id)
        .bind(idx as i64)
        .bind(&line.service_name)
        .bind(line.quantity)
        .bind(line.rate.cents())
        .bind(line.total.cents())
        .execute(&mut **tx)
        .await?;
    }

    Ok(id)
}

/// Builds the overlap error with the bookings the trigger found.
async fn overlap_error(
    tx: &mut Transaction<'_, Sqlite>,
    booking: &RentalBooking,
    id: &str,
) -> DbError {
    let vehicle_id = booking.vehicle.clone().unwrap_or_default();

    let conflicts = match booking.period() {
        Some((start, end)) => {
            match fetch_overlapping(&mut **tx, &vehicle_id, start, end, id).await {
                Ok(conflicts) => conflicts,
                Err(err) => return err,
            }
        }
        None => Vec::new(),
    };

    info!(
        booking_id = %id,
        vehicle_id = %vehicle_id,
        conflicts = conflicts.len(),
        "Booking rejected: vehicle already booked"
    );

    DbError::BookingOverlap {
        vehicle_id,
        conflicts,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
