//! # Vehicle Sync
//!
//! Applies the vehicle status writes queued by booking transitions.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Vehicle Sync Flow                                    │
//! │                                                                         │
//! │  commit_transition ──► vehicle_sync_outbox (same transaction)          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  VehicleSyncDispatcher::dispatch(queued)        right after commit     │
//! │    for each entry, in order:                                           │
//! │      set_status ── fail ──► sleep(backoff) ──► retry                   │
//! │         │                      (until max_elapsed)                     │
//! │         ├── ok   ──► mark_applied (supersedes older pending entries   │
//! │         │             for the vehicle)                                 │
//! │         └── gave up ──► mark_failed + SyncFailure warning              │
//! │                         later entries for that vehicle are deferred    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  VehicleSyncWorker (every poll_interval)                               │
//! │    pending(batch_size) ──► skip attempts >= max_attempts ──► dispatch  │
//! │    hourly: delete entries applied more than retention_days ago         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed write never touches the booking. The booking was committed
//! before dispatch started.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use rental_core::{VehicleStatus, VehicleSyncEntry};

use crate::config::VehicleSyncSettings;
use crate::error::{EngineError, EngineResult, StoreError};
use crate::ports::{EffectOutbox, VehicleStore};

/// Upper bound on immediate attempts per entry, independent of elapsed time.
const MAX_IMMEDIATE_ATTEMPTS: u32 = 5;

/// How often the worker prunes applied entries.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

// =============================================================================
// Results
// =============================================================================

/// A vehicle status write that did not happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub entry_id: String,
    pub vehicle_id: String,
    pub status: VehicleStatus,
    /// False when the entry was held back behind an earlier failure for the
    /// same vehicle and never attempted.
    pub attempted: bool,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub applied: Vec<String>,
    pub failures: Vec<SyncFailure>,
}

// =============================================================================
// Dispatcher
// =============================================================================

#[derive(Clone)]
pub struct VehicleSyncDispatcher {
    vehicles: Arc<dyn VehicleStore>,
    outbox: Arc<dyn EffectOutbox>,
    settings: VehicleSyncSettings,
}

impl VehicleSyncDispatcher {
    pub fn new(
        vehicles: Arc<dyn VehicleStore>,
        outbox: Arc<dyn EffectOutbox>,
        settings: VehicleSyncSettings,
    ) -> Self {
        VehicleSyncDispatcher {
            vehicles,
            outbox,
            settings,
        }
    }

    /// Applies `entries` in order.
    ///
    /// Once a write for a vehicle fails, the remaining entries for that
    /// vehicle stay pending so they are never applied out of order. A write
    /// that succeeds retires every older pending entry for its vehicle, so a
    /// leftover from an earlier batch can't be replayed over it.
    pub async fn dispatch(&self, entries: &[VehicleSyncEntry]) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut blocked: HashSet<&str> = HashSet::new();

        for entry in entries {
            if blocked.contains(entry.vehicle_id.as_str()) {
                debug!(entry_id = %entry.id, vehicle_id = %entry.vehicle_id, "Deferred behind failed write");
                report.failures.push(SyncFailure {
                    entry_id: entry.id.clone(),
                    vehicle_id: entry.vehicle_id.clone(),
                    status: entry.status,
                    attempted: false,
                    error: "deferred behind an earlier failed write".into(),
                });
                continue;
            }

            match self.apply_with_retry(entry).await {
                Ok(()) => {
                    match self.outbox.mark_applied(&entry.id).await {
                        Ok(0) => {}
                        Ok(superseded) => debug!(
                            entry_id = %entry.id,
                            vehicle_id = %entry.vehicle_id,
                            superseded,
                            "Retired older pending writes"
                        ),
                        // The vehicle has the status; a repeat apply is harmless.
                        Err(e) => warn!(entry_id = %entry.id, error = %e, "Failed to mark entry applied"),
                    }
                    report.applied.push(entry.id.clone());
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(
                        entry_id = %entry.id,
                        vehicle_id = %entry.vehicle_id,
                        status = %entry.status,
                        error = %message,
                        "Vehicle status write failed"
                    );

                    if let Err(mark_err) = self.outbox.mark_failed(&entry.id, &message).await {
                        error!(entry_id = %entry.id, error = %mark_err, "Failed to record failed attempt");
                    }

                    blocked.insert(entry.vehicle_id.as_str());
                    report.failures.push(SyncFailure {
                        entry_id: entry.id.clone(),
                        vehicle_id: entry.vehicle_id.clone(),
                        status: entry.status,
                        attempted: true,
                        error: message,
                    });
                }
            }
        }

        report
    }

    /// One entry, retried with exponential backoff.
    ///
    /// A missing vehicle is not retried.
    async fn apply_with_retry(&self, entry: &VehicleSyncEntry) -> EngineResult<()> {
        let mut backoff = self.create_backoff();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let err = match self.vehicles.set_status(&entry.vehicle_id, entry.status).await {
                Ok(()) => {
                    debug!(
                        vehicle_id = %entry.vehicle_id,
                        status = %entry.status,
                        attempt,
                        "Vehicle status applied"
                    );
                    return Ok(());
                }
                Err(e @ StoreError::NotFound { .. }) => return Err(e.into()),
                Err(e) => EngineError::from(e),
            };

            if attempt >= MAX_IMMEDIATE_ATTEMPTS {
                return Err(err);
            }

            match backoff.next_backoff() {
                Some(duration) => {
                    debug!(?duration, attempt, error = %err, "Retrying vehicle status write");
                    tokio::time::sleep(duration).await;
                }
                None => return Err(err),
            }
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.settings.initial_backoff(),
            max_interval: self.settings.max_elapsed(),
            multiplier: 2.0,
            max_elapsed_time: Some(self.settings.max_elapsed()),
            ..Default::default()
        }
    }
}

// =============================================================================
// Background Worker
// =============================================================================

/// Handle for stopping a running [`VehicleSyncWorker`].
#[derive(Clone)]
pub struct VehicleSyncWorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl VehicleSyncWorkerHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| EngineError::InvalidConfig("vehicle sync worker already stopped".into()))
    }
}

/// Drains whatever the dispatcher left pending.
pub struct VehicleSyncWorker {
    dispatcher: VehicleSyncDispatcher,
    outbox: Arc<dyn EffectOutbox>,
    settings: VehicleSyncSettings,
    shutdown_rx: mpsc::Receiver<()>,
}

impl VehicleSyncWorker {
    pub fn new(
        dispatcher: VehicleSyncDispatcher,
        outbox: Arc<dyn EffectOutbox>,
        settings: VehicleSyncSettings,
    ) -> (Self, VehicleSyncWorkerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = VehicleSyncWorker {
            dispatcher,
            outbox,
            settings,
            shutdown_rx,
        };

        (worker, VehicleSyncWorkerHandle { shutdown_tx })
    }

    /// Runs until shutdown is requested.
    pub async fn run(mut self) {
        info!(
            poll_interval_secs = self.settings.poll_interval_secs,
            batch_size = self.settings.batch_size,
            "Vehicle sync worker starting"
        );

        let mut interval = tokio::time::interval(self.settings.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut cleanup = tokio::time::interval(CLEANUP_INTERVAL);
        cleanup.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.process_pending().await {
                        Ok(report) if !report.applied.is_empty() || !report.failures.is_empty() => {
                            info!(
                                applied = report.applied.len(),
                                failed = report.failures.len(),
                                "Vehicle sync batch processed"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Vehicle sync batch failed"),
                    }
                }

                _ = cleanup.tick() => {
                    if let Err(e) = self.cleanup().await {
                        warn!(error = %e, "Vehicle sync outbox cleanup failed");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Vehicle sync worker shutting down");
                    break;
                }
            }
        }
    }

    /// One poll: fetch pending entries and dispatch the ones still worth
    /// trying.
    pub async fn process_pending(&self) -> EngineResult<DispatchReport> {
        let pending = self.outbox.pending(self.settings.batch_size).await?;
        if pending.is_empty() {
            return Ok(DispatchReport::default());
        }

        let (live, exhausted): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|e| e.attempts < self.settings.max_attempts);

        for entry in &exhausted {
            warn!(
                entry_id = %entry.id,
                vehicle_id = %entry.vehicle_id,
                attempts = entry.attempts,
                last_error = ?entry.last_error,
                "Skipping vehicle sync entry after max attempts"
            );
        }

        Ok(self.dispatcher.dispatch(&live).await)
    }

    /// Deletes applied entries past the retention window.
    pub async fn cleanup(&self) -> EngineResult<u64> {
        if self.settings.retention_days == 0 {
            return Ok(0);
        }

        let deleted = self
            .outbox
            .cleanup_applied(self.settings.retention_days)
            .await?;
        if deleted > 0 {
            info!(deleted, retention_days = self.settings.retention_days, "Pruned applied vehicle sync entries");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fast_sync_settings, FlakyVehicles};
    use rental_core::{DomainEvent, Money, Vehicle};
    use rental_db::{Database, DbConfig};

    async fn setup() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for id in ["V-1", "V-2"] {
            db.vehicles()
                .upsert(&Vehicle {
                    id: id.into(),
                    rate_per_day: Money::from_cents(5000),
                    status: VehicleStatus::Available,
                })
                .await
                .unwrap();
        }
        db
    }

    async fn queue(db: &Database, vehicle_id: &str, status: VehicleStatus) -> VehicleSyncEntry {
        // Go through a real transition commit so the entry is a genuine outbox row
        let mut booking = rental_core::RentalBooking::draft();
        booking.vehicle = Some(vehicle_id.into());
        db.bookings().save(&mut booking).await.unwrap();

        let transition = rental_core::Transition {
            event: "Submit",
            from: rental_core::BookingStatus::Draft,
            to: rental_core::BookingStatus::Draft,
            steps: vec![],
            effects: vec![DomainEvent::VehicleStatusRequested {
                booking_id: booking.id.clone(),
                vehicle_id: vehicle_id.into(),
                status,
            }],
            warnings: vec![],
        };
        let mut queued = db
            .bookings()
            .commit_transition(&mut booking, &transition)
            .await
            .unwrap();
        queued.remove(0)
    }

    #[tokio::test]
    async fn test_dispatch_applies_in_order() {
        let db = setup().await;
        let a = queue(&db, "V-1", VehicleStatus::Booked).await;
        let b = queue(&db, "V-1", VehicleStatus::Rented).await;

        let dispatcher = VehicleSyncDispatcher::new(
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            fast_sync_settings(),
        );
        let report = dispatcher.dispatch(&[a.clone(), b.clone()]).await;

        assert_eq!(report.applied, vec![a.id, b.id]);
        assert!(report.failures.is_empty());
        let vehicle = db.vehicles().get("V-1").await.unwrap().unwrap();
        assert_eq!(vehicle.status, VehicleStatus::Rented);
        assert_eq!(db.vehicle_sync_outbox().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failure_defers_same_vehicle_only() {
        let db = setup().await;
        let a = queue(&db, "V-1", VehicleStatus::Booked).await;
        let b = queue(&db, "V-1", VehicleStatus::Rented).await;
        let c = queue(&db, "V-2", VehicleStatus::Booked).await;

        let vehicles = FlakyVehicles::failing_for(db.clone(), "V-1");
        let dispatcher =
            VehicleSyncDispatcher::new(Arc::new(vehicles), Arc::new(db.clone()), fast_sync_settings());
        let report = dispatcher.dispatch(&[a.clone(), b.clone(), c.clone()]).await;

        assert_eq!(report.applied, vec![c.id]);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures[0].attempted);
        assert!(!report.failures[1].attempted);

        // Only the attempted entry has its failure recorded
        let pending = db.vehicle_sync_outbox().get_pending(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, a.id);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[1].id, b.id);
        assert_eq!(pending[1].attempts, 0);
    }

    #[tokio::test]
    async fn test_newer_write_retires_stale_pending_entry() {
        let db = setup().await;
        let stale = queue(&db, "V-1", VehicleStatus::Rented).await;

        let flaky = VehicleSyncDispatcher::new(
            Arc::new(FlakyVehicles::failing_for(db.clone(), "V-1")),
            Arc::new(db.clone()),
            fast_sync_settings(),
        );
        let report = flaky.dispatch(&[stale.clone()]).await;
        assert_eq!(report.failures.len(), 1);

        // The vehicle store recovers and a later transition asks for Available
        let newer = queue(&db, "V-1", VehicleStatus::Available).await;
        let settings = fast_sync_settings();
        let dispatcher =
            VehicleSyncDispatcher::new(Arc::new(db.clone()), Arc::new(db.clone()), settings.clone());
        let report = dispatcher.dispatch(&[newer.clone()]).await;
        assert_eq!(report.applied, vec![newer.id]);
        assert_eq!(db.vehicle_sync_outbox().count_pending().await.unwrap(), 0);

        let (worker, _handle) = VehicleSyncWorker::new(dispatcher, Arc::new(db.clone()), settings);
        let report = worker.process_pending().await.unwrap();
        assert!(report.applied.is_empty());

        let vehicle = db.vehicles().get("V-1").await.unwrap().unwrap();
        assert_eq!(vehicle.status, VehicleStatus::Available);
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_with_retry() {
        let db = setup().await;
        let a = queue(&db, "V-1", VehicleStatus::Booked).await;

        let vehicles = FlakyVehicles::failing_times(db.clone(), 2);
        let dispatcher =
            VehicleSyncDispatcher::new(Arc::new(vehicles), Arc::new(db.clone()), fast_sync_settings());
        let report = dispatcher.dispatch(&[a.clone()]).await;

        assert_eq!(report.applied, vec![a.id]);
        let vehicle = db.vehicles().get("V-1").await.unwrap().unwrap();
        assert_eq!(vehicle.status, VehicleStatus::Booked);
    }

    #[tokio::test]
    async fn test_worker_drains_and_skips_exhausted() {
        let db = setup().await;
        let stuck = queue(&db, "V-2", VehicleStatus::Booked).await;
        let outbox = db.vehicle_sync_outbox();
        for _ in 0..3 {
            outbox.mark_failed(&stuck.id, "down").await.unwrap();
        }
        let fresh = queue(&db, "V-1", VehicleStatus::Booked).await;

        let mut settings = fast_sync_settings();
        settings.max_attempts = 3;
        let dispatcher =
            VehicleSyncDispatcher::new(Arc::new(db.clone()), Arc::new(db.clone()), settings.clone());
        let (worker, _handle) = VehicleSyncWorker::new(dispatcher, Arc::new(db.clone()), settings);

        let report = worker.process_pending().await.unwrap();
        assert_eq!(report.applied, vec![fresh.id]);

        let pending = outbox.get_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, stuck.id);
        let vehicle = db.vehicles().get("V-2").await.unwrap().unwrap();
        assert_eq!(vehicle.status, VehicleStatus::Available);
    }

    #[tokio::test]
    async fn test_worker_cleanup_keeps_recent_entries() {
        let db = setup().await;
        let entry = queue(&db, "V-1", VehicleStatus::Booked).await;
        db.vehicle_sync_outbox().mark_applied(&entry.id).await.unwrap();

        let mut settings = fast_sync_settings();
        let dispatcher =
            VehicleSyncDispatcher::new(Arc::new(db.clone()), Arc::new(db.clone()), settings.clone());
        let (worker, _handle) =
            VehicleSyncWorker::new(dispatcher.clone(), Arc::new(db.clone()), settings.clone());
        assert_eq!(worker.cleanup().await.unwrap(), 0);

        settings.retention_days = 0;
        let (worker, _handle) = VehicleSyncWorker::new(dispatcher, Arc::new(db.clone()), settings);
        assert_eq!(worker.cleanup().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_worker_shutdown() {
        let db = setup().await;
        let settings = fast_sync_settings();
        let dispatcher =
            VehicleSyncDispatcher::new(Arc::new(db.clone()), Arc::new(db.clone()), settings.clone());
        let (worker, handle) = VehicleSyncWorker::new(dispatcher, Arc::new(db.clone()), settings);

        let task = tokio::spawn(worker.run());
        handle.shutdown().await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        assert!(handle.shutdown().await.is_err());
    }
}
