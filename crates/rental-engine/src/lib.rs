//! # rental-engine: Booking Orchestration for the Rental Engine
//!
//! Drives bookings through edits and lifecycle events on top of the pure
//! rules in `rental-core` and the SQLite store in `rental-db`.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        rental-engine                                    │
//! │                                                                         │
//! │   field edit / save / submit / cancel / inspection / invoice           │
//! │                          │                                              │
//! │                          ▼                                              │
//! │   ┌──────────────────────────────────────────────┐                     │
//! │   │            BookingOrchestrator               │                     │
//! │   │  validate ─► availability ─► recompute       │                     │
//! │   │  transition ─► commit ─► dispatch            │                     │
//! │   └──────┬────────────────┬───────────────┬──────┘                     │
//! │          │                │               │                             │
//! │          ▼                ▼               ▼                             │
//! │   AvailabilityChecker  BookingStore  VehicleSyncDispatcher             │
//! │   (timeout→Unknown)    (ports.rs)    (backoff, warnings)               │
//! │                           │               │                             │
//! │                           ▼               ▼                             │
//! │                  rental_db::Database  VehicleStore / EffectOutbox      │
//! │                                           ▲                             │
//! │                                           │                             │
//! │                                   VehicleSyncWorker (leftovers)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`orchestrator`] - `BookingOrchestrator`, field edits and lifecycle events
//! - [`availability`] - Advisory availability check with timeout
//! - [`dispatcher`] - Vehicle status writes: dispatcher and background worker
//! - [`ports`] - Repository traits and clocks
//! - [`store`] - `rental_db::Database` as the ports
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Engine and port error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rental_engine::{BookingOrchestrator, EngineConfig, FieldChange};
//! use rental_db::Database;
//!
//! let config = EngineConfig::load_or_default(None);
//! let db = Database::new(config.database.db_config()).await?;
//! let engine = BookingOrchestrator::with_database(db, &config);
//!
//! let mut booking = RentalBooking::draft();
//! engine.apply_change(&mut booking, FieldChange::Vehicle(Some("ECO-001".into()))).await?;
//! engine.save(&mut booking).await?;
//! let outcome = engine.submit(&mut booking).await?;
//! for warning in outcome.warnings {
//!     eprintln!("{:?}", warning);
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod availability;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod ports;
pub mod store;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use availability::{AvailabilityChecker, AvailabilityVerdict};
pub use config::EngineConfig;
pub use dispatcher::{
    DispatchReport, SyncFailure, VehicleSyncDispatcher, VehicleSyncWorker,
    VehicleSyncWorkerHandle,
};
pub use error::{EngineError, EngineResult, StoreError};
pub use orchestrator::{
    BookingOrchestrator, ChangeOutcome, FieldChange, LifecycleOutcome, LifecycleWarning,
};
pub use ports::{BookingStore, Clock, EffectOutbox, FixedClock, SystemClock, VehicleStore};
