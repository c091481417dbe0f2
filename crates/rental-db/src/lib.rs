//! # rental-db: Database Layer for the Rental Engine
//!
//! This crate provides persistence for rental bookings.
//! It uses SQLite with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Rental Engine Data Flow                          │
//! │                                                                         │
//! │  BookingOrchestrator (rental-engine)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     rental-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ (booking.rs)  │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │    │ BookingRepo   │    │ 001_init.sql │  │   │
//! │  │   │ Connection    │◄───│ VehicleRepo   │    │  + overlap   │  │   │
//! │  │   │ Management    │    │ OutboxRepo    │    │    triggers  │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (booking, vehicle, outbox)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rental_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/rental.db")).await?;
//!
//! let active = db.bookings().find_active_for_vehicle("KA-01-1234", None).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::booking::{BookingRepository, StatusLogEntry};
pub use repository::outbox::VehicleSyncOutboxRepository;
pub use repository::vehicle::VehicleRepository;
