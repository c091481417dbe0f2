//! # Repository Module
//!
//! Database repository implementations for the rental engine.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  rental-engine port (BookingStore, VehicleStore, EffectOutbox)         │
//! │       │                                                                 │
//! │       │  db.bookings().commit_transition(&mut booking, &transition)     │
//! │       ▼                                                                 │
//! │  BookingRepository                                                     │
//! │  ├── get(&self, id)                                                    │
//! │  ├── find_active_for_vehicle(&self, vehicle_id, excluding)             │
//! │  ├── save(&self, booking)                                              │
//! │  └── commit_transition(&self, booking, transition)                     │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`BookingRepository`](booking::BookingRepository) - Bookings, service lines, status history
//! - [`VehicleRepository`](vehicle::VehicleRepository) - Rates and vehicle status
//! - [`VehicleSyncOutboxRepository`](outbox::VehicleSyncOutboxRepository) - Queued vehicle writes

pub mod booking;
pub mod outbox;
pub mod vehicle;
