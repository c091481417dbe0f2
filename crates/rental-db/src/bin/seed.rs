//! # Seed Data Generator
//!
//! Populates the database with a demo fleet for development.
//!
//! ## Usage
//! ```bash
//! # Seed the default database
//! cargo run -p rental-db --bin seed
//!
//! # Specify database path
//! cargo run -p rental-db --bin seed -- --db ./data/rental.db
//! ```
//!
//! Every vehicle starts Available. Rates vary by class.

use std::env;

use rental_core::{Money, Vehicle, VehicleStatus};
use rental_db::{Database, DbConfig};

/// Vehicle classes and their daily rate in cents.
const CLASSES: &[(&str, i64)] = &[
    ("ECO", 3500),
    ("CMP", 4500),
    ("MID", 5500),
    ("SUV", 7900),
    ("VAN", 9500),
];

/// Vehicles generated per class.
const PER_CLASS: usize = 4;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./rental_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Rental Fleet Seed Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./rental_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Rental Fleet Seed Generator");
    println!("==============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.vehicles().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} vehicles", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let mut generated = 0;
    for (class, rate_cents) in CLASSES {
        for n in 1..=PER_CLASS {
            let vehicle = Vehicle {
                id: format!("{}-{:03}", class, n),
                // Newer units in a class cost a little more
                rate_per_day: Money::from_cents(rate_cents + (n as i64 - 1) * 250),
                status: VehicleStatus::Available,
            };

            if let Err(e) = db.vehicles().upsert(&vehicle).await {
                eprintln!("Failed to insert {}: {}", vehicle.id, e);
                continue;
            }

            generated += 1;
        }
    }

    println!();
    println!("✓ Generated {} vehicles", generated);
    println!("✓ Seed complete!");

    db.close().await;
    Ok(())
}
