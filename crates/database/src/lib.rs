//! SQLite persistence layer for Tikiti.
//!
//! This crate provides async database operations for the booking system:
//! catalog reads over events and ticket tiers, user upserts keyed by phone
//! number, and the booking engine (create / complete / cancel) with its
//! first-webhook-wins completion barrier.
//!
//! # Example
//!
//! ```no_run
//! use database::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("sqlite:tikiti.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     let user = database::user::upsert_by_phone(db.pool(), "254712345678", Some("Amina")).await?;
//!     println!("user {}", user.id);
//!     Ok(())
//! }
//! ```

pub mod booking;
pub mod error;
pub mod event;
pub mod models;
pub mod ticket;
pub mod user;

pub use booking::CompletedBooking;
pub use error::{DatabaseError, Result};
pub use models::{
    Booking, BookingStatus, Event, EventCategory, PaymentMethod, Ticket, TicketTier, User,
};

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Database connection wrapper.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
    /// Use `?mode=rwc` to create the database file if it doesn't exist.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        tracing::info!("Connected to database: {}", url);

        Ok(Self { pool })
    }

    /// Connect to a private in-memory database over a single connection.
    ///
    /// Used by tests and local experiments. The single connection keeps the
    /// data alive for the pool's lifetime and serializes writers, which is
    /// what SQLite does for concurrent writers anyway.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations.
    ///
    /// This should be called once after connecting to ensure the schema is up to date.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        tracing::info!("Migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::models::{Event, EventCategory, TicketTier};
    use chrono::{Duration as ChronoDuration, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    /// Fresh migrated in-memory database.
    pub async fn test_db() -> Database {
        let db = Database::connect_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    pub fn sample_event(category: EventCategory, hours_from_now: i64) -> Event {
        Event {
            id: Uuid::new_v4(),
            title: "Sample Night".to_string(),
            description: Some("An evening out".to_string()),
            venue: "Uhuru Gardens".to_string(),
            start_time: Utc::now() + ChronoDuration::hours(hours_from_now),
            end_time: None,
            is_active: true,
            category,
        }
    }

    pub fn sample_tier(event_id: Uuid, price: i64, quantity: i64) -> TicketTier {
        TicketTier {
            id: Uuid::new_v4(),
            event_id,
            name: "Regular".to_string(),
            price: Decimal::new(price, 0),
            quantity,
            quantity_sold: 0,
        }
    }
}
