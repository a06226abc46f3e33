//! Database models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::error::{DatabaseError, Result};

/// Event category, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventCategory {
    University,
    Concert,
    Club,
    Social,
    Holiday,
}

impl EventCategory {
    /// All categories, in menu order.
    pub const ALL: [EventCategory; 5] = [
        EventCategory::University,
        EventCategory::Concert,
        EventCategory::Club,
        EventCategory::Social,
        EventCategory::Holiday,
    ];

    /// Stable string form used in the database and as interactive row ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::University => "UNIVERSITY",
            EventCategory::Concert => "CONCERT",
            EventCategory::Club => "CLUB",
            EventCategory::Social => "SOCIAL",
            EventCategory::Holiday => "HOLIDAY",
        }
    }

    /// Parse a category id, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNIVERSITY" => Some(EventCategory::University),
            "CONCERT" => Some(EventCategory::Concert),
            "CLUB" => Some(EventCategory::Club),
            "SOCIAL" => Some(EventCategory::Social),
            "HOLIDAY" => Some(EventCategory::Holiday),
            _ => None,
        }
    }
}

/// Booking lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    AwaitingPayment,
    Paid,
    Cancelled,
    Expired,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::AwaitingPayment => "AWAITING_PAYMENT",
            BookingStatus::Paid => "PAID",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BookingStatus::Pending),
            "AWAITING_PAYMENT" => Some(BookingStatus::AwaitingPayment),
            "PAID" => Some(BookingStatus::Paid),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            "EXPIRED" => Some(BookingStatus::Expired),
            _ => None,
        }
    }
}

/// How the user chose to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Mpesa,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Mpesa => "MPESA",
            PaymentMethod::Card => "CARD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MPESA" => Some(PaymentMethod::Mpesa),
            "CARD" => Some(PaymentMethod::Card),
            _ => None,
        }
    }
}

/// A bookable event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub venue: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub category: EventCategory,
}

impl Event {
    /// Whether the event is currently on offer.
    pub fn is_offered(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_time > now
    }

    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let category: String = row.try_get("category")?;
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            venue: row.try_get("venue")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            is_active: row.try_get("is_active")?,
            category: EventCategory::parse(&category).ok_or(DatabaseError::Decode {
                column: "category",
                value: category,
            })?,
        })
    }
}

/// A priced class of tickets within one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketTier {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub quantity: i64,
    pub quantity_sold: i64,
}

impl TicketTier {
    /// Remaining capacity.
    pub fn available(&self) -> i64 {
        self.quantity - self.quantity_sold
    }

    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let price: String = row.try_get("price")?;
        Ok(Self {
            id: row.try_get("id")?,
            event_id: row.try_get("event_id")?,
            name: row.try_get("name")?,
            price: price.parse().map_err(|_| DatabaseError::Decode {
                column: "price",
                value: price,
            })?,
            quantity: row.try_get("quantity")?,
            quantity_sold: row.try_get("quantity_sold")?,
        })
    }
}

/// A user, identified by their normalized phone number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub phone_number: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A commitment by one user to purchase tickets of one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tier_id: Uuid,
    pub quantity: i64,
    pub total_amount: Decimal,
    pub status: BookingStatus,
    pub payment_method: PaymentMethod,
    pub payment_phone_number: Option<String>,
    pub payment_reference: Option<String>,
    pub expiry_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self> {
        let total: String = row.try_get("total_amount")?;
        let status: String = row.try_get("status")?;
        let method: String = row.try_get("payment_method")?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            tier_id: row.try_get("tier_id")?,
            quantity: row.try_get("quantity")?,
            total_amount: total.parse().map_err(|_| DatabaseError::Decode {
                column: "total_amount",
                value: total,
            })?,
            status: BookingStatus::parse(&status).ok_or(DatabaseError::Decode {
                column: "status",
                value: status,
            })?,
            payment_method: PaymentMethod::parse(&method).ok_or(DatabaseError::Decode {
                column: "payment_method",
                value: method,
            })?,
            payment_phone_number: row.try_get("payment_phone_number")?,
            payment_reference: row.try_get("payment_reference")?,
            expiry_time: row.try_get("expiry_time")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// An issued ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub unique_code: String,
    pub is_redeemed: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_category_roundtrip() {
        for cat in EventCategory::ALL {
            assert_eq!(EventCategory::parse(cat.as_str()), Some(cat));
        }
        assert_eq!(EventCategory::parse("club"), Some(EventCategory::Club));
        assert_eq!(EventCategory::parse("GARDENING"), None);
    }

    #[test]
    fn test_booking_status_roundtrip() {
        for s in [
            BookingStatus::Pending,
            BookingStatus::AwaitingPayment,
            BookingStatus::Paid,
            BookingStatus::Cancelled,
            BookingStatus::Expired,
        ] {
            assert_eq!(BookingStatus::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn test_event_offered_window() {
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            title: "Test".to_string(),
            description: None,
            venue: "Nairobi".to_string(),
            start_time: now + Duration::hours(1),
            end_time: None,
            is_active: true,
            category: EventCategory::Concert,
        };
        assert!(event.is_offered(now));

        let past = Event {
            start_time: now - Duration::hours(1),
            ..event.clone()
        };
        assert!(!past.is_offered(now));

        let inactive = Event {
            is_active: false,
            ..event
        };
        assert!(!inactive.is_offered(now));
    }

    #[test]
    fn test_tier_available() {
        let tier = TicketTier {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            name: "Regular".to_string(),
            price: Decimal::new(500, 0),
            quantity: 10,
            quantity_sold: 4,
        };
        assert_eq!(tier.available(), 6);
    }
}
