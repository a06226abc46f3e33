//! The booking engine: create-pending, complete, cancel.
//!
//! `complete_booking` is the consistency heart of the system. Two payment
//! providers (and their retries) may race to complete the same booking; the
//! conditional status update inside one transaction is the single
//! serialization point, so exactly one webhook increments inventory and
//! inserts tickets, and every other caller gets the same tickets back as an
//! idempotent no-op. This holds whether or not the lock registry is
//! reachable.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DatabaseError, Result};
use crate::models::{Booking, BookingStatus, PaymentMethod, Ticket};
use crate::ticket;

/// How long an unpaid booking stays claimable.
const BOOKING_TTL_MINUTES: i64 = 10;

/// Completion attempts before giving up on a persistently racing booking.
const MAX_COMPLETE_ATTEMPTS: u32 = 3;

/// A completed booking with its tickets.
///
/// `newly_completed` distinguishes the webhook that performed the transition
/// from idempotent repeats; only the former sends the confirmation message.
#[derive(Debug, Clone)]
pub struct CompletedBooking {
    pub booking: Booking,
    pub tickets: Vec<Ticket>,
    pub newly_completed: bool,
}

/// Get a booking by id.
pub async fn get(pool: &SqlitePool, id: Uuid) -> Result<Option<Booking>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, tier_id, quantity, total_amount, status, payment_method,
               payment_phone_number, payment_reference, expiry_time, created_at
        FROM bookings
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(Booking::from_row).transpose()
}

/// Create a booking awaiting payment.
///
/// Inventory is untouched here; only [`complete_booking`] moves
/// `quantity_sold`. The total is derived from the tier's current price.
pub async fn create_pending(
    pool: &SqlitePool,
    user_id: Uuid,
    tier_id: Uuid,
    quantity: i64,
    method: PaymentMethod,
    payment_phone: Option<&str>,
) -> Result<Booking> {
    let price: Option<String> = sqlx::query_scalar("SELECT price FROM ticket_tiers WHERE id = ?")
        .bind(tier_id)
        .fetch_optional(pool)
        .await?;
    let price: Decimal = price
        .ok_or(DatabaseError::NotFound {
            entity: "TicketTier",
            id: tier_id.to_string(),
        })?
        .parse()
        .map_err(|_| DatabaseError::Decode {
            column: "price",
            value: "ticket_tiers.price".to_string(),
        })?;

    let now = Utc::now();
    let booking = Booking {
        id: Uuid::new_v4(),
        user_id,
        tier_id,
        quantity,
        total_amount: price * Decimal::from(quantity),
        status: BookingStatus::AwaitingPayment,
        payment_method: method,
        payment_phone_number: payment_phone.map(str::to_string),
        payment_reference: None,
        expiry_time: now + Duration::minutes(BOOKING_TTL_MINUTES),
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO bookings (id, user_id, tier_id, quantity, total_amount, status,
                              payment_method, payment_phone_number, payment_reference,
                              expiry_time, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(booking.id)
    .bind(booking.user_id)
    .bind(booking.tier_id)
    .bind(booking.quantity)
    .bind(booking.total_amount.to_string())
    .bind(booking.status.as_str())
    .bind(booking.payment_method.as_str())
    .bind(&booking.payment_phone_number)
    .bind(&booking.payment_reference)
    .bind(booking.expiry_time)
    .bind(booking.created_at)
    .execute(pool)
    .await?;

    info!(booking_id = %booking.id, tier_id = %tier_id, quantity, "Created booking");
    Ok(booking)
}

/// Complete a booking on payment confirmation: status transition, inventory
/// increment and ticket emission, exactly once.
///
/// Safe under concurrent invocation. The losing writer of the conditional
/// update retries the lookup and returns the winner's tickets with
/// `newly_completed = false`. A booking past its `expiry_time` but still
/// awaiting payment is completed anyway: provider-confirmed money is honored
/// even after the dialog gave up.
pub async fn complete_booking(
    pool: &SqlitePool,
    booking_id: Uuid,
    payment_ref: &str,
    payer_phone: Option<&str>,
) -> Result<CompletedBooking> {
    for _ in 0..MAX_COMPLETE_ATTEMPTS {
        let booking = get(pool, booking_id).await?.ok_or(DatabaseError::NotFound {
            entity: "Booking",
            id: booking_id.to_string(),
        })?;

        match booking.status {
            BookingStatus::Paid => {
                let tickets = ticket::list_for_booking(pool, booking_id).await?;
                if tickets.is_empty() {
                    // Paid rows always carry tickets; a bare one is corrupt.
                    return Err(DatabaseError::InvalidState {
                        entity: "Booking",
                        id: booking_id.to_string(),
                        status: booking.status.as_str().to_string(),
                    });
                }
                debug!(booking_id = %booking_id, "Booking already completed, returning existing tickets");
                return Ok(CompletedBooking {
                    booking,
                    tickets,
                    newly_completed: false,
                });
            }
            BookingStatus::Pending | BookingStatus::AwaitingPayment => {}
            other => {
                return Err(DatabaseError::InvalidState {
                    entity: "Booking",
                    id: booking_id.to_string(),
                    status: other.as_str().to_string(),
                });
            }
        }

        let mut codes = Vec::with_capacity(booking.quantity as usize);
        for _ in 0..booking.quantity {
            codes.push(ticket::generate_unique_code(pool).await?);
        }

        let mut tx = pool.begin().await?;

        // The single serialization point: first webhook wins.
        let won = sqlx::query(
            r#"
            UPDATE bookings
            SET status = 'PAID',
                payment_reference = ?,
                payment_phone_number = COALESCE(?, payment_phone_number)
            WHERE id = ? AND status IN ('PENDING', 'AWAITING_PAYMENT')
            "#,
        )
        .bind(payment_ref)
        .bind(payer_phone)
        .bind(booking_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if won == 0 {
            // Another writer got there first; re-read and return its tickets.
            tx.rollback().await?;
            continue;
        }

        sqlx::query("UPDATE ticket_tiers SET quantity_sold = quantity_sold + ? WHERE id = ?")
            .bind(booking.quantity)
            .bind(booking.tier_id)
            .execute(&mut *tx)
            .await?;

        let now = Utc::now();
        let mut tickets = Vec::with_capacity(codes.len());
        let mut collided = false;
        for code in &codes {
            let t = Ticket {
                id: Uuid::new_v4(),
                booking_id,
                unique_code: code.clone(),
                is_redeemed: false,
                created_at: now,
            };
            let inserted = sqlx::query(
                r#"
                INSERT INTO tickets (id, booking_id, unique_code, is_redeemed, created_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(t.id)
            .bind(t.booking_id)
            .bind(&t.unique_code)
            .bind(t.is_redeemed)
            .bind(t.created_at)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => tickets.push(t),
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    // A pre-generated code got taken between the existence
                    // check and the insert; regenerate and retry the whole
                    // attempt.
                    collided = true;
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if collided {
            tx.rollback().await?;
            continue;
        }

        tx.commit().await?;

        let booking = get(pool, booking_id).await?.ok_or(DatabaseError::NotFound {
            entity: "Booking",
            id: booking_id.to_string(),
        })?;
        info!(
            booking_id = %booking_id,
            payment_ref,
            tickets = tickets.len(),
            "Booking completed"
        );
        return Ok(CompletedBooking {
            booking,
            tickets,
            newly_completed: true,
        });
    }

    Err(DatabaseError::AlreadyProcessed {
        id: booking_id.to_string(),
    })
}

/// Cancel a paid booking, reversing its inventory.
///
/// Tickets are left in place as receipts of the refunded purchase.
pub async fn cancel_booking(pool: &SqlitePool, booking_id: Uuid, reason: &str) -> Result<Booking> {
    let booking = get(pool, booking_id).await?.ok_or(DatabaseError::NotFound {
        entity: "Booking",
        id: booking_id.to_string(),
    })?;

    let mut tx = pool.begin().await?;

    let cancelled = sqlx::query(
        r#"
        UPDATE bookings
        SET status = 'CANCELLED'
        WHERE id = ? AND status = 'PAID'
        "#,
    )
    .bind(booking_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if cancelled != 1 {
        tx.rollback().await?;
        return Err(DatabaseError::Conflict {
            entity: "Booking",
            id: booking_id.to_string(),
        });
    }

    sqlx::query("UPDATE ticket_tiers SET quantity_sold = quantity_sold - ? WHERE id = ?")
        .bind(booking.quantity)
        .bind(booking.tier_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(booking_id = %booking_id, reason, "Booking cancelled");

    get(pool, booking_id).await?.ok_or(DatabaseError::NotFound {
        entity: "Booking",
        id: booking_id.to_string(),
    })
}
