//! Ticket operations: unique code generation and lookups.

use rand::RngCore;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{DatabaseError, Result};
use crate::models::Ticket;

/// Attempts before code generation gives up.
const MAX_CODE_ATTEMPTS: u32 = 10;

/// Render 4 random bytes as an `XXXX-XXXX` uppercase hex code.
fn render_code(bytes: [u8; 4]) -> String {
    format!(
        "{:02X}{:02X}-{:02X}{:02X}",
        bytes[0], bytes[1], bytes[2], bytes[3]
    )
}

/// Draw a candidate code that does not yet exist in the ticket table.
///
/// The uniqueness constraint on `unique_code` is the backstop; this loop
/// keeps the expected insert-time collisions at zero. Gives up after
/// [`MAX_CODE_ATTEMPTS`] draws.
pub async fn generate_unique_code(pool: &SqlitePool) -> Result<String> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = {
            let mut bytes = [0u8; 4];
            rand::thread_rng().fill_bytes(&mut bytes);
            render_code(bytes)
        };

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tickets WHERE unique_code = ?)")
                .bind(&code)
                .fetch_one(pool)
                .await?;

        if !exists {
            return Ok(code);
        }
    }

    Err(DatabaseError::CodeGenerationExhausted)
}

/// List the tickets of a booking, oldest first.
pub async fn list_for_booking(pool: &SqlitePool, booking_id: Uuid) -> Result<Vec<Ticket>> {
    let tickets = sqlx::query_as::<_, Ticket>(
        r#"
        SELECT id, booking_id, unique_code, is_redeemed, created_at
        FROM tickets
        WHERE booking_id = ?
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(booking_id)
    .fetch_all(pool)
    .await?;

    Ok(tickets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;

    #[test]
    fn test_render_code_format() {
        let code = render_code([0xAB, 0x01, 0xFF, 0x3C]);
        assert_eq!(code, "AB01-FF3C");
        assert_eq!(code.len(), 9);
    }

    #[tokio::test]
    async fn test_generate_unique_code_shape() {
        let db = test_db().await;
        let code = generate_unique_code(db.pool()).await.unwrap();

        assert_eq!(code.len(), 9);
        assert_eq!(&code[4..5], "-");
        assert!(code
            .chars()
            .all(|c| c == '-' || c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[tokio::test]
    async fn test_list_for_missing_booking_is_empty() {
        let db = test_db().await;
        let tickets = list_for_booking(db.pool(), Uuid::new_v4()).await.unwrap();
        assert!(tickets.is_empty());
    }
}
