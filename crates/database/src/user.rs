//! User operations.
//!
//! Users are created on first interaction and identified by their normalized
//! phone number.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::User;

/// Get or create the user for a normalized phone number.
///
/// The display name is refreshed when a newer non-empty value arrives;
/// an absent or empty name never clobbers a stored one.
pub async fn upsert_by_phone(
    pool: &SqlitePool,
    phone: &str,
    name: Option<&str>,
) -> Result<User> {
    let name = name.map(str::trim).filter(|n| !n.is_empty());

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, phone_number, name, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (phone_number)
        DO UPDATE SET name = COALESCE(excluded.name, users.name)
        RETURNING id, phone_number, name, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(phone)
    .bind(name)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    Ok(user)
}

/// Get a user by id.
pub async fn get(pool: &SqlitePool, id: Uuid) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, phone_number, name, created_at
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

/// Get a user by normalized phone number.
pub async fn get_by_phone(pool: &SqlitePool, phone: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, phone_number, name, created_at
        FROM users
        WHERE phone_number = ?
        "#,
    )
    .bind(phone)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_db;

    #[tokio::test]
    async fn test_upsert_creates_then_reuses() {
        let db = test_db().await;

        let created = upsert_by_phone(db.pool(), "254712345678", Some("Amina"))
            .await
            .unwrap();
        let again = upsert_by_phone(db.pool(), "254712345678", None)
            .await
            .unwrap();

        assert_eq!(created.id, again.id);
        assert_eq!(again.name.as_deref(), Some("Amina"));
    }

    #[tokio::test]
    async fn test_upsert_refreshes_name_with_newer_value() {
        let db = test_db().await;

        upsert_by_phone(db.pool(), "254712345678", Some("Amina"))
            .await
            .unwrap();
        let updated = upsert_by_phone(db.pool(), "254712345678", Some("Amina W."))
            .await
            .unwrap();

        assert_eq!(updated.name.as_deref(), Some("Amina W."));
    }

    #[tokio::test]
    async fn test_upsert_empty_name_keeps_existing() {
        let db = test_db().await;

        upsert_by_phone(db.pool(), "254712345678", Some("Amina"))
            .await
            .unwrap();
        let kept = upsert_by_phone(db.pool(), "254712345678", Some("  "))
            .await
            .unwrap();

        assert_eq!(kept.name.as_deref(), Some("Amina"));
    }

    #[tokio::test]
    async fn test_get_by_phone_missing() {
        let db = test_db().await;
        assert!(get_by_phone(db.pool(), "254700000000")
            .await
            .unwrap()
            .is_none());
    }
}
