//! Catalog operations over events and ticket tiers.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Event, EventCategory, TicketTier};

/// Insert an event. Used by seeds and admin tooling.
pub async fn create_event(pool: &SqlitePool, event: &Event) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO events (id, title, description, venue, start_time, end_time, is_active, category)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.id)
    .bind(&event.title)
    .bind(&event.description)
    .bind(&event.venue)
    .bind(event.start_time)
    .bind(event.end_time)
    .bind(event.is_active)
    .bind(event.category.as_str())
    .execute(pool)
    .await?;

    Ok(())
}

/// Insert a ticket tier. Used by seeds and admin tooling.
pub async fn create_tier(pool: &SqlitePool, tier: &TicketTier) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ticket_tiers (id, event_id, name, price, quantity, quantity_sold)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(tier.id)
    .bind(tier.event_id)
    .bind(&tier.name)
    .bind(tier.price.to_string())
    .bind(tier.quantity)
    .bind(tier.quantity_sold)
    .execute(pool)
    .await?;

    Ok(())
}

/// List upcoming active events in a category, soonest first.
pub async fn list_by_category(
    pool: &SqlitePool,
    category: EventCategory,
) -> Result<Vec<Event>> {
    let rows = sqlx::query(
        r#"
        SELECT id, title, description, venue, start_time, end_time, is_active, category
        FROM events
        WHERE category = ? AND is_active = 1 AND start_time > ?
        ORDER BY start_time ASC
        "#,
    )
    .bind(category.as_str())
    .bind(Utc::now())
    .fetch_all(pool)
    .await?;

    rows.iter().map(Event::from_row).collect()
}

/// Fetch one event with its tiers, cheapest tier first.
pub async fn get_with_tiers(
    pool: &SqlitePool,
    id: Uuid,
) -> Result<Option<(Event, Vec<TicketTier>)>> {
    let row = sqlx::query(
        r#"
        SELECT id, title, description, venue, start_time, end_time, is_active, category
        FROM events
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let event = Event::from_row(&row)?;

    let tier_rows = sqlx::query(
        r#"
        SELECT id, event_id, name, price, quantity, quantity_sold
        FROM ticket_tiers
        WHERE event_id = ?
        ORDER BY CAST(price AS REAL) ASC
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let tiers = tier_rows
        .iter()
        .map(TicketTier::from_row)
        .collect::<Result<Vec<_>>>()?;

    Ok(Some((event, tiers)))
}

/// Fetch one tier together with its parent event.
pub async fn get_tier_with_event(
    pool: &SqlitePool,
    tier_id: Uuid,
) -> Result<Option<(TicketTier, Event)>> {
    let row = sqlx::query(
        r#"
        SELECT t.id, t.event_id, t.name, t.price, t.quantity, t.quantity_sold,
               e.id AS e_id, e.title, e.description, e.venue, e.start_time, e.end_time,
               e.is_active, e.category
        FROM ticket_tiers t
        JOIN events e ON e.id = t.event_id
        WHERE t.id = ?
        "#,
    )
    .bind(tier_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let tier = TicketTier::from_row(&row)?;

    // The event columns are selected alongside the tier's; only the id column
    // name collides, aliased as e_id.
    use sqlx::Row;
    let category: String = row.try_get("category")?;
    let event = Event {
        id: row.try_get("e_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        venue: row.try_get("venue")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        is_active: row.try_get("is_active")?,
        category: crate::models::EventCategory::parse(&category).ok_or(
            crate::error::DatabaseError::Decode {
                column: "category",
                value: category,
            },
        )?,
    };

    Ok(Some((tier, event)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_event, sample_tier, test_db};
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_list_by_category_filters_inactive_and_past() {
        let db = test_db().await;

        let upcoming = sample_event(EventCategory::Concert, 24);
        let past = sample_event(EventCategory::Concert, -24);
        let mut inactive = sample_event(EventCategory::Concert, 24);
        inactive.is_active = false;
        let other_category = sample_event(EventCategory::Club, 24);

        for e in [&upcoming, &past, &inactive, &other_category] {
            create_event(db.pool(), e).await.unwrap();
        }

        let events = list_by_category(db.pool(), EventCategory::Concert)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, upcoming.id);
    }

    #[tokio::test]
    async fn test_list_by_category_sorted_by_start() {
        let db = test_db().await;

        let later = sample_event(EventCategory::Social, 48);
        let sooner = sample_event(EventCategory::Social, 12);
        create_event(db.pool(), &later).await.unwrap();
        create_event(db.pool(), &sooner).await.unwrap();

        let events = list_by_category(db.pool(), EventCategory::Social)
            .await
            .unwrap();
        assert_eq!(
            events.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![sooner.id, later.id]
        );
    }

    #[tokio::test]
    async fn test_get_with_tiers_sorted_by_price() {
        let db = test_db().await;

        let event = sample_event(EventCategory::University, 24);
        create_event(db.pool(), &event).await.unwrap();

        let vip = TicketTier {
            name: "VIP".to_string(),
            ..sample_tier(event.id, 2000, 20)
        };
        let regular = sample_tier(event.id, 500, 100);
        create_tier(db.pool(), &vip).await.unwrap();
        create_tier(db.pool(), &regular).await.unwrap();

        let (fetched, tiers) = get_with_tiers(db.pool(), event.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, event.id);
        assert_eq!(
            tiers.iter().map(|t| t.id).collect::<Vec<_>>(),
            vec![regular.id, vip.id]
        );
    }

    #[tokio::test]
    async fn test_get_with_tiers_missing_event() {
        let db = test_db().await;
        assert!(get_with_tiers(db.pool(), Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_get_tier_with_event() {
        let db = test_db().await;

        let event = sample_event(EventCategory::Holiday, 24);
        create_event(db.pool(), &event).await.unwrap();
        let tier = sample_tier(event.id, 1500, 50);
        create_tier(db.pool(), &tier).await.unwrap();

        let (fetched_tier, fetched_event) = get_tier_with_event(db.pool(), tier.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched_tier.id, tier.id);
        assert_eq!(fetched_tier.price, Decimal::new(1500, 0));
        assert_eq!(fetched_event.id, event.id);
    }
}
