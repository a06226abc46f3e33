//! End-to-end booking flow: dialog, STK payment webhook, ticket delivery.
//!
//! Drives the concierge exactly as the webhook edge would, over an in-memory
//! database and recording test doubles.

use std::time::Duration;

use concierge::testing::{harness, seed_event, tap, text, Outbound};
use concierge::StkWebhook;
use database::{booking, BookingStatus, EventCategory};
use rust_decimal::Decimal;
use session::ConvState;

/// Poll until `check` passes or a couple of seconds elapse.
async fn wait_for<F: Fn() -> bool>(check: F, what: &str) {
    for _ in 0..40 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn test_happy_stk_purchase_end_to_end() {
    let h = harness().await;
    let (event, tier) = seed_event(&h.db, EventCategory::University, 500, 10).await;

    // "hi" -> category list.
    h.concierge.handle_message(&text("0712345678", "hi")).await;
    assert!(h.sender.list_row_ids(0).contains(&"UNIVERSITY".to_string()));

    // Category -> events list.
    h.concierge.handle_message(&tap("0712345678", "UNIVERSITY")).await;
    assert!(h
        .sender
        .list_row_ids(1)
        .contains(&event.id.to_string()));

    // Event -> tier list.
    h.concierge
        .handle_message(&tap("0712345678", &event.id.to_string()))
        .await;
    assert!(h.sender.list_row_ids(2).contains(&tier.id.to_string()));

    // Tier -> quantity prompt.
    h.concierge
        .handle_message(&tap("0712345678", &tier.id.to_string()))
        .await;

    // Quantity 2 -> method buttons with the computed total.
    h.concierge.handle_message(&text("0712345678", "2")).await;
    let (body, ids) = h.sender.last_buttons();
    assert!(body.contains("KES 1000"));
    assert_eq!(ids, vec!["MPESA", "CARD"]);

    // M-Pesa with the chat's own number -> STK push initiated.
    h.concierge.handle_message(&tap("0712345678", "MPESA")).await;
    h.concierge
        .handle_message(&tap("0712345678", "USE_CURRENT_NUMBER"))
        .await;

    let session = h.concierge.sessions().get("254712345678").await;
    assert_eq!(session.state, ConvState::AwaitingStkPush);
    let booking_id = session.data.temp_booking_id.expect("booking id in session");

    {
        let calls = h.stk.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (phone, amount, api_ref) = &calls[0];
        assert_eq!(phone, "254712345678");
        assert_eq!(*amount, Decimal::new(1000, 0));
        assert_eq!(*api_ref, booking_id.to_string());
    }

    // The provider confirms the payment.
    let ack = h
        .concierge
        .handle_stk_webhook(&StkWebhook {
            challenge: "complete".to_string(),
            state: "COMPLETE".to_string(),
            api_ref: booking_id.to_string(),
            invoice_id: "INV-77".to_string(),
            account: Some("254712345678".to_string()),
        })
        .await;
    assert_eq!(ack, "OK");

    // Booking paid, inventory moved, tickets minted.
    let stored = booking::get(h.db.pool(), booking_id).await.unwrap().unwrap();
    assert_eq!(stored.status, BookingStatus::Paid);
    assert_eq!(stored.payment_reference.as_deref(), Some("INV-77"));

    let sold: i64 = sqlx::query_scalar("SELECT quantity_sold FROM ticket_tiers WHERE id = ?")
        .bind(tier.id)
        .fetch_one(h.db.pool())
        .await
        .unwrap();
    assert_eq!(sold, 2);

    let tickets = database::ticket::list_for_booking(h.db.pool(), booking_id)
        .await
        .unwrap();
    assert_eq!(tickets.len(), 2);
    for t in &tickets {
        assert_eq!(t.unique_code.len(), 9);
        assert_eq!(&t.unique_code[4..5], "-");
    }

    // One confirmation text and two ticket images arrive asynchronously.
    wait_for(
        || {
            let sent = h.sender.sent.lock().unwrap();
            let images = sent
                .iter()
                .filter(|m| matches!(m, Outbound::Image { .. }))
                .count();
            let confirmations = sent
                .iter()
                .filter(
                    |m| matches!(m, Outbound::Text { body, .. } if body.contains("Payment received")),
                )
                .count();
            confirmations == 1 && images == 2
        },
        "confirmation and ticket images",
    )
    .await;

    // A duplicate webhook changes nothing and resends nothing.
    let before = h.sender.sent.lock().unwrap().len();
    h.concierge
        .handle_stk_webhook(&StkWebhook {
            challenge: "complete".to_string(),
            state: "COMPLETE".to_string(),
            api_ref: booking_id.to_string(),
            invoice_id: "INV-78".to_string(),
            account: None,
        })
        .await;

    let sold_after: i64 = sqlx::query_scalar("SELECT quantity_sold FROM ticket_tiers WHERE id = ?")
        .bind(tier.id)
        .fetch_one(h.db.pool())
        .await
        .unwrap();
    assert_eq!(sold_after, 2);
    let stored = booking::get(h.db.pool(), booking_id).await.unwrap().unwrap();
    assert_eq!(stored.payment_reference.as_deref(), Some("INV-77"));
    assert_eq!(h.sender.sent.lock().unwrap().len(), before);
}

#[tokio::test]
async fn test_user_webhook_payload_drives_dialog() {
    let h = harness().await;

    let payload: whatsapp::WebhookPayload = serde_json::from_str(
        r#"{
          "object": "whatsapp_business_account",
          "entry": [{
            "changes": [{
              "value": {
                "contacts": [{"profile": {"name": "Amina"}, "wa_id": "254712345678"}],
                "messages": [{
                  "from": "254712345678",
                  "id": "wamid.flow.1",
                  "type": "text",
                  "text": {"body": "hi"}
                }]
              }
            }]
          }]
        }"#,
    )
    .unwrap();

    h.concierge.handle_user_webhook(&payload).await;

    // The dialog advanced and the category menu went out.
    let session = h.concierge.sessions().get("254712345678").await;
    assert_eq!(session.state, ConvState::SelectingCategory);
    assert_eq!(h.sender.lists().len(), 1);

    // The read receipt is fire-and-forget.
    wait_for(
        || {
            h.sender
                .sent
                .lock()
                .unwrap()
                .iter()
                .any(|m| matches!(m, Outbound::Read { message_id } if message_id == "wamid.flow.1"))
        },
        "read receipt",
    )
    .await;

    // The user exists with the profile name.
    let user = database::user::get_by_phone(h.db.pool(), "254712345678")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.name.as_deref(), Some("Amina"));
}
