//! The conversation controller: a per-user state machine over the booking
//! dialog.
//!
//! Every inbound message re-reads the session before acting, so two
//! overlapping messages from one user degrade to a re-prompt rather than a
//! broken dialog. Invalid input never advances the state; global reset
//! keywords work from any state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use database::{booking, event, user, Database, EventCategory, PaymentMethod, TicketTier};
use payments::OrderRequest;
use rust_decimal::Decimal;
use session::{locks, ConvState, LockRegistry, Session, SessionData, SessionStore};
use tracing::{error, info, warn};
use uuid::Uuid;
use whatsapp::InboundMessage;

use crate::error::ConciergeError;
use crate::issuer::TicketIssuer;
use crate::messages;
use crate::traits::{ChatSender, HostedGateway, StkGateway, TicketRenderer};

/// Per-booking ticket cap.
pub const MAX_QUANTITY: u32 = 5;

/// TTL of the reservation lock taken at the quantity step.
pub const RESERVATION_TTL: Duration = Duration::from_secs(600);

/// Window in which a repeated category menu is suppressed.
const MENU_COOLDOWN: Duration = Duration::from_secs(5);

/// Inputs that reset the dialog from any state.
const RESET_KEYWORDS: [&str; 6] = ["hi", "menu", "start", "restart", "reset", "cancel"];

/// The chat-driven booking concierge.
#[derive(Clone)]
pub struct Concierge {
    db: Database,
    sessions: SessionStore,
    locks: LockRegistry,
    sender: Arc<dyn ChatSender>,
    stk: Arc<dyn StkGateway>,
    hosted: Arc<dyn HostedGateway>,
    issuer: TicketIssuer,
    /// Timestamp of the last category menu per phone (anti-loop guard).
    menu_sent: Arc<Mutex<HashMap<String, Instant>>>,
}

impl Concierge {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        sessions: SessionStore,
        locks: LockRegistry,
        sender: Arc<dyn ChatSender>,
        stk: Arc<dyn StkGateway>,
        hosted: Arc<dyn HostedGateway>,
        renderer: Arc<dyn TicketRenderer>,
    ) -> Self {
        let issuer = TicketIssuer::new(sender.clone(), renderer);
        Self {
            db,
            sessions,
            locks,
            sender,
            stk,
            hosted,
            issuer,
            menu_sent: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) fn db(&self) -> &Database {
        &self.db
    }

    pub(crate) fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    pub(crate) fn sender(&self) -> &Arc<dyn ChatSender> {
        &self.sender
    }

    pub(crate) fn hosted_gateway(&self) -> &Arc<dyn HostedGateway> {
        &self.hosted
    }

    pub(crate) fn issuer(&self) -> &TicketIssuer {
        &self.issuer
    }

    /// The session store, exposed for wiring and tests.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Drive one inbound message through the dialog.
    ///
    /// Never fails outward: any error is logged and answered with a generic
    /// apology so the webhook edge can acknowledge unconditionally.
    pub async fn handle_message(&self, msg: &InboundMessage) {
        let phone = match session::normalize(&msg.phone) {
            Ok(phone) => phone,
            Err(e) => {
                warn!(error = %e, "Ignoring message from unparsable sender");
                return;
            }
        };

        if let Err(e) = self.dispatch(&phone, msg).await {
            error!(phone = %session::mask(&phone), error = %e, "Dialog step failed");
            if let Err(send_err) = self.sender.send_text(&phone, messages::GENERIC_ERROR).await {
                error!(error = %send_err, "Failed to send error notice");
            }
        }
    }

    async fn dispatch(&self, phone: &str, msg: &InboundMessage) -> Result<(), ConciergeError> {
        user::upsert_by_phone(self.db.pool(), phone, msg.profile_name.as_deref()).await?;

        let input = msg.input().trim().to_string();

        if is_reset(&input) {
            self.sessions.clear(phone).await;
            return self.show_categories(phone, false).await;
        }

        let session = self.sessions.get(phone).await;
        match session.state {
            ConvState::Idle => self.show_categories(phone, false).await,
            ConvState::SelectingCategory => self.on_category(phone, &input).await,
            ConvState::BrowsingEvents => self.on_event(phone, &input).await,
            ConvState::SelectingTier => self.on_tier(phone, &input).await,
            ConvState::SelectingQuantity => self.on_quantity(phone, &session, &input).await,
            ConvState::AwaitingPaymentMethod => self.on_method(phone, &session, &input).await,
            ConvState::AwaitingPaymentPhone => {
                self.on_payment_phone(phone, &session, &input).await
            }
            ConvState::AwaitingStkPush => self.on_stk_wait(phone).await,
        }
    }

    /// Send the category menu and land in `SELECTING_CATEGORY`.
    ///
    /// The per-phone cooldown suppresses a repeated menu within a few
    /// seconds; retry paths pass `force` to bypass it. The state transition
    /// happens either way.
    async fn show_categories(&self, phone: &str, force: bool) -> Result<(), ConciergeError> {
        let suppressed = {
            let mut sent = self.menu_sent.lock().unwrap();
            let now = Instant::now();
            let recent = sent
                .get(phone)
                .is_some_and(|at| now.duration_since(*at) < MENU_COOLDOWN);
            if !recent || force {
                sent.insert(phone.to_string(), now);
            }
            recent && !force
        };

        if !suppressed {
            self.sender
                .send_list(
                    phone,
                    messages::CATEGORY_MENU_BODY,
                    messages::CATEGORY_MENU_BUTTON,
                    messages::category_sections(),
                )
                .await?;
        }

        self.sessions
            .update(phone, ConvState::SelectingCategory, SessionData::default())
            .await;
        Ok(())
    }

    async fn on_category(&self, phone: &str, input: &str) -> Result<(), ConciergeError> {
        let Some(category) = EventCategory::parse(input) else {
            // Not a category id: re-offer the menu, state unchanged.
            return self.show_categories(phone, true).await;
        };

        let events = event::list_by_category(self.db.pool(), category).await?;
        if events.is_empty() {
            self.sender
                .send_text(phone, &messages::no_events(category))
                .await?;
            return self.show_categories(phone, true).await;
        }

        self.sender
            .send_list(
                phone,
                "Here's what's coming up:",
                "View events",
                messages::event_sections(&events),
            )
            .await?;
        self.sessions
            .update(
                phone,
                ConvState::BrowsingEvents,
                SessionData {
                    selected_category: Some(category.as_str().to_string()),
                    ..Default::default()
                },
            )
            .await;
        Ok(())
    }

    async fn on_event(&self, phone: &str, input: &str) -> Result<(), ConciergeError> {
        if input == messages::BACK_TO_CATEGORIES {
            return self.show_categories(phone, true).await;
        }

        let Ok(event_id) = Uuid::parse_str(input) else {
            self.sender.send_text(phone, messages::UNKNOWN_EVENT).await?;
            return self.show_categories(phone, true).await;
        };

        self.open_event(phone, event_id).await
    }

    /// Send an event's tier list and land in `SELECTING_TIER`.
    async fn open_event(&self, phone: &str, event_id: Uuid) -> Result<(), ConciergeError> {
        let Some((event, tiers)) = event::get_with_tiers(self.db.pool(), event_id).await? else {
            self.sender.send_text(phone, messages::UNKNOWN_EVENT).await?;
            return self.show_categories(phone, true).await;
        };

        let sellable: Vec<TicketTier> =
            tiers.into_iter().filter(|t| t.available() > 0).collect();
        if !event.is_offered(chrono::Utc::now()) || sellable.is_empty() {
            self.sender
                .send_text(phone, messages::EVENT_UNAVAILABLE)
                .await?;
            return self.show_categories(phone, true).await;
        }

        self.sender
            .send_list(
                phone,
                &messages::tier_list_body(&event),
                "View tickets",
                messages::tier_sections(&sellable),
            )
            .await?;
        self.sessions
            .update(
                phone,
                ConvState::SelectingTier,
                SessionData {
                    event_id: Some(event.id),
                    ..Default::default()
                },
            )
            .await;
        Ok(())
    }

    async fn on_tier(&self, phone: &str, input: &str) -> Result<(), ConciergeError> {
        if input == messages::BACK_TO_CATEGORIES {
            return self.show_categories(phone, true).await;
        }

        let Ok(id) = Uuid::parse_str(input) else {
            self.sender.send_text(phone, messages::UNKNOWN_EVENT).await?;
            return self.show_categories(phone, true).await;
        };

        if let Some((tier, parent)) = event::get_tier_with_event(self.db.pool(), id).await? {
            if !parent.is_offered(chrono::Utc::now()) || tier.available() <= 0 {
                self.sender
                    .send_text(phone, messages::TIER_UNAVAILABLE)
                    .await?;
                return self.show_categories(phone, true).await;
            }

            // A tier from a stale list may belong to a different event than
            // the session's; follow the tier and adopt its event.
            self.sender
                .send_text(phone, &messages::quantity_prompt(&tier, MAX_QUANTITY))
                .await?;
            self.sessions
                .update(
                    phone,
                    ConvState::SelectingQuantity,
                    SessionData {
                        event_id: Some(parent.id),
                        tier_id: Some(tier.id),
                        ..Default::default()
                    },
                )
                .await;
            return Ok(());
        }

        // Not a tier id. The platform sometimes delivers a stale list reply
        // carrying an event id; silently re-open that event.
        if event::get_with_tiers(self.db.pool(), id).await?.is_some() {
            return self.open_event(phone, id).await;
        }

        self.sender.send_text(phone, messages::UNKNOWN_EVENT).await?;
        self.show_categories(phone, true).await
    }

    async fn on_quantity(
        &self,
        phone: &str,
        session: &Session,
        input: &str,
    ) -> Result<(), ConciergeError> {
        let quantity = match input.parse::<u32>() {
            Ok(q) if (1..=MAX_QUANTITY).contains(&q) => q,
            _ => {
                self.sender
                    .send_text(phone, messages::INVALID_QUANTITY)
                    .await?;
                return Ok(());
            }
        };

        let Some(tier_id) = session.data.tier_id else {
            // Session data evaporated (TTL, restart); start over politely.
            return self.show_categories(phone, true).await;
        };
        let Some((tier, event)) = event::get_tier_with_event(self.db.pool(), tier_id).await?
        else {
            return self.show_categories(phone, true).await;
        };

        if tier.available() < quantity as i64 {
            self.sender
                .send_text(phone, messages::TIER_UNAVAILABLE)
                .await?;
            return self.show_categories(phone, true).await;
        }

        // The lock is a UX throttle bounding the quantity -> payment window
        // for this user; degrade-open when Redis is down is fine because the
        // booking engine's conditional update is the real barrier.
        let resource = locks::reservation_resource(&tier.id, phone);
        if !self.locks.acquire(&resource, RESERVATION_TTL, phone).await {
            self.sender.send_text(phone, messages::HIGH_DEMAND).await?;
            self.sessions.clear(phone).await;
            return Ok(());
        }

        let total = tier.price * Decimal::from(quantity);
        let (body, buttons) = messages::method_prompt(&event, &tier, quantity, &total);
        self.sender.send_buttons(phone, &body, buttons).await?;
        self.sessions
            .update(
                phone,
                ConvState::AwaitingPaymentMethod,
                SessionData {
                    quantity: Some(quantity),
                    total_amount: Some(total),
                    ..Default::default()
                },
            )
            .await;
        Ok(())
    }

    async fn on_method(
        &self,
        phone: &str,
        session: &Session,
        input: &str,
    ) -> Result<(), ConciergeError> {
        match PaymentMethod::parse(input) {
            Some(PaymentMethod::Mpesa) => {
                let (body, buttons) = messages::payment_phone_prompt(phone);
                self.sender.send_buttons(phone, &body, buttons).await?;
                self.sessions
                    .update(
                        phone,
                        ConvState::AwaitingPaymentPhone,
                        SessionData {
                            payment_method: Some(PaymentMethod::Mpesa.as_str().to_string()),
                            ..Default::default()
                        },
                    )
                    .await;
                Ok(())
            }
            Some(PaymentMethod::Card) => self.start_card_payment(phone, session).await,
            None => {
                // Unrecognized tap or text: re-offer the two methods.
                let (event, tier, quantity, total) = self.booking_inputs(session).await?;
                let (_, buttons) = messages::method_prompt(&event, &tier, quantity, &total);
                self.sender
                    .send_buttons(phone, messages::CHOOSE_METHOD_AGAIN, buttons)
                    .await?;
                Ok(())
            }
        }
    }

    async fn start_card_payment(
        &self,
        phone: &str,
        session: &Session,
    ) -> Result<(), ConciergeError> {
        let (event, tier, quantity, total) = self.booking_inputs(session).await?;
        let user = user::get_by_phone(self.db.pool(), phone)
            .await?
            .ok_or_else(|| ConciergeError::InvalidInput("no user for session".to_string()))?;

        let booking = booking::create_pending(
            self.db.pool(),
            user.id,
            tier.id,
            quantity as i64,
            PaymentMethod::Card,
            Some(phone),
        )
        .await?;

        let order = OrderRequest {
            id: booking.id.to_string(),
            amount: booking.total_amount,
            description: format!("{} — {} x{}", event.title, tier.name, quantity),
            phone_number: phone.to_string(),
        };

        match self.hosted.payment_link(&order).await {
            Ok(link) => {
                self.sender
                    .send_text(phone, &messages::card_link(&total, &link.redirect_url))
                    .await?;
                self.sessions.clear(phone).await;
            }
            Err(e) => {
                warn!(booking_id = %booking.id, error = %e, "Hosted payment link failed");
                self.sender
                    .send_text(phone, messages::CARD_LINK_FAILED)
                    .await?;
                // Stay in AWAITING_PAYMENT_METHOD; the abandoned booking
                // expires on its own.
            }
        }
        Ok(())
    }

    async fn on_payment_phone(
        &self,
        phone: &str,
        session: &Session,
        input: &str,
    ) -> Result<(), ConciergeError> {
        let pay_phone = if input == messages::USE_CURRENT_NUMBER
            || input.eq_ignore_ascii_case("yes")
        {
            phone.to_string()
        } else if input == messages::USE_OTHER_NUMBER || input.eq_ignore_ascii_case("no") {
            self.sender
                .send_text(phone, messages::ASK_OTHER_NUMBER)
                .await?;
            return Ok(());
        } else {
            match session::normalize(input) {
                Ok(normalized) => normalized,
                Err(_) => {
                    self.sender
                        .send_text(phone, messages::INVALID_MPESA_NUMBER)
                        .await?;
                    return Ok(());
                }
            }
        };

        self.start_stk_payment(phone, session, &pay_phone).await
    }

    async fn start_stk_payment(
        &self,
        phone: &str,
        session: &Session,
        pay_phone: &str,
    ) -> Result<(), ConciergeError> {
        let (event, tier, quantity, total) = self.booking_inputs(session).await?;
        let user = user::get_by_phone(self.db.pool(), phone)
            .await?
            .ok_or_else(|| ConciergeError::InvalidInput("no user for session".to_string()))?;

        let booking = booking::create_pending(
            self.db.pool(),
            user.id,
            tier.id,
            quantity as i64,
            PaymentMethod::Mpesa,
            Some(pay_phone),
        )
        .await?;

        match self
            .stk
            .initiate(pay_phone, &booking.total_amount, &booking.id.to_string())
            .await
        {
            Ok(push) => {
                info!(booking_id = %booking.id, invoice_id = %push.invoice_id, "STK push sent");
                self.sender.send_text(phone, messages::STK_SENT).await?;
                self.sessions
                    .update(
                        phone,
                        ConvState::AwaitingStkPush,
                        SessionData {
                            temp_booking_id: Some(booking.id),
                            ..Default::default()
                        },
                    )
                    .await;
            }
            Err(e) => {
                warn!(booking_id = %booking.id, error = %e, "STK initiation failed");
                let notice = if e.is_business_not_eligible() {
                    messages::STK_NOT_ELIGIBLE
                } else {
                    messages::STK_FAILED
                };
                self.sender.send_text(phone, notice).await?;
                let (_, buttons) = messages::method_prompt(&event, &tier, quantity, &total);
                self.sender
                    .send_buttons(phone, messages::CHOOSE_METHOD_AGAIN, buttons)
                    .await?;
                self.sessions
                    .update(phone, ConvState::AwaitingPaymentMethod, SessionData::default())
                    .await;
            }
        }
        Ok(())
    }

    async fn on_stk_wait(&self, phone: &str) -> Result<(), ConciergeError> {
        self.sender
            .send_text(phone, messages::PAYMENT_PROCESSING)
            .await?;
        Ok(())
    }

    /// Resolve the tier, event, quantity and total a payment step needs from
    /// the session, re-reading the catalog.
    async fn booking_inputs(
        &self,
        session: &Session,
    ) -> Result<(database::Event, TicketTier, u32, Decimal), ConciergeError> {
        let tier_id = session
            .data
            .tier_id
            .ok_or_else(|| ConciergeError::InvalidInput("session lost its tier".to_string()))?;
        let quantity = session
            .data
            .quantity
            .ok_or_else(|| ConciergeError::InvalidInput("session lost its quantity".to_string()))?;
        let (tier, event) = event::get_tier_with_event(self.db.pool(), tier_id)
            .await?
            .ok_or_else(|| ConciergeError::InvalidInput("tier disappeared".to_string()))?;
        let total = session
            .data
            .total_amount
            .unwrap_or_else(|| tier.price * Decimal::from(quantity));
        Ok((event, tier, quantity, total))
    }
}

fn is_reset(input: &str) -> bool {
    let lowered = input.to_ascii_lowercase();
    RESET_KEYWORDS.contains(&lowered.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{harness, seed_event, tap, text};
    use session::ConvState;

    #[tokio::test]
    async fn test_hi_resets_and_sends_categories() {
        let h = harness().await;
        h.concierge.handle_message(&text("0712345678", "hi")).await;

        let session = h.concierge.sessions().get("254712345678").await;
        assert_eq!(session.state, ConvState::SelectingCategory);
        assert_eq!(h.sender.list_row_ids(0), vec![
            "UNIVERSITY", "CONCERT", "CLUB", "SOCIAL", "HOLIDAY"
        ]);
    }

    #[tokio::test]
    async fn test_idle_any_text_shows_categories() {
        let h = harness().await;
        h.concierge
            .handle_message(&text("0712345678", "what's on tonight?"))
            .await;

        let session = h.concierge.sessions().get("254712345678").await;
        assert_eq!(session.state, ConvState::SelectingCategory);
        assert_eq!(h.sender.lists().len(), 1);
    }

    #[tokio::test]
    async fn test_menu_guard_suppresses_rapid_resend() {
        let h = harness().await;
        h.concierge.handle_message(&text("0712345678", "hello")).await;
        // Second non-reset message while already in SELECTING_CATEGORY with
        // an unknown id: the corrective path forces a resend.
        h.concierge.handle_message(&text("0712345678", "hello again")).await;
        assert_eq!(h.sender.lists().len(), 2);

        // But a reset keyword right after does not duplicate the menu.
        h.concierge.handle_message(&text("0712345678", "hi")).await;
        assert_eq!(h.sender.lists().len(), 2);
        let session = h.concierge.sessions().get("254712345678").await;
        assert_eq!(session.state, ConvState::SelectingCategory);
    }

    #[tokio::test]
    async fn test_category_selection_lists_events() {
        let h = harness().await;
        let (event, _tier) = seed_event(&h.db, EventCategory::Concert, 500, 10).await;

        h.concierge.handle_message(&text("0712345678", "hi")).await;
        h.concierge.handle_message(&tap("0712345678", "CONCERT")).await;

        let session = h.concierge.sessions().get("254712345678").await;
        assert_eq!(session.state, ConvState::BrowsingEvents);
        assert_eq!(
            session.data.selected_category.as_deref(),
            Some("CONCERT")
        );
        let rows = h.sender.list_row_ids(1);
        assert!(rows.contains(&event.id.to_string()));
        assert!(rows.contains(&messages::BACK_TO_CATEGORIES.to_string()));
    }

    #[tokio::test]
    async fn test_empty_category_reoffers_menu() {
        let h = harness().await;
        h.concierge.handle_message(&text("0712345678", "hi")).await;
        h.concierge.handle_message(&tap("0712345678", "CLUB")).await;

        let session = h.concierge.sessions().get("254712345678").await;
        assert_eq!(session.state, ConvState::SelectingCategory);
        assert!(h.sender.texts().iter().any(|t| t.contains("Nothing coming up")));
    }

    #[tokio::test]
    async fn test_event_selection_lists_tiers() {
        let h = harness().await;
        let (event, tier) = seed_event(&h.db, EventCategory::Concert, 500, 10).await;

        h.concierge.handle_message(&text("0712345678", "hi")).await;
        h.concierge.handle_message(&tap("0712345678", "CONCERT")).await;
        h.concierge
            .handle_message(&tap("0712345678", &event.id.to_string()))
            .await;

        let session = h.concierge.sessions().get("254712345678").await;
        assert_eq!(session.state, ConvState::SelectingTier);
        assert_eq!(session.data.event_id, Some(event.id));
        assert!(h.sender.list_row_ids(2).contains(&tier.id.to_string()));
    }

    #[tokio::test]
    async fn test_sold_out_event_returns_to_categories() {
        let h = harness().await;
        let (event, _tier) = seed_event(&h.db, EventCategory::Concert, 500, 0).await;

        h.concierge.handle_message(&text("0712345678", "hi")).await;
        h.concierge.handle_message(&tap("0712345678", "CONCERT")).await;
        h.concierge
            .handle_message(&tap("0712345678", &event.id.to_string()))
            .await;

        let session = h.concierge.sessions().get("254712345678").await;
        assert_eq!(session.state, ConvState::SelectingCategory);
        assert!(h
            .sender
            .texts()
            .iter()
            .any(|t| t.contains("no longer available")));
    }

    #[tokio::test]
    async fn test_event_switch_mid_tier_selection() {
        // S4: a stale list reply carrying another event's id silently
        // re-opens that event.
        let h = harness().await;
        let (event_a, _) = seed_event(&h.db, EventCategory::Concert, 500, 10).await;
        let (event_b, tier_b) = seed_event(&h.db, EventCategory::Concert, 800, 5).await;

        h.concierge.handle_message(&text("0712345678", "hi")).await;
        h.concierge.handle_message(&tap("0712345678", "CONCERT")).await;
        h.concierge
            .handle_message(&tap("0712345678", &event_a.id.to_string()))
            .await;
        h.concierge
            .handle_message(&tap("0712345678", &event_b.id.to_string()))
            .await;

        let session = h.concierge.sessions().get("254712345678").await;
        assert_eq!(session.state, ConvState::SelectingTier);
        assert_eq!(session.data.event_id, Some(event_b.id));
        // No error text was sent.
        assert!(h.sender.texts().is_empty());
        assert!(h.sender.list_row_ids(3).contains(&tier_b.id.to_string()));
    }

    #[tokio::test]
    async fn test_quantity_selection_locks_and_offers_methods() {
        let h = harness().await;
        let (event, tier) = seed_event(&h.db, EventCategory::University, 500, 10).await;

        h.concierge.handle_message(&text("0712345678", "hi")).await;
        h.concierge.handle_message(&tap("0712345678", "UNIVERSITY")).await;
        h.concierge
            .handle_message(&tap("0712345678", &event.id.to_string()))
            .await;
        h.concierge
            .handle_message(&tap("0712345678", &tier.id.to_string()))
            .await;
        h.concierge.handle_message(&text("0712345678", "2")).await;

        let session = h.concierge.sessions().get("254712345678").await;
        assert_eq!(session.state, ConvState::AwaitingPaymentMethod);
        assert_eq!(session.data.quantity, Some(2));
        assert_eq!(session.data.total_amount, Some(Decimal::new(1000, 0)));

        let (body, ids) = h.sender.last_buttons();
        assert!(body.contains("KES 1000"));
        assert_eq!(ids, vec!["MPESA", "CARD"]);
    }

    #[tokio::test]
    async fn test_out_of_range_quantity_reprompts() {
        // S3: out-of-range input keeps the state and creates nothing.
        let h = harness().await;
        let (event, tier) = seed_event(&h.db, EventCategory::University, 500, 10).await;

        h.concierge.handle_message(&text("0712345678", "hi")).await;
        h.concierge.handle_message(&tap("0712345678", "UNIVERSITY")).await;
        h.concierge
            .handle_message(&tap("0712345678", &event.id.to_string()))
            .await;
        h.concierge
            .handle_message(&tap("0712345678", &tier.id.to_string()))
            .await;
        h.concierge.handle_message(&text("0712345678", "9")).await;

        let session = h.concierge.sessions().get("254712345678").await;
        assert_eq!(session.state, ConvState::SelectingQuantity);
        assert!(h
            .sender
            .texts()
            .iter()
            .any(|t| t.contains("between 1 and 5")));

        h.concierge.handle_message(&text("0712345678", "a few")).await;
        let session = h.concierge.sessions().get("254712345678").await;
        assert_eq!(session.state, ConvState::SelectingQuantity);
    }

    #[tokio::test]
    async fn test_lock_denied_sends_high_demand_and_resets() {
        let h = crate::testing::harness_with_denied_locks().await;
        let (event, tier) = seed_event(&h.db, EventCategory::University, 500, 10).await;

        h.concierge.handle_message(&text("0712345678", "hi")).await;
        h.concierge.handle_message(&tap("0712345678", "UNIVERSITY")).await;
        h.concierge
            .handle_message(&tap("0712345678", &event.id.to_string()))
            .await;
        h.concierge
            .handle_message(&tap("0712345678", &tier.id.to_string()))
            .await;
        h.concierge.handle_message(&text("0712345678", "2")).await;

        let session = h.concierge.sessions().get("254712345678").await;
        assert_eq!(session.state, ConvState::Idle);
        assert!(h.sender.texts().iter().any(|t| t.contains("high demand")));
    }

    #[tokio::test]
    async fn test_mpesa_flow_reaches_awaiting_stk_push() {
        let h = harness().await;
        let (event, tier) = seed_event(&h.db, EventCategory::Concert, 500, 10).await;

        h.concierge.handle_message(&text("0712345678", "hi")).await;
        h.concierge.handle_message(&tap("0712345678", "CONCERT")).await;
        h.concierge
            .handle_message(&tap("0712345678", &event.id.to_string()))
            .await;
        h.concierge
            .handle_message(&tap("0712345678", &tier.id.to_string()))
            .await;
        h.concierge.handle_message(&text("0712345678", "2")).await;
        h.concierge.handle_message(&tap("0712345678", "MPESA")).await;

        let session = h.concierge.sessions().get("254712345678").await;
        assert_eq!(session.state, ConvState::AwaitingPaymentPhone);

        h.concierge
            .handle_message(&tap("0712345678", "USE_CURRENT_NUMBER"))
            .await;

        let session = h.concierge.sessions().get("254712345678").await;
        assert_eq!(session.state, ConvState::AwaitingStkPush);
        let booking_id = session.data.temp_booking_id.expect("booking id stored");

        let stored = booking::get(h.db.pool(), booking_id).await.unwrap().unwrap();
        assert_eq!(stored.status, database::BookingStatus::AwaitingPayment);
        assert_eq!(stored.quantity, 2);
        assert_eq!(
            stored.payment_phone_number.as_deref(),
            Some("254712345678")
        );

        let calls = h.stk.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "254712345678");

        // Any chatter while the push is pending gets the processing notice.
        drop(calls);
        h.concierge.handle_message(&text("0712345678", "anything?")).await;
        assert!(h
            .sender
            .texts()
            .iter()
            .any(|t| t.contains("being processed")));
    }

    #[tokio::test]
    async fn test_mpesa_with_other_number() {
        let h = harness().await;
        let (event, tier) = seed_event(&h.db, EventCategory::Concert, 500, 10).await;

        h.concierge.handle_message(&text("0712345678", "hi")).await;
        h.concierge.handle_message(&tap("0712345678", "CONCERT")).await;
        h.concierge
            .handle_message(&tap("0712345678", &event.id.to_string()))
            .await;
        h.concierge
            .handle_message(&tap("0712345678", &tier.id.to_string()))
            .await;
        h.concierge.handle_message(&text("0712345678", "1")).await;
        h.concierge.handle_message(&tap("0712345678", "MPESA")).await;
        h.concierge
            .handle_message(&tap("0712345678", "USE_OTHER_NUMBER"))
            .await;

        // Garbage number re-prompts without advancing.
        h.concierge.handle_message(&text("0712345678", "not a number")).await;
        let session = h.concierge.sessions().get("254712345678").await;
        assert_eq!(session.state, ConvState::AwaitingPaymentPhone);

        h.concierge
            .handle_message(&text("0712345678", "0733 111 222"))
            .await;
        let session = h.concierge.sessions().get("254712345678").await;
        assert_eq!(session.state, ConvState::AwaitingStkPush);

        let calls = h.stk.calls.lock().unwrap();
        assert_eq!(calls.last().unwrap().0, "254733111222");
    }

    #[tokio::test]
    async fn test_stk_failure_returns_to_method_choice() {
        let h = harness().await;
        let (event, tier) = seed_event(&h.db, EventCategory::Concert, 500, 10).await;
        h.stk.fail.store(true, std::sync::atomic::Ordering::SeqCst);

        h.concierge.handle_message(&text("0712345678", "hi")).await;
        h.concierge.handle_message(&tap("0712345678", "CONCERT")).await;
        h.concierge
            .handle_message(&tap("0712345678", &event.id.to_string()))
            .await;
        h.concierge
            .handle_message(&tap("0712345678", &tier.id.to_string()))
            .await;
        h.concierge.handle_message(&text("0712345678", "1")).await;
        h.concierge.handle_message(&tap("0712345678", "MPESA")).await;
        h.concierge.handle_message(&tap("0712345678", "USE_CURRENT_NUMBER")).await;

        let session = h.concierge.sessions().get("254712345678").await;
        assert_eq!(session.state, ConvState::AwaitingPaymentMethod);
        assert!(h
            .sender
            .texts()
            .iter()
            .any(|t| t.contains("couldn't reach M-Pesa")));
    }

    #[tokio::test]
    async fn test_card_flow_sends_link_and_clears_session() {
        let h = harness().await;
        let (event, tier) = seed_event(&h.db, EventCategory::Social, 1500, 10).await;

        h.concierge.handle_message(&text("0712345678", "hi")).await;
        h.concierge.handle_message(&tap("0712345678", "SOCIAL")).await;
        h.concierge
            .handle_message(&tap("0712345678", &event.id.to_string()))
            .await;
        h.concierge
            .handle_message(&tap("0712345678", &tier.id.to_string()))
            .await;
        h.concierge.handle_message(&text("0712345678", "3")).await;
        h.concierge.handle_message(&tap("0712345678", "CARD")).await;

        let session = h.concierge.sessions().get("254712345678").await;
        assert_eq!(session.state, ConvState::Idle);
        assert!(h
            .sender
            .texts()
            .iter()
            .any(|t| t.contains("https://pay.example/checkout")));

        // The booking exists, awaiting the provider's webhook.
        let orders = h.hosted.orders.lock().unwrap();
        assert_eq!(orders.len(), 1);
        let booking_id = Uuid::parse_str(&orders[0].id).unwrap();
        let stored = booking::get(h.db.pool(), booking_id).await.unwrap().unwrap();
        assert_eq!(stored.status, database::BookingStatus::AwaitingPayment);
        assert_eq!(stored.total_amount, Decimal::new(4500, 0));
    }

    #[test]
    fn test_reset_keywords() {
        for k in ["hi", "HI", "Menu", "cancel", "reset", "start", "restart"] {
            assert!(is_reset(k), "{k} should reset");
        }
        assert!(!is_reset("hello"));
        assert!(!is_reset("2"));
    }
}
