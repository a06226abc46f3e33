//! Test doubles and fixtures for the concierge.
//!
//! A recording sender, scriptable payment gateways and a no-op renderer,
//! plus a harness that wires them to an in-memory database, fallback-only
//! sessions and a permissive lock registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use database::{event, Database, Event, EventCategory, TicketTier};
use payments::{
    OrderRequest, PaymentError, PaymentLink, PaymentProvider, StkPush, TransactionStatus,
};
use session::{LockRegistry, SessionStore};
use uuid::Uuid;
use whatsapp::outbound::{Button, ListSection};
use whatsapp::{InboundMessage, MessageKind, WhatsappError};

use crate::controller::Concierge;
use crate::error::ConciergeError;
use crate::traits::{ChatSender, HostedGateway, StkGateway, TicketRenderer};

/// Everything a recording sender saw, in order.
#[derive(Debug, Clone)]
pub enum Outbound {
    Text {
        to: String,
        body: String,
    },
    Buttons {
        to: String,
        body: String,
        ids: Vec<String>,
    },
    List {
        to: String,
        body: String,
        row_ids: Vec<String>,
    },
    Image {
        to: String,
        media_id: String,
        caption: Option<String>,
    },
    Read {
        message_id: String,
    },
}

/// A [`ChatSender`] that records every call.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<Outbound>>,
    uploads: AtomicUsize,
}

impl RecordingSender {
    /// All text bodies sent so far.
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                Outbound::Text { body, .. } => Some(body.clone()),
                _ => None,
            })
            .collect()
    }

    /// All list messages sent so far.
    pub fn lists(&self) -> Vec<Vec<String>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                Outbound::List { row_ids, .. } => Some(row_ids.clone()),
                _ => None,
            })
            .collect()
    }

    /// Row ids of the n-th list message.
    pub fn list_row_ids(&self, n: usize) -> Vec<String> {
        self.lists().into_iter().nth(n).unwrap_or_default()
    }

    /// Body and button ids of the last button message.
    pub fn last_buttons(&self) -> (String, Vec<String>) {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|m| match m {
                Outbound::Buttons { body, ids, .. } => Some((body.clone(), ids.clone())),
                _ => None,
            })
            .expect("no button message sent")
    }
}

#[async_trait]
impl ChatSender for RecordingSender {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), WhatsappError> {
        self.sent.lock().unwrap().push(Outbound::Text {
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: Vec<Button>,
    ) -> Result<(), WhatsappError> {
        self.sent.lock().unwrap().push(Outbound::Buttons {
            to: to.to_string(),
            body: body.to_string(),
            ids: buttons.into_iter().map(|b| b.id).collect(),
        });
        Ok(())
    }

    async fn send_list(
        &self,
        to: &str,
        body: &str,
        _button: &str,
        sections: Vec<ListSection>,
    ) -> Result<(), WhatsappError> {
        self.sent.lock().unwrap().push(Outbound::List {
            to: to.to_string(),
            body: body.to_string(),
            row_ids: sections
                .into_iter()
                .flat_map(|s| s.rows.into_iter().map(|r| r.id))
                .collect(),
        });
        Ok(())
    }

    async fn send_image(
        &self,
        to: &str,
        media_id: &str,
        caption: Option<&str>,
    ) -> Result<(), WhatsappError> {
        self.sent.lock().unwrap().push(Outbound::Image {
            to: to.to_string(),
            media_id: media_id.to_string(),
            caption: caption.map(str::to_string),
        });
        Ok(())
    }

    async fn upload_media(&self, _bytes: Vec<u8>, _mime: &str) -> Result<String, WhatsappError> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(format!("media-{n}"))
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), WhatsappError> {
        self.sent.lock().unwrap().push(Outbound::Read {
            message_id: message_id.to_string(),
        });
        Ok(())
    }
}

/// A scriptable [`StkGateway`].
#[derive(Default)]
pub struct MockStk {
    /// Fail the next initiations with a provider error.
    pub fail: AtomicBool,
    /// `(phone, amount, api_ref)` per call.
    pub calls: Mutex<Vec<(String, Decimal, String)>>,
}

#[async_trait]
impl StkGateway for MockStk {
    async fn initiate(
        &self,
        phone: &str,
        amount: &Decimal,
        api_ref: &str,
    ) -> Result<StkPush, PaymentError> {
        self.calls
            .lock()
            .unwrap()
            .push((phone.to_string(), *amount, api_ref.to_string()));

        if self.fail.load(Ordering::SeqCst) {
            return Err(PaymentError::Provider {
                provider: PaymentProvider::Stk,
                code: "503".to_string(),
                message: "gateway busy".to_string(),
            });
        }

        Ok(StkPush {
            invoice_id: "INV-TEST".to_string(),
            state: "PENDING".to_string(),
        })
    }
}

/// A scriptable [`HostedGateway`].
#[derive(Default)]
pub struct MockHosted {
    /// Orders passed to `payment_link`.
    pub orders: Mutex<Vec<OrderRequest>>,
    statuses: Mutex<HashMap<String, TransactionStatus>>,
}

impl MockHosted {
    /// Script the status returned for a tracking id.
    pub fn set_status(&self, order_tracking_id: &str, status: TransactionStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(order_tracking_id.to_string(), status);
    }
}

#[async_trait]
impl HostedGateway for MockHosted {
    async fn payment_link(&self, order: &OrderRequest) -> Result<PaymentLink, PaymentError> {
        self.orders.lock().unwrap().push(order.clone());
        Ok(PaymentLink {
            redirect_url: "https://pay.example/checkout".to_string(),
            order_tracking_id: "OT-TEST".to_string(),
        })
    }

    async fn transaction_status(
        &self,
        order_tracking_id: &str,
    ) -> Result<TransactionStatus, PaymentError> {
        self.statuses
            .lock()
            .unwrap()
            .get(order_tracking_id)
            .cloned()
            .ok_or_else(|| PaymentError::Provider {
                provider: PaymentProvider::Hosted,
                code: "404".to_string(),
                message: format!("unknown transaction {order_tracking_id}"),
            })
    }
}

/// A renderer that returns a fixed byte stub.
pub struct StubRenderer;

impl TicketRenderer for StubRenderer {
    fn render_png(&self, _code: &str) -> Result<Vec<u8>, ConciergeError> {
        Ok(vec![0x89, 0x50, 0x4E, 0x47])
    }
}

/// A fully wired concierge over test doubles.
pub struct Harness {
    pub concierge: Concierge,
    pub db: Database,
    pub sender: Arc<RecordingSender>,
    pub stk: Arc<MockStk>,
    pub hosted: Arc<MockHosted>,
}

async fn build_harness(locks: LockRegistry) -> Harness {
    let db = Database::connect_in_memory().await.unwrap();
    db.migrate().await.unwrap();

    let sender = Arc::new(RecordingSender::default());
    let stk = Arc::new(MockStk::default());
    let hosted = Arc::new(MockHosted::default());

    let concierge = Concierge::new(
        db.clone(),
        SessionStore::new(None, Duration::from_secs(600)),
        locks,
        sender.clone(),
        stk.clone(),
        hosted.clone(),
        Arc::new(StubRenderer),
    );

    Harness {
        concierge,
        db,
        sender,
        stk,
        hosted,
    }
}

/// A harness whose lock registry grants every acquire.
pub async fn harness() -> Harness {
    build_harness(LockRegistry::new(None)).await
}

/// A harness whose lock registry denies every acquire.
pub async fn harness_with_denied_locks() -> Harness {
    build_harness(LockRegistry::denying()).await
}

/// Seed one active future event with a single tier.
pub async fn seed_event(
    db: &Database,
    category: EventCategory,
    price: i64,
    capacity: i64,
) -> (Event, TicketTier) {
    let ev = Event {
        id: Uuid::new_v4(),
        title: format!("Test {} Night", category.as_str()),
        description: None,
        venue: "Carnivore Grounds".to_string(),
        start_time: chrono::Utc::now() + chrono::Duration::hours(48),
        end_time: None,
        is_active: true,
        category,
    };
    event::create_event(db.pool(), &ev).await.unwrap();

    let tier = TicketTier {
        id: Uuid::new_v4(),
        event_id: ev.id,
        name: "Regular".to_string(),
        price: Decimal::new(price, 0),
        quantity: capacity,
        quantity_sold: 0,
    };
    event::create_tier(db.pool(), &tier).await.unwrap();

    (ev, tier)
}

/// An inbound text message.
pub fn text(phone: &str, body: &str) -> InboundMessage {
    InboundMessage {
        phone: phone.to_string(),
        message_id: format!("wamid.test.{body}"),
        kind: MessageKind::Text,
        body: body.to_string(),
        reply_id: None,
        profile_name: Some("Test User".to_string()),
    }
}

/// An inbound interactive reply carrying an element id.
pub fn tap(phone: &str, id: &str) -> InboundMessage {
    InboundMessage {
        phone: phone.to_string(),
        message_id: format!("wamid.test.{id}"),
        kind: MessageKind::Interactive,
        body: id.to_string(),
        reply_id: Some(id.to_string()),
        profile_name: None,
    }
}
