//! Trait seams toward the messaging platform, the payment providers and the
//! ticket image renderer.
//!
//! Production wires the real clients; tests substitute recording mocks. The
//! trait-based design keeps the dialog and webhook logic free of network
//! concerns.

use async_trait::async_trait;
use rust_decimal::Decimal;

use payments::{HostedClient, OrderRequest, PaymentError, PaymentLink, StkClient, StkPush, TransactionStatus};
use whatsapp::outbound::{Button, ListSection};
use whatsapp::{WhatsappClient, WhatsappError};

/// Outbound messaging operations the concierge needs.
#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), WhatsappError>;

    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: Vec<Button>,
    ) -> Result<(), WhatsappError>;

    async fn send_list(
        &self,
        to: &str,
        body: &str,
        button: &str,
        sections: Vec<ListSection>,
    ) -> Result<(), WhatsappError>;

    async fn send_image(
        &self,
        to: &str,
        media_id: &str,
        caption: Option<&str>,
    ) -> Result<(), WhatsappError>;

    async fn upload_media(&self, bytes: Vec<u8>, mime: &str) -> Result<String, WhatsappError>;

    async fn mark_read(&self, message_id: &str) -> Result<(), WhatsappError>;
}

#[async_trait]
impl ChatSender for WhatsappClient {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), WhatsappError> {
        WhatsappClient::send_text(self, to, body).await.map(|_| ())
    }

    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: Vec<Button>,
    ) -> Result<(), WhatsappError> {
        WhatsappClient::send_buttons(self, to, body, buttons)
            .await
            .map(|_| ())
    }

    async fn send_list(
        &self,
        to: &str,
        body: &str,
        button: &str,
        sections: Vec<ListSection>,
    ) -> Result<(), WhatsappError> {
        WhatsappClient::send_list(self, to, body, button, sections)
            .await
            .map(|_| ())
    }

    async fn send_image(
        &self,
        to: &str,
        media_id: &str,
        caption: Option<&str>,
    ) -> Result<(), WhatsappError> {
        WhatsappClient::send_image(self, to, media_id, caption)
            .await
            .map(|_| ())
    }

    async fn upload_media(&self, bytes: Vec<u8>, mime: &str) -> Result<String, WhatsappError> {
        WhatsappClient::upload_media(self, bytes, mime).await
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), WhatsappError> {
        WhatsappClient::mark_read(self, message_id).await
    }
}

/// The STK push provider.
#[async_trait]
pub trait StkGateway: Send + Sync {
    async fn initiate(
        &self,
        phone: &str,
        amount: &Decimal,
        api_ref: &str,
    ) -> Result<StkPush, PaymentError>;
}

#[async_trait]
impl StkGateway for StkClient {
    async fn initiate(
        &self,
        phone: &str,
        amount: &Decimal,
        api_ref: &str,
    ) -> Result<StkPush, PaymentError> {
        StkClient::initiate(self, phone, amount, api_ref).await
    }
}

/// The hosted redirect provider.
#[async_trait]
pub trait HostedGateway: Send + Sync {
    async fn payment_link(&self, order: &OrderRequest) -> Result<PaymentLink, PaymentError>;

    async fn transaction_status(
        &self,
        order_tracking_id: &str,
    ) -> Result<TransactionStatus, PaymentError>;
}

#[async_trait]
impl HostedGateway for HostedClient {
    async fn payment_link(&self, order: &OrderRequest) -> Result<PaymentLink, PaymentError> {
        HostedClient::payment_link(self, order).await
    }

    async fn transaction_status(
        &self,
        order_tracking_id: &str,
    ) -> Result<TransactionStatus, PaymentError> {
        HostedClient::transaction_status(self, order_tracking_id).await
    }
}

/// Renders a ticket code into image bytes for delivery.
pub trait TicketRenderer: Send + Sync {
    fn render_png(&self, code: &str) -> Result<Vec<u8>, crate::error::ConciergeError>;
}
