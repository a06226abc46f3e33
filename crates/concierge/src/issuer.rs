//! Ticket issuance: confirmation text and QR image fan-out.
//!
//! Everything here is best-effort. A failed render, upload or send is logged
//! and swallowed; it never fails the completed payment it follows, and one
//! ticket's failure does not stop the others.

use std::sync::Arc;

use database::{Booking, Event, Ticket, TicketTier};
use tracing::{error, info};

use crate::messages;
use crate::traits::{ChatSender, TicketRenderer};

/// Delivers tickets after a completed payment.
#[derive(Clone)]
pub struct TicketIssuer {
    sender: Arc<dyn ChatSender>,
    renderer: Arc<dyn TicketRenderer>,
}

impl TicketIssuer {
    pub fn new(sender: Arc<dyn ChatSender>, renderer: Arc<dyn TicketRenderer>) -> Self {
        Self { sender, renderer }
    }

    /// Send the confirmation text, then fan out one image per ticket.
    pub async fn deliver(
        &self,
        phone: &str,
        event: &Event,
        tier: &TicketTier,
        booking: &Booking,
        tickets: &[Ticket],
    ) {
        let text = messages::confirmation(event, tier, booking, tickets);
        if let Err(e) = self.sender.send_text(phone, &text).await {
            error!(booking_id = %booking.id, error = %e, "Confirmation message failed");
        }

        let caption = messages::ticket_caption(event, tier);
        let deliveries = tickets
            .iter()
            .map(|ticket| self.deliver_one(phone, &caption, ticket));
        futures::future::join_all(deliveries).await;

        info!(
            booking_id = %booking.id,
            tickets = tickets.len(),
            "Ticket delivery finished"
        );
    }

    async fn deliver_one(&self, phone: &str, caption: &str, ticket: &Ticket) {
        let png = match self.renderer.render_png(&ticket.unique_code) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(code = %ticket.unique_code, error = %e, "Ticket render failed");
                return;
            }
        };

        let media_id = match self.sender.upload_media(png, "image/png").await {
            Ok(id) => id,
            Err(e) => {
                error!(code = %ticket.unique_code, error = %e, "Ticket upload failed");
                return;
            }
        };

        if let Err(e) = self.sender.send_image(phone, &media_id, Some(caption)).await {
            error!(code = %ticket.unique_code, error = %e, "Ticket image send failed");
        }
    }
}
