//! Webhook ingress: user messages and the two payment providers.
//!
//! Each handler acknowledges in its provider's expected shape no matter what
//! happened internally; failures are logged, never propagated, so providers
//! are not provoked into redelivery storms.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use database::{booking, event, user, CompletedBooking};
use session::locks;

use crate::controller::Concierge;
use crate::error::ConciergeError;
use whatsapp::WebhookPayload;

/// The challenge value the STK provider must present.
pub const STK_CHALLENGE: &str = "complete";

/// The STK provider's expected acknowledgement body.
pub const STK_ACK: &str = "OK";

/// STK provider webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct StkWebhook {
    #[serde(default)]
    pub challenge: String,
    #[serde(default)]
    pub state: String,
    /// The booking id, echoed back from payment initiation.
    #[serde(default)]
    pub api_ref: String,
    /// The provider's payment reference.
    #[serde(default)]
    pub invoice_id: String,
    /// The paying account's phone, when reported.
    #[serde(default)]
    pub account: Option<String>,
}

/// Echo acknowledgement for the hosted provider's webhook and pings.
#[derive(Debug, Clone, Serialize)]
pub struct HostedAck {
    #[serde(rename = "orderNotificationType")]
    pub order_notification_type: String,
    #[serde(rename = "orderTrackingId")]
    pub order_tracking_id: String,
    pub status: u16,
}

impl Concierge {
    /// Process an inbound user-message webhook.
    ///
    /// Fires the read receipt without waiting on it, then drives the dialog.
    /// Never fails outward; the HTTP edge always answers 200.
    pub async fn handle_user_webhook(&self, payload: &WebhookPayload) {
        let Some(message) = payload.first_message() else {
            debug!("User webhook without a message (status update); ignoring");
            return;
        };

        let sender = self.sender().clone();
        let message_id = message.message_id.clone();
        tokio::spawn(async move {
            if let Err(e) = sender.mark_read(&message_id).await {
                debug!(error = %e, "Read receipt failed");
            }
        });

        self.handle_message(&message).await;
    }

    /// Process the STK provider's payment webhook.
    ///
    /// Always returns the provider's `"OK"` acknowledgement.
    pub async fn handle_stk_webhook(&self, payload: &StkWebhook) -> &'static str {
        if payload.challenge != STK_CHALLENGE {
            warn!("STK webhook with wrong challenge; ignoring");
            return STK_ACK;
        }
        if payload.state != "COMPLETE" {
            debug!(state = %payload.state, "STK webhook for non-final state; ignoring");
            return STK_ACK;
        }

        let Ok(booking_id) = Uuid::parse_str(&payload.api_ref) else {
            warn!(api_ref = %payload.api_ref, "STK webhook with unparsable booking reference");
            return STK_ACK;
        };

        match self
            .settle_payment(booking_id, &payload.invoice_id, payload.account.as_deref())
            .await
        {
            Ok(Some(completed)) => self.spawn_notification(completed),
            Ok(None) => {}
            Err(e) => error!(booking_id = %booking_id, error = %e, "STK settlement failed"),
        }

        STK_ACK
    }

    /// Answer the hosted provider's GET validation ping: a pure echo, no
    /// booking touched.
    pub fn hosted_ping(&self, order_tracking_id: &str, notification_type: &str) -> HostedAck {
        HostedAck {
            order_notification_type: notification_type.to_string(),
            order_tracking_id: order_tracking_id.to_string(),
            status: 200,
        }
    }

    /// Process the hosted provider's payment notification.
    ///
    /// The body is always the echo shape; `status` mirrors the outcome.
    pub async fn handle_hosted_webhook(
        &self,
        order_tracking_id: &str,
        notification_type: &str,
    ) -> HostedAck {
        let status = match self.process_hosted(order_tracking_id).await {
            Ok(()) => 200,
            Err(e) => {
                error!(order_tracking_id, error = %e, "Hosted settlement failed");
                500
            }
        };
        HostedAck {
            order_notification_type: notification_type.to_string(),
            order_tracking_id: order_tracking_id.to_string(),
            status,
        }
    }

    async fn process_hosted(&self, order_tracking_id: &str) -> Result<(), ConciergeError> {
        let status = self
            .hosted_gateway()
            .transaction_status(order_tracking_id)
            .await?;

        if !status.is_completed() {
            debug!(order_tracking_id, "Hosted transaction not completed; nothing to do");
            return Ok(());
        }

        let booking_ref = status.booking_reference().ok_or_else(|| {
            ConciergeError::InvalidInput("transaction status without merchant reference".to_string())
        })?;
        let booking_id = Uuid::parse_str(booking_ref).map_err(|_| {
            ConciergeError::InvalidInput(format!("unparsable merchant reference: {booking_ref}"))
        })?;
        let payment_ref = status.payment_reference().unwrap_or(order_tracking_id);

        if let Some(completed) = self
            .settle_payment(booking_id, payment_ref, status.payer_phone())
            .await?
        {
            self.spawn_notification(completed);
        }
        Ok(())
    }

    /// Drive the booking engine for a confirmed payment.
    ///
    /// Returns the completion only when this call performed the transition;
    /// a duplicate webhook settles to `None` and sends nothing.
    pub async fn settle_payment(
        &self,
        booking_id: Uuid,
        payment_ref: &str,
        payer_phone: Option<&str>,
    ) -> Result<Option<CompletedBooking>, ConciergeError> {
        let completed =
            booking::complete_booking(self.db().pool(), booking_id, payment_ref, payer_phone)
                .await?;

        if !completed.newly_completed {
            debug!(booking_id = %booking_id, "Duplicate payment webhook; already settled");
            return Ok(None);
        }

        info!(booking_id = %booking_id, "Payment settled, dispatching tickets");
        Ok(Some(completed))
    }

    /// Fire the confirmation and ticket fan-out in the background.
    fn spawn_notification(&self, completed: CompletedBooking) {
        let this = self.clone();
        tokio::spawn(async move {
            this.notify_completion(&completed).await;
        });
    }

    /// Send the confirmation and ticket images for a fresh completion.
    ///
    /// Best-effort end to end: every failure is logged and swallowed.
    pub async fn notify_completion(&self, completed: &CompletedBooking) {
        let booking = &completed.booking;

        let buyer = match user::get(self.db().pool(), booking.user_id).await {
            Ok(Some(u)) => u,
            Ok(None) => {
                error!(booking_id = %booking.id, "Completed booking without a user");
                return;
            }
            Err(e) => {
                error!(booking_id = %booking.id, error = %e, "User lookup failed");
                return;
            }
        };

        let (tier, event) = match event::get_tier_with_event(self.db().pool(), booking.tier_id).await
        {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                error!(booking_id = %booking.id, "Completed booking without a tier");
                return;
            }
            Err(e) => {
                error!(booking_id = %booking.id, error = %e, "Tier lookup failed");
                return;
            }
        };

        // The purchase is settled; drop the reservation throttle early
        // instead of waiting out its TTL.
        self.locks()
            .force_release(&locks::reservation_resource(&tier.id, &buyer.phone_number))
            .await;

        self.issuer()
            .deliver(
                &buyer.phone_number,
                &event,
                &tier,
                booking,
                &completed.tickets,
            )
            .await;
    }
}
