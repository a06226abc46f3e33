//! WhatsApp Cloud API client.
//!
//! Outbound messaging (text, interactive buttons and lists, images by media
//! id), media upload, read receipts, plus the inbound-webhook payload types
//! and their normalization into a single [`InboundMessage`] shape.
//!
//! # Example
//!
//! ```no_run
//! use whatsapp::{WhatsappClient, WhatsappConfig};
//!
//! # async fn example() -> Result<(), whatsapp::WhatsappError> {
//! let config = WhatsappConfig::new("ACCESS_TOKEN", "123456789");
//! let client = WhatsappClient::new(config)?;
//! client.send_text("254712345678", "Karibu!").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod inbound;
pub mod outbound;

pub use client::WhatsappClient;
pub use config::WhatsappConfig;
pub use error::WhatsappError;
pub use inbound::{verify_subscription, InboundMessage, MessageKind, WebhookPayload};
pub use outbound::{Button, ListRow, ListSection};
