//! The Tikiti concierge: conversation state machine, ticket issuance and
//! webhook ingress.
//!
//! The [`Concierge`] drives each user through the booking dialog (category →
//! event → tier → quantity → payment), settles provider payment webhooks
//! through the booking engine, and delivers tickets as QR images.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use concierge::{Concierge, QrTicketRenderer};
//! use database::Database;
//! use payments::{HostedClient, StkClient};
//! use session::{LockRegistry, SessionStore};
//! use whatsapp::{WhatsappClient, WhatsappConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::connect("sqlite:tikiti.db?mode=rwc").await?;
//! db.migrate().await?;
//! let redis = session::connect_redis("redis://127.0.0.1:6379").await;
//!
//! let concierge = Concierge::new(
//!     db,
//!     SessionStore::new(redis.clone(), Duration::from_secs(600)),
//!     LockRegistry::new(redis),
//!     Arc::new(WhatsappClient::new(WhatsappConfig::new("token", "12345"))?),
//!     Arc::new(StkClient::from_env()?),
//!     Arc::new(HostedClient::from_env()?),
//!     Arc::new(QrTicketRenderer),
//! );
//! # let _ = concierge;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod error;
pub mod issuer;
pub mod messages;
pub mod qr;
pub mod testing;
pub mod traits;
pub mod webhooks;

pub use controller::{Concierge, MAX_QUANTITY};
pub use error::ConciergeError;
pub use issuer::TicketIssuer;
pub use qr::QrTicketRenderer;
pub use traits::{ChatSender, HostedGateway, StkGateway, TicketRenderer};
pub use webhooks::{HostedAck, StkWebhook, STK_ACK, STK_CHALLENGE};
