//! Umbrella error type for the concierge.

use thiserror::Error;

/// Errors surfaced by dialog steps and webhook processing.
#[derive(Debug, Error)]
pub enum ConciergeError {
    /// Persistence failure.
    #[error("database error: {0}")]
    Database(#[from] database::DatabaseError),

    /// Messaging platform failure.
    #[error("messaging error: {0}")]
    Whatsapp(#[from] whatsapp::WhatsappError),

    /// Payment provider failure.
    #[error("payment error: {0}")]
    Payment(#[from] payments::PaymentError),

    /// A phone number did not normalize.
    #[error(transparent)]
    Phone(#[from] session::PhoneError),

    /// Ticket image rendering failure.
    #[error("render error: {0}")]
    Render(String),

    /// A webhook or dialog input was unusable.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
