//! Error types shared by the payment adapters.

use std::fmt;

use thiserror::Error;

/// Which adapter produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentProvider {
    Stk,
    Hosted,
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentProvider::Stk => write!(f, "stk"),
            PaymentProvider::Hosted => write!(f, "hosted"),
        }
    }
}

/// Distinguished provider code: the receiving till cannot take payments.
pub const BUSINESS_NOT_ELIGIBLE: &str = "BUSINESS_NOT_ELIGIBLE";

/// Errors that can occur when talking to a payment provider.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Credentials missing or malformed.
    #[error("payment provider not configured: {0}")]
    Config(String),

    /// The payer phone did not validate.
    #[error("invalid payment phone: {0}")]
    InvalidPhone(String),

    /// The provider rejected the request.
    #[error("{provider} provider error {code}: {message}")]
    Provider {
        provider: PaymentProvider,
        code: String,
        message: String,
    },

    /// The provider could not be reached.
    #[error("{provider} provider unreachable: {source}")]
    Unavailable {
        provider: PaymentProvider,
        #[source]
        source: reqwest::Error,
    },

    /// The provider's response could not be decoded.
    #[error("{provider} response malformed: {message}")]
    Malformed {
        provider: PaymentProvider,
        message: String,
    },
}

impl PaymentError {
    /// The provider that produced this error, where one is known.
    pub fn provider(&self) -> Option<PaymentProvider> {
        match self {
            PaymentError::Provider { provider, .. }
            | PaymentError::Unavailable { provider, .. }
            | PaymentError::Malformed { provider, .. } => Some(*provider),
            _ => None,
        }
    }

    /// Whether this is the distinguished "business not eligible" rejection.
    pub fn is_business_not_eligible(&self) -> bool {
        matches!(self, PaymentError::Provider { code, .. } if code == BUSINESS_NOT_ELIGIBLE)
    }
}
