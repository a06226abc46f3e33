//! Error types for the WhatsApp client.

use thiserror::Error;

/// Errors that can occur when talking to the WhatsApp Cloud API.
#[derive(Debug, Error)]
pub enum WhatsappError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error response from the Graph API.
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The API response did not carry the expected field.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(&'static str),
}
