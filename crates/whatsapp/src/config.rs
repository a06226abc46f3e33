//! Configuration for the WhatsApp Cloud API client.

/// Default Graph API base URL.
const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v20.0";

/// Configuration for connecting to the WhatsApp Cloud API.
#[derive(Debug, Clone)]
pub struct WhatsappConfig {
    /// Graph API base URL (e.g., "https://graph.facebook.com/v20.0").
    pub api_base: String,
    /// Permanent access token for the business account.
    pub access_token: String,
    /// The business phone number id messages are sent from.
    pub phone_number_id: String,
}

impl WhatsappConfig {
    /// Create a configuration against the default Graph API base.
    pub fn new(access_token: impl Into<String>, phone_number_id: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            access_token: access_token.into(),
            phone_number_id: phone_number_id.into(),
        }
    }

    /// Override the API base URL (test servers, API version pinning).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Endpoint for sending messages.
    pub fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.api_base, self.phone_number_id)
    }

    /// Endpoint for uploading media.
    pub fn media_url(&self) -> String {
        format!("{}/{}/media", self.api_base, self.phone_number_id)
    }
}
