//! WhatsApp Cloud API HTTP client.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::WhatsappConfig;
use crate::error::WhatsappError;
use crate::outbound::{Button, ListSection, MessageRequest, ReadReceipt};

/// Response to a message send.
#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessageId>,
}

#[derive(Debug, Deserialize)]
struct SentMessageId {
    id: String,
}

/// Response to a media upload.
#[derive(Debug, Deserialize)]
struct MediaResponse {
    id: String,
}

/// Error envelope from the Graph API.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: i64,
}

/// Client for the WhatsApp Cloud API.
#[derive(Clone)]
pub struct WhatsappClient {
    http: Client,
    config: WhatsappConfig,
}

impl WhatsappClient {
    /// Create a client. Fails when credentials are missing.
    pub fn new(config: WhatsappConfig) -> Result<Self, WhatsappError> {
        if config.access_token.is_empty() || config.phone_number_id.is_empty() {
            return Err(WhatsappError::Config(
                "access token and phone number id are required".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(WhatsappError::Http)?;

        Ok(Self { http, config })
    }

    /// Send a plain text message. Returns the platform message id.
    pub async fn send_text(&self, to: &str, body: &str) -> Result<String, WhatsappError> {
        self.send(MessageRequest::text(to, body)).await
    }

    /// Send an interactive reply-button message.
    pub async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        buttons: Vec<Button>,
    ) -> Result<String, WhatsappError> {
        self.send(MessageRequest::buttons(to, body, buttons)).await
    }

    /// Send an interactive list message.
    pub async fn send_list(
        &self,
        to: &str,
        body: &str,
        button: &str,
        sections: Vec<ListSection>,
    ) -> Result<String, WhatsappError> {
        self.send(MessageRequest::list(to, body, button, sections))
            .await
    }

    /// Send an image by uploaded media id.
    pub async fn send_image(
        &self,
        to: &str,
        media_id: &str,
        caption: Option<&str>,
    ) -> Result<String, WhatsappError> {
        self.send(MessageRequest::image(to, media_id, caption)).await
    }

    /// Mark an inbound message as read.
    pub async fn mark_read(&self, message_id: &str) -> Result<(), WhatsappError> {
        let response = self
            .http
            .post(self.config.messages_url())
            .bearer_auth(&self.config.access_token)
            .json(&ReadReceipt::new(message_id))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(())
    }

    /// Upload media bytes, returning the media id used by image sends.
    pub async fn upload_media(
        &self,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<String, WhatsappError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name("upload")
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new()
            .text("messaging_product", "whatsapp")
            .text("type", mime.to_string())
            .part("file", part);

        let response = self
            .http
            .post(self.config.media_url())
            .bearer_auth(&self.config.access_token)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let media: MediaResponse = response.json().await?;
        debug!(media_id = %media.id, "Uploaded media");
        Ok(media.id)
    }

    async fn send(&self, request: MessageRequest) -> Result<String, WhatsappError> {
        let response = self
            .http
            .post(self.config.messages_url())
            .bearer_auth(&self.config.access_token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let sent: SendResponse = response.json().await?;
        let id = sent
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or(WhatsappError::UnexpectedResponse("messages[0].id missing"))?;
        debug!(message_id = %id, "Sent message");
        Ok(id)
    }

    async fn api_error(response: reqwest::Response) -> WhatsappError {
        let status = response.status();
        match response.json::<ErrorResponse>().await {
            Ok(body) => WhatsappError::Api {
                code: body.error.code,
                message: body.error.message,
            },
            Err(_) => WhatsappError::Api {
                code: status.as_u16() as i64,
                message: format!("HTTP {status}"),
            },
        }
    }
}
