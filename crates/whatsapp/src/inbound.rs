//! Inbound webhook payload types and their normalization.
//!
//! Every inbound message, whatever its wire shape, is reduced to one
//! [`InboundMessage`]: `(phone, kind, body, reply id?)`. Button and list
//! replies carry the element id in both `body` and `reply_id`, so downstream
//! code can resolve user input as "id, falling back to body".

use serde::Deserialize;

/// Top-level webhook payload from the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub wa_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
}

/// One raw inbound message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub from: String,
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextContent>,
    #[serde(default)]
    pub interactive: Option<InteractiveContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InteractiveContent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub button_reply: Option<Reply>,
    #[serde(default)]
    pub list_reply: Option<Reply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reply {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// Kind of a normalized inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Interactive,
}

/// A normalized inbound message.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Sender phone as delivered by the platform (digits, no plus).
    pub phone: String,
    /// Platform message id, used for read receipts.
    pub message_id: String,
    pub kind: MessageKind,
    /// Message text, or the reply id for interactive replies.
    pub body: String,
    /// The interactive element id, when present.
    pub reply_id: Option<String>,
    /// Contact display name, when the platform supplied one.
    pub profile_name: Option<String>,
}

impl InboundMessage {
    /// The user's input: the interactive id, falling back to the body.
    pub fn input(&self) -> &str {
        self.reply_id.as_deref().unwrap_or(&self.body)
    }
}

impl WebhookPayload {
    /// Extract the first inbound message, normalized.
    pub fn first_message(&self) -> Option<InboundMessage> {
        for entry in &self.entry {
            for change in &entry.changes {
                let profile_name = change
                    .value
                    .contacts
                    .first()
                    .and_then(|c| c.profile.as_ref())
                    .map(|p| p.name.clone())
                    .filter(|n| !n.is_empty());

                if let Some(msg) = change.value.messages.first() {
                    return Some(normalize_message(msg, profile_name));
                }
            }
        }
        None
    }
}

fn normalize_message(msg: &Message, profile_name: Option<String>) -> InboundMessage {
    if let Some(text) = &msg.text {
        return InboundMessage {
            phone: msg.from.clone(),
            message_id: msg.id.clone(),
            kind: MessageKind::Text,
            body: text.body.clone(),
            reply_id: None,
            profile_name,
        };
    }

    let reply = msg
        .interactive
        .as_ref()
        .and_then(|i| i.button_reply.as_ref().or(i.list_reply.as_ref()));

    match reply {
        Some(reply) => InboundMessage {
            phone: msg.from.clone(),
            message_id: msg.id.clone(),
            kind: MessageKind::Interactive,
            body: reply.id.clone(),
            reply_id: Some(reply.id.clone()),
            profile_name,
        },
        // Unsupported message kinds (media, location, ...) normalize to an
        // empty interactive body and fall through the dialog's catch-alls.
        None => InboundMessage {
            phone: msg.from.clone(),
            message_id: msg.id.clone(),
            kind: MessageKind::Interactive,
            body: String::new(),
            reply_id: None,
            profile_name,
        },
    }
}

/// Webhook verification handshake.
///
/// Returns the challenge to echo when `mode` is `subscribe` and the token
/// matches the shared secret; `None` means 403.
pub fn verify_subscription(
    mode: &str,
    token: &str,
    challenge: &str,
    expected_token: &str,
) -> Option<String> {
    if mode == "subscribe" && !expected_token.is_empty() && token == expected_token {
        Some(challenge.to_string())
    } else {
        None
    }
}
