//! Types for sending messages via the WhatsApp Cloud API.

use serde::Serialize;

/// Interactive button id limit.
pub const BUTTON_ID_LIMIT: usize = 256;
/// Interactive button title limit.
pub const BUTTON_TITLE_LIMIT: usize = 20;
/// List row id limit.
pub const ROW_ID_LIMIT: usize = 200;
/// List row title limit.
pub const ROW_TITLE_LIMIT: usize = 24;
/// List row description limit.
pub const ROW_DESC_LIMIT: usize = 72;
/// List section title limit.
pub const SECTION_TITLE_LIMIT: usize = 24;
/// List action button text limit.
pub const ACTION_BUTTON_LIMIT: usize = 20;
/// Maximum rows across all sections of one list message.
pub const MAX_LIST_ROWS: usize = 10;
/// Maximum buttons in one button message.
pub const MAX_BUTTONS: usize = 3;

/// Truncate a string to `limit` characters, appending `...` when cut.
pub fn clamp(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let kept: String = s.chars().take(limit.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// A message request envelope.
#[derive(Debug, Serialize)]
pub struct MessageRequest {
    messaging_product: &'static str,
    to: String,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<TextBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interactive: Option<Interactive>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<ImageRef>,
}

impl MessageRequest {
    /// Plain text message.
    pub fn text(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            messaging_product: "whatsapp",
            to: to.into(),
            kind: "text",
            text: Some(TextBody {
                preview_url: false,
                body: body.into(),
            }),
            interactive: None,
            image: None,
        }
    }

    /// Interactive reply-button message. At most [`MAX_BUTTONS`] buttons are
    /// kept; extras are dropped.
    pub fn buttons(to: impl Into<String>, body: impl Into<String>, buttons: Vec<Button>) -> Self {
        let buttons = buttons
            .into_iter()
            .take(MAX_BUTTONS)
            .map(|b| ReplyButton {
                kind: "reply",
                reply: b,
            })
            .collect();
        Self {
            messaging_product: "whatsapp",
            to: to.into(),
            kind: "interactive",
            text: None,
            interactive: Some(Interactive {
                kind: "button",
                body: InteractiveBody { text: body.into() },
                action: Action {
                    button: None,
                    buttons: Some(buttons),
                    sections: None,
                },
            }),
            image: None,
        }
    }

    /// Interactive list message. At most [`MAX_LIST_ROWS`] rows are kept
    /// across all sections; extras are dropped.
    pub fn list(
        to: impl Into<String>,
        body: impl Into<String>,
        button: &str,
        sections: Vec<ListSection>,
    ) -> Self {
        let mut remaining = MAX_LIST_ROWS;
        let sections = sections
            .into_iter()
            .filter_map(|mut s| {
                if remaining == 0 {
                    return None;
                }
                if s.rows.len() > remaining {
                    s.rows.truncate(remaining);
                }
                remaining -= s.rows.len();
                if s.rows.is_empty() {
                    None
                } else {
                    Some(s)
                }
            })
            .collect();
        Self {
            messaging_product: "whatsapp",
            to: to.into(),
            kind: "interactive",
            text: None,
            interactive: Some(Interactive {
                kind: "list",
                body: InteractiveBody { text: body.into() },
                action: Action {
                    button: Some(clamp(button, ACTION_BUTTON_LIMIT)),
                    buttons: None,
                    sections: Some(sections),
                },
            }),
            image: None,
        }
    }

    /// Image message referencing an uploaded media id.
    pub fn image(to: impl Into<String>, media_id: impl Into<String>, caption: Option<&str>) -> Self {
        Self {
            messaging_product: "whatsapp",
            to: to.into(),
            kind: "image",
            text: None,
            interactive: None,
            image: Some(ImageRef {
                id: media_id.into(),
                caption: caption.map(str::to_string),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct ImageRef {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<String>,
}

#[derive(Debug, Serialize)]
struct TextBody {
    preview_url: bool,
    body: String,
}

#[derive(Debug, Serialize)]
struct Interactive {
    #[serde(rename = "type")]
    kind: &'static str,
    body: InteractiveBody,
    action: Action,
}

#[derive(Debug, Serialize)]
struct InteractiveBody {
    text: String,
}

#[derive(Debug, Serialize)]
struct Action {
    #[serde(skip_serializing_if = "Option::is_none")]
    button: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    buttons: Option<Vec<ReplyButton>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sections: Option<Vec<ListSection>>,
}

#[derive(Debug, Serialize)]
struct ReplyButton {
    #[serde(rename = "type")]
    kind: &'static str,
    reply: Button,
}

/// One reply button.
#[derive(Debug, Clone, Serialize)]
pub struct Button {
    pub id: String,
    pub title: String,
}

impl Button {
    /// Build a button, clamping id and title to their wire limits.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: clamp(&id.into(), BUTTON_ID_LIMIT),
            title: clamp(&title.into(), BUTTON_TITLE_LIMIT),
        }
    }
}

/// One row of an interactive list.
#[derive(Debug, Clone, Serialize)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ListRow {
    /// Build a row, clamping id, title and description to their wire limits.
    pub fn new(id: impl Into<String>, title: impl Into<String>, description: Option<&str>) -> Self {
        Self {
            id: clamp(&id.into(), ROW_ID_LIMIT),
            title: clamp(&title.into(), ROW_TITLE_LIMIT),
            description: description.map(|d| clamp(d, ROW_DESC_LIMIT)),
        }
    }
}

/// A titled section of an interactive list.
#[derive(Debug, Clone, Serialize)]
pub struct ListSection {
    pub title: String,
    pub rows: Vec<ListRow>,
}

impl ListSection {
    /// Build a section, clamping the title to its wire limit.
    pub fn new(title: impl Into<String>, rows: Vec<ListRow>) -> Self {
        Self {
            title: clamp(&title.into(), SECTION_TITLE_LIMIT),
            rows,
        }
    }
}

/// Read-receipt request.
#[derive(Debug, Serialize)]
pub struct ReadReceipt {
    messaging_product: &'static str,
    status: &'static str,
    message_id: String,
}

impl ReadReceipt {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            messaging_product: "whatsapp",
            status: "read",
            message_id: message_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_short_strings_untouched() {
        assert_eq!(clamp("hello", 20), "hello");
        assert_eq!(clamp("", 20), "");
    }

    #[test]
    fn test_clamp_truncates_with_ellipsis() {
        let long = "a".repeat(30);
        let clamped = clamp(&long, 20);
        assert_eq!(clamped.chars().count(), 20);
        assert!(clamped.ends_with("..."));
    }

    #[test]
    fn test_button_limits_applied() {
        let b = Button::new("X".repeat(300), "A very long button title indeed");
        assert_eq!(b.id.chars().count(), BUTTON_ID_LIMIT);
        assert_eq!(b.title.chars().count(), BUTTON_TITLE_LIMIT);
    }

    #[test]
    fn test_text_payload_shape() {
        let req = MessageRequest::text("254712345678", "Karibu!");
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["messaging_product"], "whatsapp");
        assert_eq!(v["type"], "text");
        assert_eq!(v["text"]["body"], "Karibu!");
        assert!(v.get("interactive").is_none());
    }

    #[test]
    fn test_buttons_payload_shape_and_cap() {
        let req = MessageRequest::buttons(
            "254712345678",
            "Pick one",
            vec![
                Button::new("A", "One"),
                Button::new("B", "Two"),
                Button::new("C", "Three"),
                Button::new("D", "Four"),
            ],
        );
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["interactive"]["type"], "button");
        let buttons = v["interactive"]["action"]["buttons"].as_array().unwrap();
        assert_eq!(buttons.len(), MAX_BUTTONS);
        assert_eq!(buttons[0]["type"], "reply");
        assert_eq!(buttons[0]["reply"]["id"], "A");
    }

    #[test]
    fn test_list_payload_caps_rows() {
        let rows: Vec<ListRow> = (0..12)
            .map(|i| ListRow::new(format!("row-{i}"), format!("Row {i}"), None))
            .collect();
        let req = MessageRequest::list(
            "254712345678",
            "Events",
            "View",
            vec![ListSection::new("Upcoming", rows)],
        );
        let v = serde_json::to_value(&req).unwrap();
        let sections = v["interactive"]["action"]["sections"].as_array().unwrap();
        let total: usize = sections
            .iter()
            .map(|s| s["rows"].as_array().unwrap().len())
            .sum();
        assert_eq!(total, MAX_LIST_ROWS);
    }

    #[test]
    fn test_row_description_clamped() {
        let row = ListRow::new("id", "title", Some(&"d".repeat(100)));
        assert_eq!(row.description.unwrap().chars().count(), ROW_DESC_LIMIT);
    }

    #[test]
    fn test_image_payload_shape() {
        let req = MessageRequest::image("254712345678", "MEDIA-1", Some("Gate A"));
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["type"], "image");
        assert_eq!(v["image"]["id"], "MEDIA-1");
        assert_eq!(v["image"]["caption"], "Gate A");
    }
}
