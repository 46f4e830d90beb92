//! Canonical chat message model shared by every parser.

use serde::{Deserialize, Serialize};

use crate::core::time::Seconds;

/// Kind of chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "text_message")]
    Text,
    #[serde(rename = "paid_message", alias = "paid_sticker")]
    Paid,
    #[serde(rename = "membership_item")]
    Membership,
}

impl MessageType {
    /// Map a canonical `message_type` string; unknown kinds yield `None`
    pub fn from_canonical(name: &str) -> Option<Self> {
        match name {
            "text_message" => Some(MessageType::Text),
            "paid_message" | "paid_sticker" => Some(MessageType::Paid),
            "membership_item" => Some(MessageType::Membership),
            _ => None,
        }
    }
}

/// Author of a message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatAuthor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub badges: Vec<String>,
}

/// Amount attached to a paid message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default)]
    pub text: String,
}

impl Money {
    /// Split a display amount such as `"CA$1,000.50"` into currency and value
    pub fn from_text(text: &str) -> Self {
        let text = text.trim();
        let split = text
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(text.len());
        let (currency, digits) = text.split_at(split);
        let currency = currency.trim();
        let amount = digits
            .chars()
            .filter(|c| *c != ',' && !c.is_whitespace())
            .collect::<String>()
            .parse::<f64>()
            .ok();

        Self {
            amount,
            currency: (!currency.is_empty()).then(|| currency.to_string()),
            text: text.to_string(),
        }
    }
}

/// Highlight colours of paid and membership messages, as `#rrggbbaa`.
/// Keys with a `_colour` suffix are accepted on input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageColours {
    #[serde(default, alias = "header_background_colour", skip_serializing_if = "Option::is_none")]
    pub header_background: Option<String>,
    #[serde(default, alias = "header_text_colour", skip_serializing_if = "Option::is_none")]
    pub header_text: Option<String>,
    #[serde(default, alias = "body_background_colour", skip_serializing_if = "Option::is_none")]
    pub body_background: Option<String>,
    #[serde(default, alias = "body_text_colour", skip_serializing_if = "Option::is_none")]
    pub body_text: Option<String>,
    #[serde(default, alias = "author_name_text_colour", skip_serializing_if = "Option::is_none")]
    pub author_name_text: Option<String>,
}

impl MessageColours {
    pub fn is_empty(&self) -> bool {
        self.header_background.is_none()
            && self.header_text.is_none()
            && self.body_background.is_none()
            && self.body_text.is_none()
            && self.author_name_text.is_none()
    }
}

/// Convert a packed ARGB colour to `#rrggbbaa`
pub fn argb_to_hex(argb: u32) -> String {
    let [a, r, g, b] = argb.to_be_bytes();
    format!("#{:02x}{:02x}{:02x}{:02x}", r, g, b, a)
}

/// One replayed chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "message_id")]
    pub id: String,
    /// Offset from stream start; negative for pre-stream chat
    pub time_in_seconds: Seconds,
    pub message_type: MessageType,
    pub author: ChatAuthor,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub money: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colours: Option<MessageColours>,
}

impl ChatMessage {
    /// Plain text message
    pub fn text(
        id: impl Into<String>,
        time_in_seconds: Seconds,
        author: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            time_in_seconds,
            message_type: MessageType::Text,
            author: ChatAuthor {
                name: author.into(),
                ..Default::default()
            },
            message: message.into(),
            money: None,
            colours: None,
        }
    }
}

/// Stable sort by `time_in_seconds`; equal timestamps keep log order
pub fn sort_by_time(messages: &mut [ChatMessage]) {
    messages.sort_by(|a, b| a.time_in_seconds.total_cmp(&b.time_in_seconds));
}
