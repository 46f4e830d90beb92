//! Canonical format: a JSON array of message objects.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{ChatParser, ParseError, ReplayInput};
use crate::chat::message::{ChatAuthor, ChatMessage, MessageColours, MessageType, Money};
use crate::core::time::{constants::MICROS_PER_SECOND, Seconds};

#[derive(Debug, Deserialize)]
struct CanonicalItem {
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    time_in_seconds: Option<f64>,
    /// Unix time in microseconds
    #[serde(default)]
    timestamp: Option<f64>,
    #[serde(default)]
    message_type: Option<String>,
    #[serde(default)]
    author: Option<CanonicalAuthor>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    money: Option<Money>,
    #[serde(default)]
    colours: Option<MessageColours>,
}

#[derive(Debug, Default, Deserialize)]
struct CanonicalAuthor {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    id: Option<String>,
    /// Either plain strings or objects with a `title`
    #[serde(default)]
    badges: Vec<Value>,
}

/// Parser for the canonical JSON array
pub struct CanonicalParser;

impl CanonicalParser {
    fn has_time(item: &Value, release_timestamp: Option<f64>) -> bool {
        let has_number = |key: &str| item.get(key).is_some_and(Value::is_number);
        has_number("time_in_seconds") || (release_timestamp.is_some() && has_number("timestamp"))
    }

    fn convert(index: usize, item: CanonicalItem, release_timestamp: Option<f64>) -> Option<ChatMessage> {
        let time_in_seconds: Seconds = match (item.time_in_seconds, item.timestamp, release_timestamp) {
            (Some(time), _, _) => time,
            (None, Some(timestamp), Some(release)) => timestamp / MICROS_PER_SECOND - release,
            _ => return None,
        };

        let message_type = match item.message_type.as_deref() {
            None => MessageType::Text,
            Some(name) => MessageType::from_canonical(name).unwrap_or_else(|| {
                debug!("Unknown message type {:?}, treating as text", name);
                MessageType::Text
            }),
        };

        let author = item.author.unwrap_or_default();
        let badges = author
            .badges
            .iter()
            .filter_map(|badge| match badge {
                Value::String(title) => Some(title.clone()),
                Value::Object(fields) => fields.get("title").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect();

        Some(ChatMessage {
            id: item.message_id.unwrap_or_else(|| format!("canonical-{}", index)),
            time_in_seconds,
            message_type,
            author: ChatAuthor {
                name: author.name.unwrap_or_default(),
                id: author.id,
                badges,
            },
            message: item.message.unwrap_or_default(),
            money: item.money,
            colours: item.colours.filter(|colours| !colours.is_empty()),
        })
    }
}

impl ChatParser for CanonicalParser {
    fn name(&self) -> &'static str {
        "canonical"
    }

    fn can_parse(&self, input: &ReplayInput<'_>) -> bool {
        let release_timestamp = input.metadata().and_then(|m| m.release_timestamp);
        match input.document() {
            Some(Value::Array(items)) => {
                items.is_empty() || items.iter().any(|item| Self::has_time(item, release_timestamp))
            }
            _ => false,
        }
    }

    fn parse(&self, input: &ReplayInput<'_>) -> Result<Vec<ChatMessage>, ParseError> {
        let release_timestamp = input.metadata().and_then(|m| m.release_timestamp);
        let parsed;
        let document = match input.document() {
            Some(document) => document,
            None => {
                parsed = serde_json::from_str::<Value>(input.raw())?;
                &parsed
            }
        };
        let items: &[Value] = document.as_array().map(Vec::as_slice).unwrap_or_default();

        let mut messages = Vec::with_capacity(items.len());
        for (index, value) in items.iter().enumerate() {
            let item = match CanonicalItem::deserialize(value) {
                Ok(item) => item,
                Err(e) => {
                    debug!("Skipping chat item {}: {}", index, e);
                    continue;
                }
            };
            match Self::convert(index, item, release_timestamp) {
                Some(message) => messages.push(message),
                None => debug!("Skipping chat item {}: no usable time", index),
            }
        }
        Ok(messages)
    }
}
