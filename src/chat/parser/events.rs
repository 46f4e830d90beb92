//! Line-delimited replay events, one JSON object per line.
//!
//! Each line wraps a `replayChatItemAction` carrying the playback offset
//! (`videoOffsetTimeMsec`) and a list of actions. Only `addChatItemAction`
//! items with a known renderer become messages; every other line or action
//! is skipped.

use serde_json::Value;
use tracing::debug;

use super::{ChatParser, ParseError, ReplayInput};
use crate::chat::message::{argb_to_hex, ChatAuthor, ChatMessage, MessageColours, MessageType, Money};
use crate::core::time::constants::MILLIS_PER_SECOND;

const REPLAY_ACTION: &str = "replayChatItemAction";

/// Parser for line-delimited replay events
pub struct ReplayEventParser;

impl ChatParser for ReplayEventParser {
    fn name(&self) -> &'static str {
        "replay-events"
    }

    /// Accepts the input once any line parses and carries a replay action
    fn can_parse(&self, input: &ReplayInput<'_>) -> bool {
        input
            .raw()
            .lines()
            .map(str::trim)
            .filter(|line| line.contains(REPLAY_ACTION))
            .any(|line| {
                serde_json::from_str::<Value>(line)
                    .map(|value| value.get(REPLAY_ACTION).is_some())
                    .unwrap_or(false)
            })
    }

    fn parse(&self, input: &ReplayInput<'_>) -> Result<Vec<ChatMessage>, ParseError> {
        let mut messages = Vec::new();
        for (number, line) in input.raw().lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(value) => parse_line(&value, number + 1, &mut messages),
                Err(e) => debug!("Skipping malformed chat line {}: {}", number + 1, e),
            }
        }
        Ok(messages)
    }
}

fn parse_line(line: &Value, number: usize, out: &mut Vec<ChatMessage>) {
    let Some(replay) = line.get(REPLAY_ACTION) else {
        debug!("Skipping chat line {}: no replay action", number);
        return;
    };
    let Some(offset_ms) = replay.get("videoOffsetTimeMsec").and_then(number_or_string) else {
        debug!("Skipping chat line {}: no video offset", number);
        return;
    };
    let time_in_seconds = offset_ms / MILLIS_PER_SECOND;

    let actions = replay
        .get("actions")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for action in actions {
        let Some(item) = action.pointer("/addChatItemAction/item") else {
            continue;
        };
        match convert_item(item, time_in_seconds) {
            Some(message) => out.push(message),
            None => debug!("Skipping unsupported chat item on line {}", number),
        }
    }
}

fn convert_item(item: &Value, time_in_seconds: f64) -> Option<ChatMessage> {
    let (kind, renderer) = item.as_object()?.iter().next()?;

    let (message_type, message) = match kind.as_str() {
        "liveChatTextMessageRenderer" => (MessageType::Text, runs_text(renderer.get("message"))),
        "liveChatPaidMessageRenderer" => (MessageType::Paid, runs_text(renderer.get("message"))),
        "liveChatPaidStickerRenderer" => (
            MessageType::Paid,
            renderer
                .pointer("/sticker/accessibility/accessibilityData/label")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        "liveChatMembershipItemRenderer" => {
            // Milestone messages carry user text; plain joins only a subtext
            let text = runs_text(renderer.get("message"));
            let text = if text.is_empty() {
                runs_text(renderer.get("headerSubtext"))
            } else {
                text
            };
            (MessageType::Membership, text)
        }
        _ => return None,
    };

    let id = renderer.get("id").and_then(Value::as_str)?.to_string();

    let author = ChatAuthor {
        name: simple_text(renderer.get("authorName")).unwrap_or_default(),
        id: renderer
            .get("authorExternalChannelId")
            .and_then(Value::as_str)
            .map(str::to_string),
        badges: renderer
            .get("authorBadges")
            .and_then(Value::as_array)
            .map(|badges| {
                badges
                    .iter()
                    .filter_map(|badge| {
                        badge
                            .pointer("/liveChatAuthorBadgeRenderer/tooltip")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .collect()
            })
            .unwrap_or_default(),
    };

    let money = simple_text(renderer.get("purchaseAmountText")).map(|text| Money::from_text(&text));

    let colours = MessageColours {
        header_background: colour(renderer, "headerBackgroundColor"),
        header_text: colour(renderer, "headerTextColor"),
        body_background: colour(renderer, "bodyBackgroundColor")
            .or_else(|| colour(renderer, "backgroundColor")),
        body_text: colour(renderer, "bodyTextColor")
            .or_else(|| colour(renderer, "moneyChipTextColor")),
        author_name_text: colour(renderer, "authorNameTextColor"),
    };

    Some(ChatMessage {
        id,
        time_in_seconds,
        message_type,
        author,
        message,
        money,
        colours: (!colours.is_empty()).then_some(colours),
    })
}

/// Offsets arrive as strings (`"1234"`) or numbers
fn number_or_string(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn simple_text(value: Option<&Value>) -> Option<String> {
    let value = value?;
    if let Some(text) = value.get("simpleText").and_then(Value::as_str) {
        return Some(text.to_string());
    }
    let text = runs_text(Some(value));
    (!text.is_empty()).then_some(text)
}

/// Flatten `{"runs": [...]}` into text. Emoji runs become their first
/// shortcut, or the emoji id for standard emoji.
fn runs_text(value: Option<&Value>) -> String {
    let Some(runs) = value.and_then(|v| v.get("runs")).and_then(Value::as_array) else {
        return String::new();
    };
    runs.iter()
        .filter_map(|run| {
            if let Some(text) = run.get("text").and_then(Value::as_str) {
                return Some(text.to_string());
            }
            let emoji = run.get("emoji")?;
            let custom = emoji.get("isCustomEmoji").and_then(Value::as_bool).unwrap_or(false);
            let shortcut = emoji
                .pointer("/shortcuts/0")
                .and_then(Value::as_str)
                .map(str::to_string);
            let emoji_id = emoji.get("emojiId").and_then(Value::as_str).map(str::to_string);
            if custom {
                shortcut.or(emoji_id)
            } else {
                emoji_id.or(shortcut)
            }
        })
        .collect()
}

fn colour(renderer: &Value, key: &str) -> Option<String> {
    let argb = renderer.get(key)?.as_u64()?;
    u32::try_from(argb).ok().map(argb_to_hex)
}
