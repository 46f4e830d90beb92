//! Chat replay parsers.
//!
//! Each parser recognises one on-disk format. `parse_chat_replay` asks the
//! registered parsers in order and the first one that recognises the input
//! produces the log, sorted by `time_in_seconds`.

mod canonical;
mod events;

use std::cell::OnceCell;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::chat::message::{sort_by_time, ChatMessage};

pub use canonical::CanonicalParser;
pub use events::ReplayEventParser;

/// Error type for chat parsing
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("No suitable parser for chat replay")]
    NoSuitableParser,
    #[error("Invalid chat JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Companion metadata of a recorded stream
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReplayMetadata {
    /// Unix time (seconds) the stream started
    #[serde(default)]
    pub release_timestamp: Option<f64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Raw replay input plus lazily parsed views shared between parsers
pub struct ReplayInput<'a> {
    raw: &'a str,
    metadata: Option<ReplayMetadata>,
    document: OnceCell<Option<serde_json::Value>>,
}

impl<'a> ReplayInput<'a> {
    /// Wrap raw chat text. Metadata that fails to parse is ignored.
    pub fn new(raw: &'a str, metadata_raw: Option<&str>) -> Self {
        let metadata = metadata_raw.and_then(|text| {
            match serde_json::from_str::<ReplayMetadata>(text) {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    warn!("Ignoring unreadable replay metadata: {}", e);
                    None
                }
            }
        });
        Self {
            raw,
            metadata,
            document: OnceCell::new(),
        }
    }

    pub fn raw(&self) -> &'a str {
        self.raw
    }

    pub fn metadata(&self) -> Option<&ReplayMetadata> {
        self.metadata.as_ref()
    }

    /// The input as one JSON document, if it is one
    pub fn document(&self) -> Option<&serde_json::Value> {
        self.document
            .get_or_init(|| serde_json::from_str(self.raw).ok())
            .as_ref()
    }
}

/// A chat replay format
pub trait ChatParser: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Whether this parser recognises the input
    fn can_parse(&self, input: &ReplayInput<'_>) -> bool;

    /// Parse into messages. Ordering is fixed up by the caller.
    fn parse(&self, input: &ReplayInput<'_>) -> Result<Vec<ChatMessage>, ParseError>;
}

/// Ordered parser list
pub struct ParserRegistry {
    parsers: Vec<Box<dyn ChatParser>>,
}

impl ParserRegistry {
    pub fn empty() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    /// Append a parser with lower priority than those already registered
    pub fn with_parser<P: ChatParser + 'static>(mut self, parser: P) -> Self {
        self.parsers.push(Box::new(parser));
        self
    }

    pub fn parse(&self, input: &ReplayInput<'_>) -> Result<Vec<ChatMessage>, ParseError> {
        let parser = self
            .parsers
            .iter()
            .find(|parser| parser.can_parse(input))
            .ok_or(ParseError::NoSuitableParser)?;

        debug!("Parsing chat replay as {}", parser.name());
        let mut messages = parser.parse(input)?;
        sort_by_time(&mut messages);
        Ok(messages)
    }
}

impl Default for ParserRegistry {
    /// Canonical array first, then line-delimited replay events
    fn default() -> Self {
        Self::empty()
            .with_parser(CanonicalParser)
            .with_parser(ReplayEventParser)
    }
}

/// Parse a chat replay with the default parsers
pub fn parse_chat_replay(
    raw: &str,
    metadata_raw: Option<&str>,
) -> Result<Vec<ChatMessage>, ParseError> {
    ParserRegistry::default().parse(&ReplayInput::new(raw, metadata_raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysEmpty;

    impl ChatParser for AlwaysEmpty {
        fn name(&self) -> &'static str {
            "empty"
        }

        fn can_parse(&self, _input: &ReplayInput<'_>) -> bool {
            true
        }

        fn parse(&self, _input: &ReplayInput<'_>) -> Result<Vec<ChatMessage>, ParseError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_no_suitable_parser() {
        let result = parse_chat_replay("not chat at all", None);
        assert!(matches!(result, Err(ParseError::NoSuitableParser)));

        let result = parse_chat_replay("{\"some\": \"object\"}", None);
        assert!(matches!(result, Err(ParseError::NoSuitableParser)));
    }

    #[test]
    fn test_first_match_wins() {
        let registry = ParserRegistry::empty()
            .with_parser(AlwaysEmpty)
            .with_parser(CanonicalParser);
        let input = ReplayInput::new(
            r#"[{"message_id": "a", "time_in_seconds": 1.0, "message": "hi", "author": {"name": "x"}}]"#,
            None,
        );
        assert!(registry.parse(&input).unwrap().is_empty());
        assert_eq!(ParserRegistry::default().parse(&input).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_metadata_ignored() {
        let input = ReplayInput::new("[]", Some("{broken"));
        assert!(input.metadata().is_none());

        let input = ReplayInput::new("[]", Some(r#"{"release_timestamp": 1700000000}"#));
        assert_eq!(
            input.metadata().and_then(|m| m.release_timestamp),
            Some(1_700_000_000.0)
        );
    }

    #[test]
    fn test_output_sorted() {
        let raw = r#"[
            {"message_id": "late", "time_in_seconds": 9.0, "message": "b", "author": {"name": "x"}},
            {"message_id": "early", "time_in_seconds": 1.0, "message": "a", "author": {"name": "x"}}
        ]"#;
        let messages = parse_chat_replay(raw, None).unwrap();
        assert_eq!(messages[0].id, "early");
        assert_eq!(messages[1].id, "late");
    }
}
