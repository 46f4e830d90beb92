//! Chat replay: message model, format parsers and the trailing window.

pub mod message;
pub mod parser;
pub mod replay;

pub use message::{ChatAuthor, ChatMessage, MessageColours, MessageType, Money};
pub use parser::{parse_chat_replay, ChatParser, ParseError, ParserRegistry, ReplayInput, ReplayMetadata};
pub use replay::{visible_messages, ChatFilter, ReplayWindow};
