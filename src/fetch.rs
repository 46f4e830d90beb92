//! Loading replay documents and diagnosing failed media sources.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use crate::chat::message::ChatMessage;
use crate::chat::parser::{parse_chat_replay, ParseError};
use crate::playback::state::TrackFailure;

const READ_CHUNK: usize = 64 * 1024;

/// Longest diagnostic line kept from an error body
const MAX_MESSAGE_LEN: usize = 200;

/// Error type for fetching
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Failed to read {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: io::Error,
    },
    #[error("{location} is not valid UTF-8")]
    Utf8 {
        location: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

/// Error type for loading a replay
#[derive(Debug, thiserror::Error)]
pub enum ReplayLoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Bytes received so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    pub loaded: u64,
    pub total: Option<u64>,
}

impl FetchProgress {
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.loaded as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// Progress callback
pub type ProgressFn<'a> = &'a (dyn Fn(FetchProgress) + Send + Sync);

/// Which replay document a progress report belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaySource {
    Chat,
    Metadata,
}

/// Fetches whole text documents
#[async_trait]
pub trait TextFetcher: Send + Sync {
    async fn fetch_text(&self, location: &str, progress: ProgressFn<'_>) -> Result<String, FetchError>;
}

/// Reads documents from the local filesystem
#[derive(Debug, Clone, Default)]
pub struct FileFetcher;

#[async_trait]
impl TextFetcher for FileFetcher {
    async fn fetch_text(&self, location: &str, progress: ProgressFn<'_>) -> Result<String, FetchError> {
        let io_error = |source: io::Error| {
            if source.kind() == io::ErrorKind::NotFound {
                FetchError::NotFound(location.to_string())
            } else {
                FetchError::Io {
                    location: location.to_string(),
                    source,
                }
            }
        };

        let path = Path::new(location);
        let file = tokio::fs::File::open(path).await.map_err(io_error)?;
        let total = file.metadata().await.ok().map(|m| m.len());

        let bytes = read_with_progress(file, total, progress)
            .await
            .map_err(io_error)?;
        debug!("Read {} bytes from {}", bytes.len(), location);

        String::from_utf8(bytes).map_err(|source| FetchError::Utf8 {
            location: location.to_string(),
            source,
        })
    }
}

/// Read everything from `reader`, reporting after each chunk
pub async fn read_with_progress<R>(
    mut reader: R,
    total: Option<u64>,
    progress: ProgressFn<'_>,
) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut bytes = Vec::with_capacity(total.unwrap_or(0) as usize);
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..read]);
        progress(FetchProgress {
            loaded: bytes.len() as u64,
            total,
        });
    }
    Ok(bytes)
}

/// Fetch a chat log and its optional metadata concurrently, then parse.
///
/// Metadata is best-effort: a failed metadata fetch is logged and the chat
/// is parsed without it.
pub async fn load_chat_replay<F>(
    fetcher: &F,
    chat_location: &str,
    metadata_location: Option<&str>,
    progress: &(dyn Fn(ReplaySource, FetchProgress) + Send + Sync),
) -> Result<Vec<ChatMessage>, ReplayLoadError>
where
    F: TextFetcher + ?Sized,
{
    let chat_progress = |p| progress(ReplaySource::Chat, p);
    let metadata_progress = |p| progress(ReplaySource::Metadata, p);

    let chat = fetcher.fetch_text(chat_location, &chat_progress);
    let metadata = async {
        let location = metadata_location?;
        match fetcher.fetch_text(location, &metadata_progress).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Continuing without replay metadata: {}", e);
                None
            }
        }
    };

    let (chat, metadata) = tokio::join!(chat, metadata);
    let messages = parse_chat_replay(&chat?, metadata.as_deref())?;
    info!("Loaded {} chat messages from {}", messages.len(), chat_location);
    Ok(messages)
}

/// Best-effort description of why a media source failed. Fetches the source
/// and extracts a server message from the body; any failure yields `None`.
pub async fn describe_source_error<F>(fetcher: &F, location: &str) -> Option<String>
where
    F: TextFetcher + ?Sized,
{
    match fetcher.fetch_text(location, &|_| {}).await {
        Ok(body) => extract_server_message(&body),
        Err(e) => {
            debug!("Could not fetch error body for {}: {}", location, e);
            None
        }
    }
}

/// Server diagnostic for a failed track, fetched from the source it was
/// loading. `None` when the track has no known source.
pub async fn diagnose_failure<F>(fetcher: &F, failure: &TrackFailure) -> Option<String>
where
    F: TextFetcher + ?Sized,
{
    let location = failure.source.as_deref()?;
    describe_source_error(fetcher, location).await
}

/// Pull a human-readable message out of an error response body: JSON
/// `message`/`error`, XML `<Message>`, HTML `<title>`, or the first line.
pub fn extract_server_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if body.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
            let message = value
                .get("message")
                .and_then(|v| v.as_str())
                .or_else(|| value.get("error").and_then(|v| v.as_str()))
                .or_else(|| value.pointer("/error/message").and_then(|v| v.as_str()));
            if let Some(message) = message {
                return Some(truncate(message.trim()));
            }
        }
    }

    if let Some(message) = between(body, "<Message>", "</Message>") {
        return Some(truncate(message));
    }
    if let Some(title) = between_ignore_case(body, "<title>", "</title>") {
        return Some(truncate(title));
    }

    body.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(truncate)
}

fn between<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let end = text[start..].find(close)? + start;
    let inner = text[start..end].trim();
    (!inner.is_empty()).then_some(inner)
}

fn between_ignore_case<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    // ASCII lowercasing keeps byte offsets aligned with `text`
    let lower = text.to_ascii_lowercase();
    let start = lower.find(open)? + open.len();
    let end = lower[start..].find(close)? + start;
    let inner = text[start..end].trim();
    (!inner.is_empty()).then_some(inner)
}

fn truncate(message: &str) -> String {
    match message.char_indices().nth(MAX_MESSAGE_LEN) {
        Some((index, _)) => format!("{}...", &message[..index]),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::track::TrackRole;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::io::Write;

    struct MemoryFetcher(HashMap<String, String>);

    #[async_trait]
    impl TextFetcher for MemoryFetcher {
        async fn fetch_text(&self, location: &str, progress: ProgressFn<'_>) -> Result<String, FetchError> {
            let text = self
                .0
                .get(location)
                .cloned()
                .ok_or_else(|| FetchError::NotFound(location.to_string()))?;
            progress(FetchProgress {
                loaded: text.len() as u64,
                total: Some(text.len() as u64),
            });
            Ok(text)
        }
    }

    const CHAT: &str = r#"[
        {"message_id": "b", "timestamp": 1700000010000000, "message": "second"},
        {"message_id": "a", "timestamp": 1700000005000000, "message": "first"}
    ]"#;
    const METADATA: &str = r#"{"release_timestamp": 1700000000, "title": "stream"}"#;

    #[tokio::test]
    async fn test_file_fetcher_reports_progress() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let body = "x".repeat(READ_CHUNK * 2 + 10);
        file.write_all(body.as_bytes()).unwrap();

        let reports = Mutex::new(Vec::new());
        let progress = |p: FetchProgress| reports.lock().push(p);
        let text = FileFetcher
            .fetch_text(file.path().to_str().unwrap(), &progress)
            .await
            .unwrap();
        assert_eq!(text.len(), body.len());

        let reports = reports.into_inner();
        assert!(reports.len() >= 3);
        assert!(reports.windows(2).all(|w| w[0].loaded < w[1].loaded));
        let last = reports.last().unwrap();
        assert_eq!(last.loaded, body.len() as u64);
        assert_eq!(last.fraction(), Some(1.0));
    }

    #[tokio::test]
    async fn test_file_fetcher_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let result = FileFetcher.fetch_text(missing.to_str().unwrap(), &|_| {}).await;
        assert!(matches!(result, Err(FetchError::NotFound(_))));

        let binary = dir.path().join("binary.bin");
        std::fs::write(&binary, [0xff, 0xfe, 0x00]).unwrap();
        let result = FileFetcher.fetch_text(binary.to_str().unwrap(), &|_| {}).await;
        assert!(matches!(result, Err(FetchError::Utf8 { .. })));
    }

    #[tokio::test]
    async fn test_load_chat_replay_with_metadata() {
        let fetcher = MemoryFetcher(HashMap::from([
            ("chat".to_string(), CHAT.to_string()),
            ("meta".to_string(), METADATA.to_string()),
        ]));
        let seen = Mutex::new(Vec::new());
        let progress = |source: ReplaySource, _: FetchProgress| seen.lock().push(source);

        let messages = load_chat_replay(&fetcher, "chat", Some("meta"), &progress)
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "a");
        assert_eq!(messages[0].time_in_seconds, 5.0);

        let seen = seen.into_inner();
        assert!(seen.contains(&ReplaySource::Chat));
        assert!(seen.contains(&ReplaySource::Metadata));
    }

    #[tokio::test]
    async fn test_load_chat_replay_failures() {
        let fetcher = MemoryFetcher(HashMap::from([("chat".to_string(), CHAT.to_string())]));

        // Metadata missing: timestamps cannot be resolved, no parser fits
        let result = load_chat_replay(&fetcher, "chat", Some("meta"), &|_, _| {}).await;
        assert!(matches!(result, Err(ReplayLoadError::Parse(ParseError::NoSuitableParser))));

        let result = load_chat_replay(&fetcher, "nothing", None, &|_, _| {}).await;
        assert!(matches!(result, Err(ReplayLoadError::Fetch(FetchError::NotFound(_)))));
    }

    #[tokio::test]
    async fn test_describe_source_error() {
        let fetcher = MemoryFetcher(HashMap::from([(
            "video".to_string(),
            "<?xml version=\"1.0\"?><Error><Code>AccessDenied</Code><Message>Request has expired</Message></Error>"
                .to_string(),
        )]));
        assert_eq!(
            describe_source_error(&fetcher, "video").await.as_deref(),
            Some("Request has expired")
        );
        assert_eq!(describe_source_error(&fetcher, "audio").await, None);
    }

    #[tokio::test]
    async fn test_diagnose_failure_uses_track_source() {
        let fetcher = MemoryFetcher(HashMap::from([(
            "https://cdn.example/video.mp4".to_string(),
            r#"{"error": {"message": "Signature expired"}}"#.to_string(),
        )]));
        let mut failure = TrackFailure {
            role: TrackRole::Video,
            message: "Network error: HTTP 403".to_string(),
            source: Some("https://cdn.example/video.mp4".to_string()),
        };
        assert_eq!(
            diagnose_failure(&fetcher, &failure).await.as_deref(),
            Some("Signature expired")
        );

        failure.source = None;
        assert_eq!(diagnose_failure(&fetcher, &failure).await, None);
    }

    #[test]
    fn test_extract_server_message() {
        assert_eq!(
            extract_server_message(r#"{"message": "token expired"}"#).as_deref(),
            Some("token expired")
        );
        assert_eq!(
            extract_server_message(r#"{"error": {"code": 403, "message": "forbidden"}}"#).as_deref(),
            Some("forbidden")
        );
        assert_eq!(
            extract_server_message("<html><head><TITLE>404 Not Found</TITLE></head></html>").as_deref(),
            Some("404 Not Found")
        );
        assert_eq!(
            extract_server_message("\n\n  upstream timed out\nmore detail").as_deref(),
            Some("upstream timed out")
        );
        assert_eq!(extract_server_message("   "), None);

        let long = "e".repeat(500);
        let message = extract_server_message(&long).unwrap();
        assert_eq!(message.len(), MAX_MESSAGE_LEN + 3);
    }
}
