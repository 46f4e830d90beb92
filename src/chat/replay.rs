//! Trailing chat window for a playback position.
//!
//! The log is sorted by `time_in_seconds`. For a position `t` the window
//! ends just after the message at `t` (exact match) or at the insertion
//! point of `t`, and holds at most `window_size` messages before that.

use std::collections::HashSet;
use std::sync::Arc;

use crate::chat::message::{ChatMessage, MessageType};
use crate::core::time::Seconds;

/// Binary search for the exclusive end of the window over `len` sorted times
fn window_end_by<F>(len: usize, current_time: Seconds, time_at: F) -> usize
where
    F: Fn(usize) -> Seconds,
{
    let (mut lo, mut hi) = (0, len);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let mid_time = time_at(mid);
        if mid_time == current_time {
            return mid + 1;
        }
        if mid_time < current_time {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Exclusive end index of the window at `current_time`
pub fn window_end(log: &[ChatMessage], current_time: Seconds) -> usize {
    window_end_by(log.len(), current_time, |i| log[i].time_in_seconds)
}

/// Messages visible at `current_time`, oldest first, duplicates by id removed
/// (first occurrence wins)
pub fn visible_messages(
    log: &[ChatMessage],
    current_time: Seconds,
    window_size: usize,
) -> Vec<&ChatMessage> {
    let end = window_end(log, current_time);
    let start = end.saturating_sub(window_size);

    let mut seen = HashSet::new();
    log[start..end]
        .iter()
        .filter(|message| seen.insert(message.id.as_str()))
        .collect()
}

/// Narrows the replay to selected message types and a text query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatFilter {
    types: Option<HashSet<MessageType>>,
    query: Option<String>,
}

impl ChatFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only these message types
    pub fn with_types<I: IntoIterator<Item = MessageType>>(mut self, types: I) -> Self {
        self.types = Some(types.into_iter().collect());
        self
    }

    /// Case-insensitive match on message text or author name
    pub fn with_query(mut self, query: &str) -> Self {
        let query = query.trim();
        self.query = (!query.is_empty()).then(|| query.to_lowercase());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_none() && self.query.is_none()
    }

    pub fn matches(&self, message: &ChatMessage) -> bool {
        if let Some(types) = &self.types {
            if !types.contains(&message.message_type) {
                return false;
            }
        }
        match &self.query {
            Some(query) => {
                message.message.to_lowercase().contains(query.as_str())
                    || message.author.name.to_lowercase().contains(query.as_str())
            }
            None => true,
        }
    }
}

/// Chat log plus the window derived from the current playback position.
///
/// Filtering happens before windowing, so the window always holds up to
/// `window_size` matching messages.
#[derive(Debug, Clone)]
pub struct ReplayWindow {
    log: Arc<[ChatMessage]>,
    window_size: usize,
    filter: ChatFilter,
    /// Indices into `log` that pass the filter, in log order
    candidates: Vec<usize>,
    current_time: Option<Seconds>,
    visible: Vec<usize>,
}

impl ReplayWindow {
    pub fn new(log: impl Into<Arc<[ChatMessage]>>, window_size: usize) -> Self {
        let log = log.into();
        let candidates = (0..log.len()).collect();
        Self {
            log,
            window_size,
            filter: ChatFilter::default(),
            candidates,
            current_time: None,
            visible: Vec::new(),
        }
    }

    pub fn log(&self) -> &[ChatMessage] {
        &self.log
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn filter(&self) -> &ChatFilter {
        &self.filter
    }

    /// Move the window to a playback position. Returns true if the visible
    /// set changed.
    pub fn set_time(&mut self, current_time: Seconds) -> bool {
        if self.current_time == Some(current_time) {
            return false;
        }
        self.current_time = Some(current_time);
        self.recompute()
    }

    pub fn set_filter(&mut self, filter: ChatFilter) -> bool {
        if self.filter == filter {
            return false;
        }
        self.candidates = (0..self.log.len())
            .filter(|&i| filter.matches(&self.log[i]))
            .collect();
        self.filter = filter;
        self.recompute()
    }

    pub fn set_window_size(&mut self, window_size: usize) -> bool {
        if self.window_size == window_size {
            return false;
        }
        self.window_size = window_size;
        self.recompute()
    }

    pub fn visible(&self) -> impl Iterator<Item = &ChatMessage> + '_ {
        self.visible.iter().map(move |&i| &self.log[i])
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    fn recompute(&mut self) -> bool {
        let Some(current_time) = self.current_time else {
            return false;
        };

        let end = window_end_by(self.candidates.len(), current_time, |i| {
            self.log[self.candidates[i]].time_in_seconds
        });
        let start = end.saturating_sub(self.window_size);

        let mut seen = HashSet::new();
        let visible: Vec<usize> = self.candidates[start..end]
            .iter()
            .copied()
            .filter(|&i| seen.insert(self.log[i].id.as_str()))
            .collect();

        if visible == self.visible {
            return false;
        }
        self.visible = visible;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(times: &[f64]) -> Vec<ChatMessage> {
        times
            .iter()
            .enumerate()
            .map(|(i, &t)| ChatMessage::text(format!("m{}", i), t, "viewer", format!("message {}", i)))
            .collect()
    }

    fn ids<'a>(messages: impl IntoIterator<Item = &'a ChatMessage>) -> Vec<&'a str> {
        messages.into_iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_exact_match_includes_message() {
        let log = log(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(ids(visible_messages(&log, 3.0, 2)), vec!["m1", "m2"]);
    }

    #[test]
    fn test_between_messages() {
        let log = log(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(ids(visible_messages(&log, 3.5, 10)), vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn test_before_first_message() {
        let log = log(&[1.0, 2.0, 3.0]);
        assert!(visible_messages(&log, 0.5, 50).is_empty());
        assert!(visible_messages(&[], 10.0, 50).is_empty());
    }

    #[test]
    fn test_after_last_message() {
        let log = log(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(ids(visible_messages(&log, 100.0, 2)), vec!["m2", "m3"]);
    }

    #[test]
    fn test_window_length_at_each_message() {
        let times: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
        let log = log(&times);
        for (k, message) in log.iter().enumerate() {
            let visible = visible_messages(&log, message.time_in_seconds, 5);
            assert_eq!(visible.len(), (k + 1).min(5));
            assert_eq!(visible.last().map(|m| m.id.as_str()), Some(message.id.as_str()));
        }
    }

    #[test]
    fn test_zero_window() {
        let log = log(&[1.0, 2.0]);
        assert!(visible_messages(&log, 5.0, 0).is_empty());
    }

    #[test]
    fn test_duplicates_removed() {
        let mut log = log(&[1.0, 2.0, 3.0]);
        log[2].id = "m0".to_string();
        log[2].message = "retransmitted".to_string();
        let visible = visible_messages(&log, 3.0, 10);
        assert_eq!(ids(visible.iter().copied()), vec!["m0", "m1"]);
        assert_eq!(visible[0].message, "message 0");
    }

    #[test]
    fn test_negative_times() {
        let log = log(&[-30.0, -1.0, 0.0, 2.0]);
        assert_eq!(ids(visible_messages(&log, 0.0, 10)), vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn test_replay_window_tracks_time() {
        let mut window = ReplayWindow::new(log(&[1.0, 2.0, 3.0, 4.0]), 2);
        assert_eq!(window.visible_len(), 0);

        assert!(window.set_time(2.0));
        assert_eq!(ids(window.visible()), vec!["m0", "m1"]);

        // Same visible set, no change reported
        assert!(!window.set_time(2.5));
        assert!(!window.set_time(2.5));

        assert!(window.set_time(4.0));
        assert_eq!(ids(window.visible()), vec!["m2", "m3"]);

        assert!(window.set_time(0.0));
        assert_eq!(window.visible_len(), 0);
    }

    #[test]
    fn test_replay_window_filter_before_window() {
        let mut messages = log(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        messages[0].message_type = MessageType::Paid;
        messages[3].message_type = MessageType::Paid;
        let mut window = ReplayWindow::new(messages, 2);
        window.set_time(5.0);
        assert_eq!(ids(window.visible()), vec!["m3", "m4"]);

        assert!(window.set_filter(ChatFilter::new().with_types([MessageType::Paid])));
        assert_eq!(ids(window.visible()), vec!["m0", "m3"]);

        assert!(window.set_filter(ChatFilter::new().with_query("MESSAGE 2")));
        assert_eq!(ids(window.visible()), vec!["m2"]);

        assert!(window.set_filter(ChatFilter::new()));
        assert_eq!(ids(window.visible()), vec!["m3", "m4"]);
    }

    #[test]
    fn test_filter_matches_author() {
        let message = ChatMessage::text("a", 0.0, "Moderator", "hello");
        assert!(ChatFilter::new().with_query("moder").matches(&message));
        assert!(!ChatFilter::new().with_query("bye").matches(&message));
        assert!(ChatFilter::new().with_query("   ").is_empty());
    }
}
