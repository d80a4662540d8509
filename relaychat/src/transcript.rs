//! Chat transcript rendering for one conversation.
//!
//! A [`Transcript`] is derived, never persisted: it is rebuilt or extended
//! on demand from the profile's message subset for one contact. Input
//! order is whatever the server or store produced, so the builder
//! stable-sorts by timestamp before rendering. Extending with overlapping
//! input must be idempotent — repeated polling cycles hand the builder
//! messages it has already rendered, and those must not produce duplicate
//! lines.

use relaychat_proto::message::DirectMessage;

/// Renders one message as a transcript line.
#[must_use]
pub fn render_line(message: &DirectMessage) -> String {
    format!("{} : {}", message.from, message.text)
}

/// An ordered, deduplicated rendering of one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    /// Creates an empty transcript.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Builds a transcript from a message set.
    ///
    /// Messages are stable-sorted ascending by timestamp (ties keep their
    /// input order) and rendered as `"<from> : <text>"`.
    #[must_use]
    pub fn build(messages: &[DirectMessage]) -> Self {
        let mut transcript = Self::new();
        transcript.extend(messages);
        transcript
    }

    /// Merges a message set into this transcript.
    ///
    /// The input is sorted as in [`build`](Self::build); any rendered line
    /// whose exact text already appears in the transcript is skipped.
    /// Returns the number of lines appended, so callers can decide whether
    /// a re-render is needed.
    pub fn extend(&mut self, messages: &[DirectMessage]) -> usize {
        let mut sorted: Vec<&DirectMessage> = messages.iter().collect();
        sorted.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let mut appended = 0;
        for message in sorted {
            let line = render_line(message);
            if !self.lines.contains(&line) {
                self.lines.push(line);
                appended += 1;
            }
        }
        appended
    }

    /// The transcript lines, oldest first.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whether the transcript has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of lines in the transcript.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }
}

impl IntoIterator for Transcript {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.into_iter()
    }
}
