//! Message record types shared by the client and the local profile store.
//!
//! A [`DirectMessage`] is the in-memory representation of one message; the
//! on-the-wire request/response shapes live in [`crate::wire`] and are kept
//! separate so the wire format never leaks into stored data.

use serde::{Deserialize, Serialize};

/// Maximum allowed message text size in bytes (16 KB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024;

/// Float seconds since the UNIX epoch, as used by the relay protocol.
///
/// The server timestamps are fractional seconds, so this wraps an `f64`
/// rather than integer milliseconds. Ordering uses IEEE total order via
/// [`total_cmp`](Self::total_cmp) so sorting never panics.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(f64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        Self(secs)
    }

    /// Creates a timestamp from float seconds since the UNIX epoch.
    #[must_use]
    pub const fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    /// Returns the timestamp as float seconds since the UNIX epoch.
    #[must_use]
    pub const fn as_secs(&self) -> f64 {
        self.0
    }

    /// Total ordering over timestamps (IEEE 754 `totalOrder`).
    #[must_use]
    pub fn total_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single direct message between two identified users.
///
/// There is no message identifier in this protocol: two messages are the
/// same record iff all four fields compare equal. Records are immutable
/// once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessage {
    /// The message text.
    pub text: String,
    /// When the message was sent.
    pub timestamp: Timestamp,
    /// Username of the sender.
    pub from: String,
    /// Username of the recipient.
    pub to: String,
}

/// Error returned when a message fails validation before sending.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Message text is empty.
    #[error("message text is empty")]
    Empty,
    /// Message text exceeds the maximum allowed size.
    #[error("message too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the text in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

impl DirectMessage {
    /// Constructs a new message record.
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        timestamp: Timestamp,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            timestamp,
            from: from.into(),
            to: to.into(),
        }
    }

    /// Returns the conversation counterpart relative to `own` — the other
    /// endpoint of this message.
    #[must_use]
    pub fn counterpart<'a>(&'a self, own: &str) -> &'a str {
        if self.from == own { &self.to } else { &self.from }
    }

    /// Validates this message for sending.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Empty`] if the text is empty, or
    /// [`ValidationError::TooLarge`] if it exceeds [`MAX_MESSAGE_SIZE`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.text.is_empty() {
            return Err(ValidationError::Empty);
        }
        let size = self.text.len();
        if size > MAX_MESSAGE_SIZE {
            return Err(ValidationError::TooLarge {
                size,
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(())
    }
}
