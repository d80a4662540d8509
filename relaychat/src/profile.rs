//! Persistent local profile: credentials, messages, and contacts.
//!
//! The [`Profile`] is the aggregate the rest of the client works against;
//! [`ProfileStore`] owns its on-disk JSON representation (`.dsu` file).
//! Saves go through a temp-file-then-rename so a crash mid-write never
//! leaves a file that fails to parse on the next load.
//!
//! Credentials are stored in plaintext inside the profile file. That is a
//! known weakness of the format; secrecy of the local file is out of scope
//! for this client.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use relaychat_proto::message::DirectMessage;

/// Errors from loading or saving a profile.
///
/// `NotFound` and `Corrupt` are distinct so a caller can offer "create a
/// new profile" for the former and refuse to clobber data for the latter.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// No profile file exists at the path.
    #[error("no profile at {path}")]
    NotFound {
        /// Path that was attempted.
        path: PathBuf,
    },

    /// The file exists but does not parse into the expected shape.
    #[error("profile at {path} is corrupt: {source}")]
    Corrupt {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// Reading or writing the file failed.
    #[error("profile I/O failed at {path}: {source}")]
    Io {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// The locally persisted aggregate of credentials, messages, and contacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Account username.
    pub username: String,
    /// Account password (plaintext, see module docs).
    pub password: String,
    /// Every known message, sent and received, in insertion order.
    pub messages: Vec<DirectMessage>,
    /// Contacts the user added explicitly.
    pub contacts: BTreeSet<String>,
}

impl Profile {
    /// Creates an empty profile for the given account.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            messages: Vec::new(),
            contacts: BTreeSet::new(),
        }
    }

    /// Appends a message iff no stored message is field-wise equal.
    ///
    /// Returns whether an insertion happened, so callers can decide
    /// whether a save and re-render are needed. Equality is exact-duplicate
    /// semantics over all four fields; the protocol has no message ids.
    pub fn add_message(&mut self, message: DirectMessage) -> bool {
        if self.messages.contains(&message) {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Adds a contact explicitly. Idempotent; returns whether the set grew.
    pub fn add_contact(&mut self, username: impl Into<String>) -> bool {
        self.contacts.insert(username.into())
    }

    /// The full contact set: explicit contacts unioned with every
    /// counterpart username appearing in stored messages.
    #[must_use]
    pub fn contacts(&self) -> BTreeSet<String> {
        let mut contacts = self.contacts.clone();
        for message in &self.messages {
            contacts.insert(message.counterpart(&self.username).to_string());
        }
        contacts
    }

    /// The stored messages exchanged with one contact, in storage order.
    #[must_use]
    pub fn chat_messages(&self, contact: &str) -> Vec<&DirectMessage> {
        self.messages
            .iter()
            .filter(|m| m.from == contact || m.to == contact)
            .collect()
    }
}

/// Owns the on-disk location of one profile.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    /// Creates a store for the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The profile file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a profile file currently exists at the path.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Loads the persisted profile.
    ///
    /// # Errors
    ///
    /// [`ProfileError::NotFound`] if the path does not exist,
    /// [`ProfileError::Corrupt`] if the content does not parse, and
    /// [`ProfileError::Io`] for any other read failure.
    pub fn load(&self) -> Result<Profile, ProfileError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ProfileError::NotFound {
                    path: self.path.clone(),
                }
            } else {
                ProfileError::Io {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;

        serde_json::from_str(&contents).map_err(|source| ProfileError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Saves the full profile, overwriting the target.
    ///
    /// The content is written to a sibling temp file and renamed into
    /// place, so an interrupted save leaves either the old file or the new
    /// one — never a half-written mix. Parent directories are created on
    /// demand.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::Io`] if the directory, temp write, or
    /// rename fails.
    pub fn save(&self, profile: &Profile) -> Result<(), ProfileError> {
        let io_err = |source| ProfileError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        // Serialization of the in-memory aggregate cannot produce invalid
        // JSON; map the impossible case onto Io for a single error path.
        let contents = serde_json::to_string_pretty(profile)
            .map_err(|e| io_err(std::io::Error::other(e)))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, contents).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;

        tracing::debug!(path = %self.path.display(), messages = profile.messages.len(), "profile saved");
        Ok(())
    }
}
