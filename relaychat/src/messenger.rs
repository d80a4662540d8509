//! Public client API for sending and retrieving direct messages.
//!
//! [`DirectMessenger`] holds the account credentials and endpoint
//! configuration; every call delegates to [`SessionClient`] and therefore
//! pays a full connect+join round trip. Successfully sent messages are
//! appended to an in-memory sent log owned by the messenger — persisting
//! them into the profile is the caller's responsibility.

use relaychat_proto::message::{DirectMessage, Timestamp, ValidationError};
use relaychat_proto::wire::{RetrieveKind, SEND_ACK};

use crate::session::{Credentials, Operation, SessionClient, SessionConfig, SessionError};

/// Errors from a send operation.
///
/// A plain boolean cannot distinguish "server unreachable" from "rejected
/// credentials" from "send refused", so the failure classes are explicit:
/// the caller can prompt for credentials on [`Session`](Self::Session)
/// auth errors and surface [`Rejected`](Self::Rejected) replies verbatim.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The message failed validation before anything was sent.
    #[error("invalid message: {0}")]
    Validation(#[from] ValidationError),

    /// The session failed (unreachable, auth rejected, protocol error).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The server replied, but not with the expected acknowledgement.
    #[error("server refused the message (reply: {reply:?})")]
    Rejected {
        /// The acknowledgement text the server did return, if any.
        reply: Option<String>,
    },
}

/// Client API for one account against one relay server.
#[derive(Debug)]
pub struct DirectMessenger {
    client: SessionClient,
    credentials: Credentials,
    sent_log: Vec<DirectMessage>,
}

impl DirectMessenger {
    /// Creates a messenger for the given endpoint and account.
    #[must_use]
    pub const fn new(config: SessionConfig, credentials: Credentials) -> Self {
        Self {
            client: SessionClient::new(config),
            credentials,
            sent_log: Vec::new(),
        }
    }

    /// The account username every retrieved message is addressed to.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Messages successfully sent through this messenger, oldest first.
    #[must_use]
    pub fn sent_messages(&self) -> &[DirectMessage] {
        &self.sent_log
    }

    /// Sends one direct message.
    ///
    /// Succeeds iff the server acknowledgement equals exactly
    /// [`SEND_ACK`]; the constructed message record (timestamped at call
    /// time, `from` set to the own account) is then appended to the sent
    /// log and returned so the caller can persist it.
    ///
    /// # Errors
    ///
    /// [`SendError::Validation`] for empty or oversized text,
    /// [`SendError::Session`] for connect/auth/protocol failures, and
    /// [`SendError::Rejected`] when the server replies with anything other
    /// than the expected acknowledgement.
    pub async fn send(&mut self, text: &str, recipient: &str) -> Result<DirectMessage, SendError> {
        let message = DirectMessage::new(
            text,
            Timestamp::now(),
            self.credentials.username.clone(),
            recipient,
        );
        message.validate()?;

        let reply = self
            .client
            .run(
                &self.credentials,
                Operation::Send {
                    entry: message.text.clone(),
                    recipient: message.to.clone(),
                    timestamp: message.timestamp,
                },
            )
            .await?;

        if reply.message.as_deref() == Some(SEND_ACK) {
            tracing::info!(recipient = %message.to, "message sent");
            self.sent_log.push(message.clone());
            Ok(message)
        } else {
            tracing::warn!(
                recipient = %message.to,
                reply = reply.message.as_deref().unwrap_or("<none>"),
                "server refused the message"
            );
            Err(SendError::Rejected {
                reply: reply.message,
            })
        }
    }

    /// Retrieves messages not yet delivered to this account.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] on connect, auth, or protocol failure.
    pub async fn retrieve_new(&self) -> Result<Vec<DirectMessage>, SessionError> {
        self.retrieve(RetrieveKind::New).await
    }

    /// Retrieves every message stored for this account.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] on connect, auth, or protocol failure.
    pub async fn retrieve_all(&self) -> Result<Vec<DirectMessage>, SessionError> {
        self.retrieve(RetrieveKind::All).await
    }

    /// Shared retrieval path. Each raw record becomes a [`DirectMessage`]
    /// with `to` set to the own username; server order is preserved —
    /// sorting is the transcript builder's concern.
    async fn retrieve(&self, kind: RetrieveKind) -> Result<Vec<DirectMessage>, SessionError> {
        let reply = self
            .client
            .run(&self.credentials, Operation::Retrieve(kind))
            .await?;

        let messages: Vec<DirectMessage> = reply
            .records()?
            .iter()
            .map(|record| {
                DirectMessage::new(
                    record.message.clone(),
                    record.timestamp,
                    record.from.clone(),
                    self.credentials.username.clone(),
                )
            })
            .collect();

        tracing::debug!(kind = %kind, count = messages.len(), "messages retrieved");
        Ok(messages)
    }
}
