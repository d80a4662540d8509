//! On-the-wire request and response shapes for the relay protocol.
//!
//! Requests are serde-serialized structs, never string interpolation, so
//! message text containing quotes, backslashes, or control characters is
//! escaped correctly by the encoder.
//!
//! Responses all arrive as `{"response": {...}}` where the payload carries
//! some subset of `type`, `token`, `message`, and `messages` depending on
//! the request kind. The send acknowledgement uses the singular `message`
//! field while retrieval uses the plural `messages` — a quirk of the fixed
//! server protocol, preserved here. Every field is optional in the model;
//! the typed accessors fail loudly when an expected field is absent.

use serde::{Deserialize, Serialize};

use crate::codec::ProtocolError;
use crate::message::Timestamp;

/// The exact acknowledgement text the server returns for a successful send.
pub const SEND_ACK: &str = "Direct message sent";

/// The response `type` value signalling success.
pub const RESPONSE_OK: &str = "ok";

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Authentication handshake request: `{"join": {...}}`.
#[derive(Debug, Serialize)]
pub struct JoinRequest<'a> {
    /// The credentials payload.
    pub join: JoinPayload<'a>,
}

/// Inner payload of a [`JoinRequest`].
#[derive(Debug, Serialize)]
pub struct JoinPayload<'a> {
    /// Account username.
    pub username: &'a str,
    /// Account password.
    pub password: &'a str,
    /// Always empty on a join — the server issues the token.
    pub token: &'a str,
}

impl<'a> JoinRequest<'a> {
    /// Builds a join request with an empty token placeholder.
    #[must_use]
    pub const fn new(username: &'a str, password: &'a str) -> Self {
        Self {
            join: JoinPayload {
                username,
                password,
                token: "",
            },
        }
    }
}

/// Send-message request: `{"token": t, "directmessage": {...}}`.
#[derive(Debug, Serialize)]
pub struct SendRequest<'a> {
    /// The session token from the join reply.
    pub token: &'a str,
    /// The message payload.
    pub directmessage: SendPayload<'a>,
}

/// Inner payload of a [`SendRequest`].
#[derive(Debug, Serialize)]
pub struct SendPayload<'a> {
    /// The message text.
    pub entry: &'a str,
    /// Username of the recipient.
    pub recipient: &'a str,
    /// Send time as a float-as-string, e.g. `"1603167689.3928561"`.
    pub timestamp: String,
}

impl<'a> SendRequest<'a> {
    /// Builds a send request. The timestamp is rendered to the
    /// float-as-string form the server expects.
    #[must_use]
    pub fn new(token: &'a str, entry: &'a str, recipient: &'a str, timestamp: Timestamp) -> Self {
        Self {
            token,
            directmessage: SendPayload {
                entry,
                recipient,
                timestamp: timestamp.to_string(),
            },
        }
    }
}

/// Which stored messages a retrieve request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrieveKind {
    /// Messages not yet delivered to this account.
    New,
    /// Every message stored for this account.
    All,
}

impl std::fmt::Display for RetrieveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::All => write!(f, "all"),
        }
    }
}

/// Retrieve request: `{"token": t, "directmessage": "new"|"all"}`.
#[derive(Debug, Serialize)]
pub struct RetrieveRequest<'a> {
    /// The session token from the join reply.
    pub token: &'a str,
    /// Which messages to retrieve.
    pub directmessage: RetrieveKind,
}

impl<'a> RetrieveRequest<'a> {
    /// Builds a retrieve request.
    #[must_use]
    pub const fn new(token: &'a str, kind: RetrieveKind) -> Self {
        Self {
            token,
            directmessage: kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Top-level `{"response": {...}}` envelope every server reply uses.
#[derive(Debug, Deserialize)]
pub struct ResponseEnvelope {
    /// The reply payload.
    pub response: ServerResponse,
}

/// One server reply payload with every protocol field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerResponse {
    /// Response type tag (`"ok"` or an error kind).
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Session token (join replies).
    pub token: Option<String>,
    /// Literal acknowledgement text (send replies).
    pub message: Option<String>,
    /// Retrieved message records (retrieve replies).
    pub messages: Option<Vec<MessageRecord>>,
}

impl ServerResponse {
    /// Whether the response type tag signals success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.kind.as_deref() == Some(RESPONSE_OK)
    }

    /// The session token of a join reply.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingField`] if the reply has no token.
    pub fn token(&self) -> Result<&str, ProtocolError> {
        self.token
            .as_deref()
            .ok_or(ProtocolError::MissingField("token"))
    }

    /// The message records of a retrieve reply.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingField`] if the reply has no
    /// `messages` list. An empty list is a valid reply, not an error.
    pub fn records(&self) -> Result<&[MessageRecord], ProtocolError> {
        self.messages
            .as_deref()
            .ok_or(ProtocolError::MissingField("messages"))
    }
}

/// One raw message record inside a retrieve reply.
///
/// The record carries no recipient — the server only returns messages
/// addressed to the authenticated account, so the client fills in `to`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageRecord {
    /// The message text.
    pub message: String,
    /// Send time. The server echoes whatever senders embedded, so this
    /// arrives either as a JSON number or as a float-as-string.
    #[serde(deserialize_with = "timestamp_number_or_string")]
    pub timestamp: Timestamp,
    /// Username of the sender.
    pub from: String,
}

/// Accepts a timestamp encoded as a JSON number or a float-as-string.
fn timestamp_number_or_string<'de, D>(deserializer: D) -> Result<Timestamp, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;

    impl serde::de::Visitor<'_> for Visitor {
        type Value = Timestamp;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a float or a float-as-string timestamp")
        }

        fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Timestamp, E> {
            Ok(Timestamp::from_secs(v))
        }

        #[allow(clippy::cast_precision_loss)]
        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Timestamp, E> {
            Ok(Timestamp::from_secs(v as f64))
        }

        #[allow(clippy::cast_precision_loss)]
        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Timestamp, E> {
            Ok(Timestamp::from_secs(v as f64))
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Timestamp, E> {
            v.parse::<f64>()
                .map(Timestamp::from_secs)
                .map_err(|_| E::invalid_value(serde::de::Unexpected::Str(v), &self))
        }
    }

    deserializer.deserialize_any(Visitor)
}
