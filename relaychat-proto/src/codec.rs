//! Encoding and decoding for the line-delimited relay protocol.
//!
//! Every exchange is one CRLF-terminated JSON line in each direction. The
//! encoders produce complete request lines ready to write to the socket;
//! [`decode_response`] parses one reply line into a
//! [`ServerResponse`](crate::wire::ServerResponse) and fails loudly on
//! anything that is not valid structured data — it never substitutes
//! partial or empty results.

use crate::message::Timestamp;
use crate::wire::{JoinRequest, ResponseEnvelope, RetrieveKind, RetrieveRequest, SendRequest, ServerResponse};

/// Terminator appended to every request line.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Error type for protocol encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The reply was not valid JSON or did not carry a `response` envelope.
    #[error("malformed server response: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The reply parsed but lacks a field the request kind requires.
    #[error("server response missing expected field `{0}`")]
    MissingField(&'static str),
}

/// Encodes a join request line for the given credentials.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if serialization fails.
pub fn encode_join(username: &str, password: &str) -> Result<String, ProtocolError> {
    encode_line(&JoinRequest::new(username, password))
}

/// Encodes a send request line.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if serialization fails.
pub fn encode_send(
    token: &str,
    entry: &str,
    recipient: &str,
    timestamp: Timestamp,
) -> Result<String, ProtocolError> {
    encode_line(&SendRequest::new(token, entry, recipient, timestamp))
}

/// Encodes a retrieve request line.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if serialization fails.
pub fn encode_retrieve(token: &str, kind: RetrieveKind) -> Result<String, ProtocolError> {
    encode_line(&RetrieveRequest::new(token, kind))
}

/// Decodes one reply line into a [`ServerResponse`].
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if the line is not valid JSON or
/// has no `response` envelope.
pub fn decode_response(line: &str) -> Result<ServerResponse, ProtocolError> {
    let envelope: ResponseEnvelope = serde_json::from_str(line.trim_end())?;
    Ok(envelope.response)
}

/// Serializes a request and appends the line terminator.
fn encode_line<T: serde::Serialize>(request: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(request)?;
    line.push_str(LINE_TERMINATOR);
    Ok(line)
}
