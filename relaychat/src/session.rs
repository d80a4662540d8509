//! One-operation-per-connection session client.
//!
//! Every public operation against the relay server pays a full round trip:
//! connect, authenticate (join), perform exactly one operation, disconnect.
//! The lifecycle is modeled as an explicit state machine with a timeout on
//! every transition:
//!
//! ```text
//! Disconnected -> Joining -> Authenticated -> OperationInFlight -> Closed
//! ```
//!
//! There is no retry and no connection reuse; the session token issued by
//! the join reply lives only inside one operation's future and is never
//! stored on the client or persisted. The socket is closed on every exit
//! path, including auth rejection and protocol failures.

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use relaychat_proto::codec::{self, ProtocolError};
use relaychat_proto::message::Timestamp;
use relaychat_proto::wire::{RetrieveKind, ServerResponse};

/// Default relay server host.
pub const DEFAULT_HOST: &str = "168.235.86.101";

/// Default relay server port.
pub const DEFAULT_PORT: u16 = 3021;

/// Endpoint and timeout configuration for session operations.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Relay server hostname or IP address.
    pub host: String,
    /// Relay server TCP port.
    pub port: u16,
    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Timeout for each request/reply exchange on the socket.
    pub io_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(10),
        }
    }
}

/// Account credentials, fixed for the lifetime of a client.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Account username.
    pub username: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Creates a credentials pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Lifecycle states of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// TCP connection not yet established.
    Disconnected,
    /// Join request sent, awaiting the auth reply.
    Joining,
    /// Join accepted, token in hand.
    Authenticated,
    /// Operation request sent, awaiting its reply.
    OperationInFlight,
    /// Connection shut down.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "connect"),
            Self::Joining => write!(f, "join"),
            Self::Authenticated => write!(f, "authenticated"),
            Self::OperationInFlight => write!(f, "operation"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// The single operation a session performs after authenticating.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Send one direct message.
    Send {
        /// The message text.
        entry: String,
        /// Username of the recipient.
        recipient: String,
        /// Send time embedded in the request.
        timestamp: Timestamp,
    },
    /// Retrieve stored messages.
    Retrieve(RetrieveKind),
}

/// Errors from a session operation, distinguishing the failure classes the
/// caller handles differently: unreachable server, rejected credentials,
/// and malformed protocol data.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// DNS resolution or TCP connect failed; nothing was sent.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        /// Host that was attempted.
        host: String,
        /// Port that was attempted.
        port: u16,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Socket read/write failed mid-session.
    #[error("socket I/O failed during {state}: {source}")]
    Io {
        /// The state the session was in.
        state: SessionState,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A transition did not complete within its timeout.
    #[error("timed out during {0}")]
    Timeout(SessionState),

    /// The server rejected the join request.
    #[error("server rejected credentials: {0}")]
    Auth(String),

    /// The server reply was not parseable or lacked an expected field.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Client performing one-shot session operations against a fixed endpoint.
#[derive(Debug, Clone)]
pub struct SessionClient {
    config: SessionConfig,
}

impl SessionClient {
    /// Creates a client for the given endpoint configuration.
    #[must_use]
    pub const fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Returns the endpoint configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs one complete session: connect, join, perform `operation`,
    /// close. Returns the operation's reply payload.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connect`] or [`SessionError::Timeout`] if the
    /// server is unreachable, [`SessionError::Auth`] if the join is
    /// rejected (no operation request is sent on that path), and
    /// [`SessionError::Protocol`] if a reply is not valid structured data.
    pub async fn run(
        &self,
        credentials: &Credentials,
        operation: Operation,
    ) -> Result<ServerResponse, SessionError> {
        let mut session = Session::connect(&self.config).await?;
        let result = session.drive(credentials, operation).await;
        session.close().await;
        result
    }
}

/// One live connection walking through the session states.
struct Session {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    state: SessionState,
    io_timeout: Duration,
}

impl Session {
    /// Opens the TCP connection under the connect timeout.
    async fn connect(config: &SessionConfig) -> Result<Self, SessionError> {
        let stream = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        .map_err(|_| SessionError::Timeout(SessionState::Disconnected))?
        .map_err(|source| SessionError::Connect {
            host: config.host.clone(),
            port: config.port,
            source,
        })?;

        tracing::debug!(host = %config.host, port = config.port, "session connected");

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            state: SessionState::Disconnected,
            io_timeout: config.io_timeout,
        })
    }

    /// Joins and performs the single operation.
    async fn drive(
        &mut self,
        credentials: &Credentials,
        operation: Operation,
    ) -> Result<ServerResponse, SessionError> {
        self.transition(SessionState::Joining);
        let join_line = codec::encode_join(&credentials.username, &credentials.password)?;
        let join_reply = self.exchange(&join_line).await?;

        let kind = join_reply
            .kind
            .as_deref()
            .ok_or(ProtocolError::MissingField("type"))?;
        if !join_reply.is_ok() {
            return Err(SessionError::Auth(kind.to_string()));
        }
        let token = join_reply.token()?.to_string();
        self.transition(SessionState::Authenticated);

        let op_line = match &operation {
            Operation::Send {
                entry,
                recipient,
                timestamp,
            } => codec::encode_send(&token, entry, recipient, *timestamp)?,
            Operation::Retrieve(kind) => codec::encode_retrieve(&token, *kind)?,
        };
        self.transition(SessionState::OperationInFlight);
        self.exchange(&op_line).await
    }

    /// Writes one request line and reads one reply line, both under the
    /// I/O timeout.
    async fn exchange(&mut self, line: &str) -> Result<ServerResponse, SessionError> {
        let state = self.state;

        tokio::time::timeout(self.io_timeout, self.writer.write_all(line.as_bytes()))
            .await
            .map_err(|_| SessionError::Timeout(state))?
            .map_err(|source| SessionError::Io { state, source })?;

        let mut reply = String::new();
        let n = tokio::time::timeout(self.io_timeout, self.reader.read_line(&mut reply))
            .await
            .map_err(|_| SessionError::Timeout(state))?
            .map_err(|source| SessionError::Io { state, source })?;
        if n == 0 {
            return Err(SessionError::Io {
                state,
                source: std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                ),
            });
        }

        Ok(codec::decode_response(&reply)?)
    }

    /// Shuts the connection down; runs on every exit path.
    async fn close(mut self) {
        let _ = self.writer.shutdown().await;
        self.transition(SessionState::Closed);
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = %self.state, to = %next, "session transition");
        self.state = next;
    }
}
