//! Scriptable stub implementation of the line-delimited relay protocol.
//!
//! The production server is a fixed external dependency; this crate exists
//! so the integration suite (and manual runs) can exercise the client
//! against a local endpoint with controllable behavior. It implements the
//! observable protocol surface — join handshake with token issuance,
//! direct-message delivery, new/all retrieval — plus failure toggles for
//! driving the client's error paths:
//!
//! - [`set_reject_sends`](StubServer::set_reject_sends) answers sends with
//!   an unexpected acknowledgement.
//! - [`set_garbage_replies`](StubServer::set_garbage_replies) answers every
//!   request with a non-JSON line.
//!
//! Accounts are created on first join; a second join with a different
//! password is rejected. Message timestamps are echoed back exactly as
//! they arrived (string or number), like the real server does.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

/// One message held for a recipient.
#[derive(Debug, Clone)]
struct StoredMessage {
    from: String,
    entry: String,
    /// Timestamp exactly as received (JSON string or number).
    timestamp: Value,
    unread: bool,
}

/// Shared server state.
#[derive(Default)]
struct ServerState {
    /// username -> password; accounts are created on first join.
    accounts: Mutex<HashMap<String, String>>,
    /// username -> stored messages, oldest first.
    mailboxes: Mutex<HashMap<String, Vec<StoredMessage>>>,
    /// token -> username for the current connections.
    tokens: Mutex<HashMap<String, String>>,
    counter: AtomicU64,
    reject_sends: AtomicBool,
    garbage_replies: AtomicBool,
}

/// A running stub server bound to a local port.
pub struct StubServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    task: tokio::task::JoinHandle<()>,
}

impl StubServer {
    /// Binds to an ephemeral localhost port and starts accepting.
    ///
    /// # Errors
    ///
    /// Returns the bind error if the listener cannot be created.
    pub async fn spawn() -> std::io::Result<Self> {
        Self::bind("127.0.0.1:0").await
    }

    /// Binds to the given address and starts accepting.
    ///
    /// # Errors
    ///
    /// Returns the bind error if the listener cannot be created.
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(ServerState::default());

        let accept_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "connection accepted");
                        let conn_state = Arc::clone(&accept_state);
                        tokio::spawn(handle_connection(stream, conn_state));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
        });

        tracing::info!(%addr, "stub server listening");
        Ok(Self { addr, state, task })
    }

    /// The bound socket address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The bound host as a string.
    #[must_use]
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// The bound port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Pre-creates an account without a join.
    pub async fn register(&self, username: &str, password: &str) {
        self.state
            .accounts
            .lock()
            .await
            .insert(username.to_string(), password.to_string());
    }

    /// Queues a message for `to` with a JSON-number timestamp.
    pub async fn inject(&self, from: &str, to: &str, entry: &str, timestamp_secs: f64) {
        self.inject_raw(from, to, entry, json!(timestamp_secs)).await;
    }

    /// Queues a message for `to` with a float-as-string timestamp, the
    /// form produced by clients that embed stringified floats.
    pub async fn inject_with_string_timestamp(
        &self,
        from: &str,
        to: &str,
        entry: &str,
        timestamp: &str,
    ) {
        self.inject_raw(from, to, entry, json!(timestamp)).await;
    }

    async fn inject_raw(&self, from: &str, to: &str, entry: &str, timestamp: Value) {
        self.state
            .mailboxes
            .lock()
            .await
            .entry(to.to_string())
            .or_default()
            .push(StoredMessage {
                from: from.to_string(),
                entry: entry.to_string(),
                timestamp,
                unread: true,
            });
    }

    /// Number of messages stored for a user (read and unread).
    pub async fn stored_count(&self, username: &str) -> usize {
        self.state
            .mailboxes
            .lock()
            .await
            .get(username)
            .map_or(0, Vec::len)
    }

    /// When set, every send is answered with an unexpected acknowledgement.
    pub fn set_reject_sends(&self, reject: bool) {
        self.state.reject_sends.store(reject, Ordering::SeqCst);
    }

    /// When set, every request is answered with a non-JSON line.
    pub fn set_garbage_replies(&self, garbage: bool) {
        self.state.garbage_replies.store(garbage, Ordering::SeqCst);
    }

    /// Stops accepting connections.
    pub fn shutdown(self) {
        self.task.abort();
    }
}

/// Serves one connection: a join line, then operation lines until EOF.
async fn handle_connection(stream: TcpStream, state: Arc<ServerState>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }

        let reply = if state.garbage_replies.load(Ordering::SeqCst) {
            "!!stub-garbage!!".to_string()
        } else {
            handle_request(line.trim_end(), &state).await.to_string()
        };

        if write_half.write_all(reply.as_bytes()).await.is_err()
            || write_half.write_all(b"\r\n").await.is_err()
        {
            return;
        }
    }
}

/// Dispatches one request line to the join/send/retrieve handlers.
async fn handle_request(line: &str, state: &ServerState) -> Value {
    let Ok(request) = serde_json::from_str::<Value>(line) else {
        return error_reply("Invalid request");
    };

    if let Some(join) = request.get("join") {
        return handle_join(join, state).await;
    }

    let Some(token) = request.get("token").and_then(Value::as_str) else {
        return error_reply("Missing token");
    };
    let username = {
        let tokens = state.tokens.lock().await;
        tokens.get(token).cloned()
    };
    let Some(username) = username else {
        return error_reply("Invalid token");
    };

    match request.get("directmessage") {
        Some(Value::String(kind)) => handle_retrieve(&username, kind, state).await,
        Some(Value::Object(payload)) => handle_send(&username, payload, state).await,
        _ => error_reply("Invalid request"),
    }
}

async fn handle_join(join: &Value, state: &ServerState) -> Value {
    let (Some(username), Some(password)) = (
        join.get("username").and_then(Value::as_str),
        join.get("password").and_then(Value::as_str),
    ) else {
        return error_reply("Invalid join request");
    };

    let mut accounts = state.accounts.lock().await;
    match accounts.get(username) {
        Some(stored) if stored != password => {
            tracing::debug!(username, "join rejected: wrong password");
            return error_reply("Invalid password");
        }
        Some(_) => {}
        None => {
            tracing::debug!(username, "account created on first join");
            accounts.insert(username.to_string(), password.to_string());
        }
    }
    drop(accounts);

    let token = format!("tok-{}", state.counter.fetch_add(1, Ordering::SeqCst));
    state
        .tokens
        .lock()
        .await
        .insert(token.clone(), username.to_string());

    json!({"response": {"type": "ok", "token": token}})
}

async fn handle_send(
    sender: &str,
    payload: &serde_json::Map<String, Value>,
    state: &ServerState,
) -> Value {
    if state.reject_sends.load(Ordering::SeqCst) {
        return json!({"response": {"type": "error", "message": "Send rejected"}});
    }

    let (Some(entry), Some(recipient)) = (
        payload.get("entry").and_then(Value::as_str),
        payload.get("recipient").and_then(Value::as_str),
    ) else {
        return error_reply("Invalid directmessage");
    };
    let timestamp = payload.get("timestamp").cloned().unwrap_or(Value::Null);

    state
        .mailboxes
        .lock()
        .await
        .entry(recipient.to_string())
        .or_default()
        .push(StoredMessage {
            from: sender.to_string(),
            entry: entry.to_string(),
            timestamp,
            unread: true,
        });

    tracing::debug!(sender, recipient, "message stored");
    json!({"response": {"type": "ok", "message": "Direct message sent"}})
}

async fn handle_retrieve(username: &str, kind: &str, state: &ServerState) -> Value {
    let mut mailboxes = state.mailboxes.lock().await;
    let mailbox = mailboxes.entry(username.to_string()).or_default();

    let selected: Vec<Value> = match kind {
        "new" => {
            let unread: Vec<Value> = mailbox
                .iter()
                .filter(|m| m.unread)
                .map(record_json)
                .collect();
            for message in mailbox.iter_mut() {
                message.unread = false;
            }
            unread
        }
        "all" => mailbox.iter().map(record_json).collect(),
        _ => return error_reply("Invalid retrieve kind"),
    };
    drop(mailboxes);

    json!({"response": {"type": "ok", "messages": selected}})
}

fn record_json(message: &StoredMessage) -> Value {
    json!({
        "message": message.entry,
        "timestamp": message.timestamp,
        "from": message.from,
    })
}

fn error_reply(message: &str) -> Value {
    json!({"response": {"type": "error", "message": message}})
}
