//! Integration tests for the client operations against the stub server.
//!
//! Covers the externally observable contract:
//! - `send` succeeds iff the acknowledgement is the exact expected literal;
//!   every other reply is a distinguishable rejection.
//! - Auth rejection, unreachable server, and malformed replies surface as
//!   distinct error kinds, and none of them panic.
//! - Retrieval maps raw records onto the requesting account and preserves
//!   server order; the contact set is the union of explicit contacts and
//!   message counterparts.

use std::time::Duration;

use relaychat::messenger::{DirectMessenger, SendError};
use relaychat::profile::Profile;
use relaychat::session::{Credentials, SessionConfig, SessionError};
use relaychat_stub::StubServer;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config_for(server: &StubServer) -> SessionConfig {
    SessionConfig {
        host: server.host(),
        port: server.port(),
        connect_timeout: Duration::from_secs(2),
        io_timeout: Duration::from_secs(2),
    }
}

fn messenger_for(server: &StubServer, username: &str) -> DirectMessenger {
    DirectMessenger::new(config_for(server), Credentials::new(username, "pw"))
}

// ---------------------------------------------------------------------------
// Send
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_succeeds_on_exact_acknowledgement() {
    let server = StubServer::spawn().await.unwrap();
    let mut alice = messenger_for(&server, "alice");

    let message = alice.send("hello bob", "bob").await.unwrap();
    assert_eq!(message.from, "alice");
    assert_eq!(message.to, "bob");
    assert_eq!(message.text, "hello bob");

    // The sent log holds the acknowledged message.
    assert_eq!(alice.sent_messages(), [message]);
    // The server actually stored it for the recipient.
    assert_eq!(server.stored_count("bob").await, 1);
}

#[tokio::test]
async fn send_with_unexpected_acknowledgement_is_rejected() {
    let server = StubServer::spawn().await.unwrap();
    server.set_reject_sends(true);
    let mut alice = messenger_for(&server, "alice");

    let result = alice.send("hello", "bob").await;
    match result {
        Err(SendError::Rejected { reply }) => {
            assert_eq!(reply.as_deref(), Some("Send rejected"));
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
    // A refused message never enters the sent log.
    assert!(alice.sent_messages().is_empty());
}

#[tokio::test]
async fn send_round_trips_hostile_text() {
    // Quotes, backslashes, and control characters must survive the wire
    // encoding intact.
    let server = StubServer::spawn().await.unwrap();
    let mut alice = messenger_for(&server, "alice");
    let hostile = "she said \"hi\\there\"\nand\tleft";

    alice.send(hostile, "bob").await.unwrap();

    let bob = messenger_for(&server, "bob");
    let received = bob.retrieve_new().await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].text, hostile);
}

// ---------------------------------------------------------------------------
// Failure kinds are distinguishable
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bad_credentials_are_an_auth_error() {
    let server = StubServer::spawn().await.unwrap();
    server.register("alice", "correct-password").await;

    let mut alice = messenger_for(&server, "alice"); // uses "pw"
    let send_result = alice.send("hi", "bob").await;
    assert!(matches!(
        send_result,
        Err(SendError::Session(SessionError::Auth(_)))
    ));

    let retrieve_result = alice.retrieve_new().await;
    assert!(matches!(retrieve_result, Err(SessionError::Auth(_))));
}

#[tokio::test]
async fn unreachable_server_is_a_connect_error_not_auth() {
    // Bind a port, then release it before the client connects.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = SessionConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        connect_timeout: Duration::from_secs(2),
        io_timeout: Duration::from_secs(2),
    };

    // Connecting to the now-closed port must be reported as a connection
    // failure, distinguishable from rejected credentials.
    let mut alice = DirectMessenger::new(config, Credentials::new("alice", "pw"));
    let result = alice.send("hi", "bob").await;
    assert!(matches!(
        result,
        Err(SendError::Session(
            SessionError::Connect { .. } | SessionError::Timeout(_)
        ))
    ));
}

#[tokio::test]
async fn garbage_reply_is_a_protocol_error() {
    let server = StubServer::spawn().await.unwrap();
    server.set_garbage_replies(true);
    let alice = messenger_for(&server, "alice");

    // The client must fail loudly, never silently return empty data.
    let result = alice.retrieve_new().await;
    assert!(matches!(result, Err(SessionError::Protocol(_))));
}

// ---------------------------------------------------------------------------
// Retrieval
// ---------------------------------------------------------------------------

#[tokio::test]
async fn retrieved_messages_are_addressed_to_the_requesting_account() {
    let server = StubServer::spawn().await.unwrap();
    server.inject("bob", "alice", "first", 10.0).await;
    server
        .inject_with_string_timestamp("carol", "alice", "second", "11.5")
        .await;

    let alice = messenger_for(&server, "alice");
    let messages = alice.retrieve_new().await.unwrap();

    assert_eq!(messages.len(), 2);
    // Server order preserved, `to` filled with the own username, and both
    // timestamp encodings parsed.
    assert_eq!(messages[0].from, "bob");
    assert_eq!(messages[0].to, "alice");
    assert_eq!(messages[0].timestamp.as_secs(), 10.0);
    assert_eq!(messages[1].from, "carol");
    assert_eq!(messages[1].to, "alice");
    assert_eq!(messages[1].timestamp.as_secs(), 11.5);
}

#[tokio::test]
async fn retrieve_new_drains_while_retrieve_all_keeps_everything() {
    let server = StubServer::spawn().await.unwrap();
    server.inject("bob", "alice", "hello", 1.0).await;

    let alice = messenger_for(&server, "alice");
    assert_eq!(alice.retrieve_new().await.unwrap().len(), 1);
    assert_eq!(alice.retrieve_new().await.unwrap().len(), 0);
    assert_eq!(alice.retrieve_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn retrieving_zero_messages_returns_an_empty_list() {
    let server = StubServer::spawn().await.unwrap();
    let alice = messenger_for(&server, "alice");

    let messages = alice.retrieve_new().await.unwrap();
    assert!(messages.is_empty());
}

// ---------------------------------------------------------------------------
// Contact set
// ---------------------------------------------------------------------------

#[tokio::test]
async fn contact_set_unions_explicit_contacts_with_counterparts() {
    let server = StubServer::spawn().await.unwrap();
    server.inject("bob", "me", "hi there", 5.0).await;

    let mut profile = Profile::new("me", "pw");
    profile.add_contact("zoe");

    let mut messenger = messenger_for(&server, "me");
    let sent = messenger.send("hi", "alice").await.unwrap();
    profile.add_message(sent);
    for message in messenger.retrieve_new().await.unwrap() {
        profile.add_message(message);
    }

    let contacts: Vec<String> = profile.contacts().into_iter().collect();
    assert_eq!(contacts, ["alice", "bob", "zoe"]);
}
