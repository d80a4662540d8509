//! Integration tests for the background sync loop.
//!
//! Drives the task through its command channel and asserts on emitted
//! events and on-disk state: merges persist, empty cycles are true no-ops,
//! failures are reported without stopping the loop.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use relaychat::messenger::DirectMessenger;
use relaychat::profile::{Profile, ProfileStore};
use relaychat::session::{Credentials, SessionConfig};
use relaychat::sync::{SyncCommand, SyncConfig, SyncEvent, SyncHandle, spawn_sync};
use relaychat_proto::message::{DirectMessage, Timestamp};
use relaychat_stub::StubServer;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// A unique on-disk profile seeded for `alice`.
fn seeded_store() -> ProfileStore {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir().join(format!(
        "relaychat-sync-test-{}-{n}.dsu",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    let store = ProfileStore::new(path);
    store.save(&Profile::new("alice", "pw")).unwrap();
    store
}

fn messenger_for(server: &StubServer) -> DirectMessenger {
    DirectMessenger::new(
        SessionConfig {
            host: server.host(),
            port: server.port(),
            connect_timeout: Duration::from_secs(2),
            io_timeout: Duration::from_secs(2),
        },
        Credentials::new("alice", "pw"),
    )
}

/// A sync config with a long interval, so cycles only run via `SyncNow`
/// (plus the immediate initial tick) and tests stay deterministic.
fn manual_sync_config() -> SyncConfig {
    SyncConfig {
        interval: Duration::from_secs(3600),
        event_buffer: 64,
    }
}

async fn next_event(handle: &mut SyncHandle) -> SyncEvent {
    tokio::time::timeout(Duration::from_secs(5), handle.events.recv())
        .await
        .expect("timed out waiting for a sync event")
        .expect("sync task dropped its event channel")
}

async fn sync_now(handle: &SyncHandle) {
    handle.commands.send(SyncCommand::SyncNow).await.unwrap();
}

fn cleanup(store: &ProfileStore) {
    let _ = std::fs::remove_file(store.path());
}

// ---------------------------------------------------------------------------
// Merging and persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn merge_persists_messages_and_updates_snapshot() {
    let server = StubServer::spawn().await.unwrap();
    server.inject("bob", "alice", "hello", 10.0).await;
    let store = seeded_store();

    let mut handle = spawn_sync(messenger_for(&server), store.clone(), &manual_sync_config())
        .unwrap();
    sync_now(&handle).await;

    let mut saw_merge = false;
    let mut saw_contacts = false;
    for _ in 0..2 {
        match next_event(&mut handle).await {
            SyncEvent::Merged { new_messages } => {
                assert_eq!(new_messages, 1);
                saw_merge = true;
            }
            SyncEvent::ContactsChanged(contacts) => {
                assert!(contacts.contains("bob"));
                saw_contacts = true;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert!(saw_merge && saw_contacts);

    // Persisted state and the shared snapshot both carry the message.
    let expected = DirectMessage::new("hello", Timestamp::from_secs(10.0), "bob", "alice");
    let on_disk = store.load().unwrap();
    assert_eq!(on_disk.messages, [expected.clone()]);
    assert_eq!(handle.snapshot().messages, [expected]);

    handle.shutdown().await;
    cleanup(&store);
}

#[tokio::test]
async fn cycle_with_no_new_messages_is_a_true_noop() {
    let server = StubServer::spawn().await.unwrap();
    let store = seeded_store();
    let bytes_before = std::fs::read(store.path()).unwrap();

    let mut handle = spawn_sync(messenger_for(&server), store.clone(), &manual_sync_config())
        .unwrap();
    sync_now(&handle).await;
    sync_now(&handle).await;

    // No events arrive for empty cycles.
    let waited =
        tokio::time::timeout(Duration::from_millis(500), handle.events.recv()).await;
    assert!(waited.is_err(), "empty cycles must not emit events");

    // The file was not rewritten.
    assert_eq!(std::fs::read(store.path()).unwrap(), bytes_before);

    handle.shutdown().await;
    cleanup(&store);
}

#[tokio::test]
async fn already_stored_messages_are_not_duplicated() {
    let server = StubServer::spawn().await.unwrap();
    server.inject("bob", "alice", "seen before", 7.0).await;

    // The profile already holds the same record (e.g. from an earlier
    // fetch), so the retrieval merges nothing.
    let store = seeded_store();
    let mut profile = store.load().unwrap();
    profile.add_message(DirectMessage::new(
        "seen before",
        Timestamp::from_secs(7.0),
        "bob",
        "alice",
    ));
    store.save(&profile).unwrap();
    let bytes_before = std::fs::read(store.path()).unwrap();

    let mut handle = spawn_sync(messenger_for(&server), store.clone(), &manual_sync_config())
        .unwrap();
    sync_now(&handle).await;

    let waited =
        tokio::time::timeout(Duration::from_millis(500), handle.events.recv()).await;
    assert!(waited.is_err(), "duplicate-only cycles must not emit events");
    assert_eq!(std::fs::read(store.path()).unwrap(), bytes_before);
    assert_eq!(store.load().unwrap().messages.len(), 1);

    handle.shutdown().await;
    cleanup(&store);
}

// ---------------------------------------------------------------------------
// Transcript updates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn active_contact_transcript_is_rebuilt_on_merge() {
    let server = StubServer::spawn().await.unwrap();
    let store = seeded_store();

    let mut handle = spawn_sync(messenger_for(&server), store.clone(), &manual_sync_config())
        .unwrap();
    handle
        .commands
        .send(SyncCommand::SetActiveContact(Some("bob".into())))
        .await
        .unwrap();

    // Selecting a conversation renders its (empty) transcript.
    match next_event(&mut handle).await {
        SyncEvent::TranscriptUpdated { contact, lines } => {
            assert_eq!(contact, "bob");
            assert!(lines.is_empty());
        }
        other => panic!("unexpected event {other:?}"),
    }

    server.inject("bob", "alice", "new line", 20.0).await;
    sync_now(&handle).await;

    let mut transcript_lines = None;
    for _ in 0..3 {
        match next_event(&mut handle).await {
            SyncEvent::TranscriptUpdated { contact, lines } => {
                assert_eq!(contact, "bob");
                transcript_lines = Some(lines);
                break;
            }
            SyncEvent::Merged { .. } | SyncEvent::ContactsChanged(_) => {}
            SyncEvent::Failed(reason) => panic!("sync failed: {reason}"),
        }
    }
    assert_eq!(transcript_lines.unwrap(), ["bob : new line"]);

    handle.shutdown().await;
    cleanup(&store);
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_cycles_are_reported_and_the_loop_keeps_running() {
    let server = StubServer::spawn().await.unwrap();
    // Wrong password on an existing account: every cycle hits an auth
    // rejection.
    server.register("alice", "other-password").await;
    let store = seeded_store();

    let mut handle = spawn_sync(messenger_for(&server), store.clone(), &manual_sync_config())
        .unwrap();

    sync_now(&handle).await;
    assert!(matches!(next_event(&mut handle).await, SyncEvent::Failed(_)));

    // Still alive: the next cycle reports again instead of the task dying.
    sync_now(&handle).await;
    assert!(matches!(next_event(&mut handle).await, SyncEvent::Failed(_)));

    handle.shutdown().await;
    cleanup(&store);
}
