//! Background synchronization between the relay server and the profile.
//!
//! The presentation layer must never block on network I/O, so polling runs
//! on a dedicated tokio task and talks to the interactive context through
//! [`SyncCommand`] / [`SyncEvent`] channels:
//!
//! ```text
//! UI / caller  ←── SyncEvent ───  sync task
//!               ─── SyncCommand →
//! ```
//!
//! All profile mutation happens inside the task (single owner); readers get
//! the last-persisted state through a shared snapshot behind an `RwLock`.
//! Each cycle reloads the persisted profile, retrieves new messages, merges
//! them, and persists — a cycle that retrieves nothing is a true no-op:
//! no save, no snapshot change, no events.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::messenger::DirectMessenger;
use crate::profile::{Profile, ProfileError, ProfileStore};
use crate::session::SessionError;
use crate::transcript::Transcript;

/// Configuration for the sync task.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How often to poll for new messages.
    pub interval: Duration,
    /// Capacity of the command and event channels.
    pub event_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            event_buffer: 64,
        }
    }
}

/// Commands sent from the interactive context to the sync task.
#[derive(Debug)]
pub enum SyncCommand {
    /// Select which conversation's transcript to keep rendered, if any.
    SetActiveContact(Option<String>),
    /// Run a sync cycle now instead of waiting for the next tick.
    SyncNow,
    /// Stop the sync task.
    Shutdown,
}

/// Events emitted by the sync task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// New messages were merged and persisted.
    Merged {
        /// How many messages were actually inserted (duplicates excluded).
        new_messages: usize,
    },
    /// The active conversation's transcript gained lines.
    TranscriptUpdated {
        /// The contact whose conversation changed.
        contact: String,
        /// The full transcript, oldest line first.
        lines: Vec<String>,
    },
    /// The contact set changed as a result of a merge.
    ContactsChanged(BTreeSet<String>),
    /// A sync cycle failed; the task keeps running.
    Failed(String),
}

/// Handle to a running sync task.
pub struct SyncHandle {
    /// Command channel into the task.
    pub commands: mpsc::Sender<SyncCommand>,
    /// Event channel out of the task.
    pub events: mpsc::Receiver<SyncEvent>,
    snapshot: Arc<RwLock<Profile>>,
    task: tokio::task::JoinHandle<()>,
}

impl SyncHandle {
    /// A clone of the last-persisted profile. Safe to call concurrently
    /// with a running sync cycle; never blocks on the network.
    #[must_use]
    pub fn snapshot(&self) -> Profile {
        self.snapshot.read().clone()
    }

    /// Stops the sync task and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(SyncCommand::Shutdown).await;
        let _ = self.task.await;
    }
}

/// Spawns the sync task for a messenger/store pair.
///
/// The profile must already exist on disk; it seeds the shared snapshot.
/// An initial cycle runs immediately, then one per configured interval.
///
/// # Errors
///
/// Returns [`ProfileError`] if the initial profile load fails.
pub fn spawn_sync(
    messenger: DirectMessenger,
    store: ProfileStore,
    config: &SyncConfig,
) -> Result<SyncHandle, ProfileError> {
    let initial = store.load()?;
    let snapshot = Arc::new(RwLock::new(initial));

    let (cmd_tx, cmd_rx) = mpsc::channel(config.event_buffer);
    let (evt_tx, evt_rx) = mpsc::channel(config.event_buffer);

    let worker = SyncWorker {
        messenger,
        store,
        snapshot: Arc::clone(&snapshot),
        events: evt_tx,
        active: None,
        transcript: Transcript::new(),
    };
    let task = tokio::spawn(worker.run(cmd_rx, config.interval));

    Ok(SyncHandle {
        commands: cmd_tx,
        events: evt_rx,
        snapshot,
        task,
    })
}

/// State owned by the sync task.
struct SyncWorker {
    messenger: DirectMessenger,
    store: ProfileStore,
    snapshot: Arc<RwLock<Profile>>,
    events: mpsc::Sender<SyncEvent>,
    active: Option<String>,
    transcript: Transcript,
}

impl SyncWorker {
    async fn run(mut self, mut commands: mpsc::Receiver<SyncCommand>, interval: Duration) {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => self.sync_once().await,
                cmd = commands.recv() => match cmd {
                    Some(SyncCommand::SyncNow) => self.sync_once().await,
                    Some(SyncCommand::SetActiveContact(contact)) => {
                        self.set_active_contact(contact);
                    }
                    Some(SyncCommand::Shutdown) | None => break,
                },
            }
        }

        tracing::debug!("sync task stopped");
    }

    /// Switches the rendered conversation and rebuilds its transcript from
    /// the current snapshot.
    fn set_active_contact(&mut self, contact: Option<String>) {
        self.active = contact;
        self.transcript = Transcript::new();

        if let Some(contact) = self.active.clone() {
            let profile = self.snapshot.read();
            let messages: Vec<_> = profile
                .chat_messages(&contact)
                .into_iter()
                .cloned()
                .collect();
            drop(profile);

            self.transcript.extend(&messages);
            self.emit(SyncEvent::TranscriptUpdated {
                contact,
                lines: self.transcript.lines().to_vec(),
            });
        }
    }

    /// One cycle: reload, retrieve new, merge, persist, re-render.
    async fn sync_once(&mut self) {
        let retrieved = match self.messenger.retrieve_new().await {
            Ok(messages) => messages,
            Err(err) => {
                self.report_session_error(&err);
                return;
            }
        };

        if retrieved.is_empty() {
            tracing::trace!("sync cycle retrieved nothing");
            return;
        }

        // Reload rather than trusting the snapshot: another process (or a
        // CLI invocation) may have written the profile since last cycle.
        let mut profile = match self.store.load() {
            Ok(profile) => profile,
            Err(err) => {
                tracing::error!(error = %err, "sync cannot load profile");
                self.emit(SyncEvent::Failed(err.to_string()));
                return;
            }
        };

        let contacts_before = profile.contacts();
        let inserted = retrieved
            .into_iter()
            .filter(|m| profile.add_message(m.clone()))
            .count();
        if inserted == 0 {
            tracing::trace!("sync cycle found only duplicates");
            return;
        }

        if let Err(err) = self.store.save(&profile) {
            tracing::error!(error = %err, "sync cannot persist profile");
            self.emit(SyncEvent::Failed(err.to_string()));
            return;
        }

        let contacts = profile.contacts();
        *self.snapshot.write() = profile.clone();

        tracing::info!(new_messages = inserted, "sync cycle merged messages");
        self.emit(SyncEvent::Merged {
            new_messages: inserted,
        });

        if contacts != contacts_before {
            self.emit(SyncEvent::ContactsChanged(contacts));
        }

        if let Some(contact) = self.active.clone() {
            let messages: Vec<_> = profile
                .chat_messages(&contact)
                .into_iter()
                .cloned()
                .collect();
            let appended = self.transcript.extend(&messages);
            if appended > 0 {
                self.emit(SyncEvent::TranscriptUpdated {
                    contact,
                    lines: self.transcript.lines().to_vec(),
                });
            }
        }
    }

    /// Connect and auth failures are expected, recoverable conditions;
    /// protocol failures are not. Both reach the caller as a `Failed`
    /// event, at different log severities.
    fn report_session_error(&self, err: &SessionError) {
        match err {
            SessionError::Connect { .. } | SessionError::Timeout(_) | SessionError::Auth(_) => {
                tracing::warn!(error = %err, "sync cycle failed");
            }
            SessionError::Io { .. } | SessionError::Protocol(_) => {
                tracing::error!(error = %err, "sync cycle failed");
            }
        }
        self.emit(SyncEvent::Failed(err.to_string()));
    }

    /// Best-effort event emission; a stalled or absent consumer never
    /// blocks the sync task.
    fn emit(&self, event: SyncEvent) {
        let _ = self.events.try_send(event);
    }
}
