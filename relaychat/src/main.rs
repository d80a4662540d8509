//! `RelayChat` — direct-message client for line-delimited relay servers.
//!
//! Stands in for a full presentation layer: each subcommand exercises one
//! of the client operations against the configured relay server and the
//! local profile file. Configuration via CLI flags, environment variables,
//! or config file (`~/.config/relaychat/config.toml`).
//!
//! ```bash
//! # Create a local profile
//! cargo run --bin relaychat -- init alice --password hunter2
//!
//! # Send a message and poll for replies
//! cargo run --bin relaychat -- send bob "hello there"
//! cargo run --bin relaychat -- watch --contact bob
//! ```

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use relaychat::config::{CliArgs, ClientConfig};
use relaychat::messenger::{DirectMessenger, SendError};
use relaychat::profile::{Profile, ProfileError, ProfileStore};
use relaychat::session::Credentials;
use relaychat::sync::{SyncCommand, SyncEvent, spawn_sync};
use relaychat::transcript::Transcript;
use relaychat_proto::message::Timestamp;

#[derive(Parser, Debug)]
#[command(version, about = "Direct-message client for line-delimited relay servers")]
struct Cli {
    #[command(flatten)]
    args: CliArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Create a new local profile.
    Init {
        /// Account username.
        username: String,
        /// Account password.
        #[arg(long)]
        password: String,
    },
    /// Send one direct message.
    Send {
        /// Recipient username.
        recipient: String,
        /// Message text.
        text: String,
    },
    /// Retrieve messages from the server and merge them into the profile.
    Fetch {
        /// Retrieve every stored message instead of only new ones.
        #[arg(long)]
        all: bool,
    },
    /// Print the transcript of one conversation.
    History {
        /// The conversation counterpart.
        contact: String,
    },
    /// List contacts, or add one explicitly.
    Contacts {
        /// Add this username to the contact list.
        #[arg(long)]
        add: Option<String>,
    },
    /// Poll for new messages until interrupted.
    Watch {
        /// Keep this conversation's transcript rendered.
        #[arg(long)]
        contact: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ClientConfig::load(&cli.args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_logging(&cli.args.log_level, cli.args.log_file.as_deref());
    tracing::info!("relaychat starting");

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging: env-filtered, to stderr or a non-blocking file
/// writer. The returned guard must be held until shutdown so buffered
/// entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    if let Some(log_path) = file_path {
        let log_dir = log_path.parent()?;
        let file_name = log_path.file_name()?.to_str()?;
        let file_appender = tracing_appender::rolling::never(log_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::fmt()
            .with_writer(non_blocking)
            .with_env_filter(env_filter)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .init();
        None
    }
}

async fn run(command: Command, config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = ProfileStore::new(config.profile_path()?);

    match command {
        Command::Init { username, password } => init_profile(&store, &username, &password),
        Command::Send { recipient, text } => send(&store, config, &recipient, &text).await,
        Command::Fetch { all } => fetch(&store, config, all).await,
        Command::History { contact } => history(&store, &contact),
        Command::Contacts { add } => contacts(&store, add),
        Command::Watch { contact } => watch(&store, config, contact).await,
    }
}

/// Load the profile, turning `NotFound` into a hint to run `init`.
fn open_profile(store: &ProfileStore) -> Result<Profile, Box<dyn std::error::Error>> {
    match store.load() {
        Ok(profile) => Ok(profile),
        Err(ProfileError::NotFound { path }) => Err(format!(
            "no profile at {} — create one with `relaychat init <username> --password <password>`",
            path.display()
        )
        .into()),
        Err(e) => Err(e.into()),
    }
}

fn messenger_for(profile: &Profile, config: &ClientConfig) -> DirectMessenger {
    DirectMessenger::new(
        config.session_config(),
        Credentials::new(profile.username.clone(), profile.password.clone()),
    )
}

fn init_profile(
    store: &ProfileStore,
    username: &str,
    password: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if store.exists() {
        return Err(format!("profile already exists at {}", store.path().display()).into());
    }
    store.save(&Profile::new(username, password))?;
    println!("profile for {username} created at {}", store.path().display());
    Ok(())
}

async fn send(
    store: &ProfileStore,
    config: &ClientConfig,
    recipient: &str,
    text: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut profile = open_profile(store)?;
    let mut messenger = messenger_for(&profile, config);

    match messenger.send(text, recipient).await {
        Ok(message) => {
            profile.add_message(message);
            profile.add_contact(recipient);
            store.save(&profile)?;
            println!("message sent to {recipient}");
            Ok(())
        }
        Err(SendError::Rejected { reply }) => Err(format!(
            "server refused the message: {}",
            reply.as_deref().unwrap_or("no acknowledgement")
        )
        .into()),
        Err(e) => Err(e.into()),
    }
}

async fn fetch(
    store: &ProfileStore,
    config: &ClientConfig,
    all: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut profile = open_profile(store)?;
    let messenger = messenger_for(&profile, config);

    let retrieved = if all {
        messenger.retrieve_all().await?
    } else {
        messenger.retrieve_new().await?
    };

    let mut inserted = 0;
    for message in retrieved {
        if profile.add_message(message.clone()) {
            println!(
                "[{}] {} : {}",
                format_time(message.timestamp),
                message.from,
                message.text
            );
            inserted += 1;
        }
    }

    if inserted > 0 {
        store.save(&profile)?;
    }
    println!("{inserted} new message(s)");
    Ok(())
}

fn history(store: &ProfileStore, contact: &str) -> Result<(), Box<dyn std::error::Error>> {
    let profile = open_profile(store)?;
    let messages: Vec<_> = profile
        .chat_messages(contact)
        .into_iter()
        .cloned()
        .collect();

    let transcript = Transcript::build(&messages);
    if transcript.is_empty() {
        println!("no messages with {contact}");
    }
    for line in transcript.lines() {
        println!("{line}");
    }
    Ok(())
}

fn contacts(store: &ProfileStore, add: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut profile = open_profile(store)?;

    if let Some(username) = add {
        if profile.add_contact(username.clone()) {
            store.save(&profile)?;
            println!("added {username}");
        } else {
            println!("{username} is already a contact");
        }
        return Ok(());
    }

    for contact in profile.contacts() {
        println!("{contact}");
    }
    Ok(())
}

async fn watch(
    store: &ProfileStore,
    config: &ClientConfig,
    contact: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let profile = open_profile(store)?;
    let messenger = messenger_for(&profile, config);

    let mut handle = spawn_sync(messenger, store.clone(), &config.sync_config())?;
    if contact.is_some() {
        handle
            .commands
            .send(SyncCommand::SetActiveContact(contact))
            .await?;
    }

    println!("watching for new messages (ctrl-c to stop)");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = handle.events.recv() => match event {
                Some(SyncEvent::Merged { new_messages }) => {
                    println!("{new_messages} new message(s)");
                }
                Some(SyncEvent::TranscriptUpdated { contact, lines }) => {
                    println!("--- {contact} ---");
                    for line in lines {
                        println!("{line}");
                    }
                }
                Some(SyncEvent::ContactsChanged(contacts)) => {
                    let list: Vec<String> = contacts.into_iter().collect();
                    println!("contacts: {}", list.join(", "));
                }
                Some(SyncEvent::Failed(reason)) => {
                    eprintln!("sync failed: {reason}");
                }
                None => break,
            },
        }
    }

    handle.shutdown().await;
    Ok(())
}

/// Formats a message timestamp as local wall-clock time.
fn format_time(timestamp: Timestamp) -> String {
    #[allow(clippy::cast_possible_truncation)]
    let millis = (timestamp.as_secs() * 1000.0) as i64;
    chrono::DateTime::from_timestamp_millis(millis).map_or_else(
        || timestamp.to_string(),
        |utc| {
            utc.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        },
    )
}
