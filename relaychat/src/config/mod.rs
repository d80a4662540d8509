//! Configuration system for the `RelayChat` client.
//!
//! Supports layered configuration with the following priority (highest
//! first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/relaychat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::session::{DEFAULT_HOST, DEFAULT_PORT, SessionConfig};
use crate::sync::SyncConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// Could not determine a data directory for the default profile path.
    #[error("could not determine data directory (no HOME or XDG_DATA_HOME)")]
    NoDataDir,
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    sync: SyncFileConfig,
    profile: ProfileFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    host: Option<String>,
    port: Option<u16>,
    connect_timeout_secs: Option<u64>,
    io_timeout_secs: Option<u64>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    interval_secs: Option<u64>,
    event_buffer: Option<usize>,
}

/// `[profile]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ProfileFileConfig {
    path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay server hostname or IP address.
    pub host: String,
    /// Relay server TCP port.
    pub port: u16,
    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Timeout for each request/reply exchange.
    pub io_timeout: Duration,
    /// Poll interval of the sync loop.
    pub sync_interval: Duration,
    /// Channel capacity for sync commands and events.
    pub sync_event_buffer: usize,
    /// Profile file path, if set via CLI or config file.
    pub profile_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(10),
            sync_interval: Duration::from_secs(5),
            sync_event_buffer: 64,
            profile_path: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. If no `--config` is given, the default path
    /// (`~/.config/relaychat/config.toml`) is tried and silently ignored
    /// if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. Separated from `load()` to enable
    /// unit testing without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            host: cli
                .server_host
                .clone()
                .or_else(|| file.server.host.clone())
                .unwrap_or(defaults.host),
            port: cli.server_port.or(file.server.port).unwrap_or(defaults.port),
            connect_timeout: file
                .server
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            io_timeout: file
                .server
                .io_timeout_secs
                .map_or(defaults.io_timeout, Duration::from_secs),
            sync_interval: file
                .sync
                .interval_secs
                .map_or(defaults.sync_interval, Duration::from_secs),
            sync_event_buffer: file
                .sync
                .event_buffer
                .unwrap_or(defaults.sync_event_buffer),
            profile_path: cli.profile.clone().or_else(|| file.profile.path.clone()),
        }
    }

    /// The session endpoint/timeout configuration.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            host: self.host.clone(),
            port: self.port,
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
        }
    }

    /// The sync loop configuration.
    #[must_use]
    pub const fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            interval: self.sync_interval,
            event_buffer: self.sync_event_buffer,
        }
    }

    /// The profile file path, falling back to
    /// `<data_dir>/relaychat/profile.dsu` when none was configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoDataDir`] if no path was configured and
    /// the platform data directory cannot be determined.
    pub fn profile_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.profile_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir().ok_or(ConfigError::NoDataDir)?;
        Ok(data_dir.join("relaychat").join("profile.dsu"))
    }
}

/// Shared CLI arguments parsed by clap, flattened into the binary's
/// command definition.
#[derive(clap::Args, Debug, Default)]
pub struct CliArgs {
    /// Relay server hostname or IP address.
    #[arg(long, env = "RELAYCHAT_HOST")]
    pub server_host: Option<String>,

    /// Relay server TCP port.
    #[arg(long, env = "RELAYCHAT_PORT")]
    pub server_port: Option<u16>,

    /// Path to the profile file (default: `<data_dir>/relaychat/profile.dsu`).
    #[arg(long, env = "RELAYCHAT_PROFILE")]
    pub profile: Option<PathBuf>,

    /// Path to config file (default: `~/.config/relaychat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "RELAYCHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: stderr).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and a missing
/// file is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available — use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("relaychat").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
