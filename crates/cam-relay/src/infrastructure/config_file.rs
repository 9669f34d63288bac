//! TOML configuration file for the relay.
//!
//! Every key is optional; a missing key keeps the built-in default from
//! [`RelayConfig::default`].  Example:
//!
//! ```toml
//! [capture]
//! interface = "eth1"
//! port = 2068
//!
//! [broadcast]
//! listen_addr = "0.0.0.0:3001"
//! backlog = 5
//! client_queue_depth = 4
//!
//! [frames]
//! fallback_path = "/usr/share/cam-relay/fallback.jpg"
//! frames_per_second = 25
//! idle_threshold = 50
//! frame_capacity = 2097152
//!
//! [logging]
//! level = "info"
//! stats_interval_secs = 10
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` take the value of
//! `some_fn()` when absent, and whole sections default the same way, so an
//! empty file is a valid configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::RelayConfig;

/// Error type for configuration file loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level file layout.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub capture: CaptureSection,
    #[serde(default)]
    pub broadcast: BroadcastSection,
    #[serde(default)]
    pub frames: FramesSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Raw capture settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CaptureSection {
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default = "default_capture_port")]
    pub port: u16,
}

/// Viewer-facing listener settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BroadcastSection {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    #[serde(default = "default_client_queue_depth")]
    pub client_queue_depth: usize,
}

/// Frame buffer and tick settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FramesSection {
    #[serde(default = "default_fallback_path")]
    pub fallback_path: PathBuf,
    #[serde(default = "default_frames_per_second")]
    pub frames_per_second: u32,
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold: u32,
    #[serde(default = "default_frame_capacity")]
    pub frame_capacity: usize,
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Seconds between statistics lines; `0` disables them.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

// ── Default value functions (used by serde) ───────────────────────────────────

fn default_interface() -> String {
    RelayConfig::default().interface
}
fn default_capture_port() -> u16 {
    RelayConfig::default().capture_port
}
fn default_listen_addr() -> SocketAddr {
    RelayConfig::default().listen_addr
}
fn default_backlog() -> u32 {
    RelayConfig::default().listen_backlog
}
fn default_client_queue_depth() -> usize {
    RelayConfig::default().client_queue_depth
}
fn default_fallback_path() -> PathBuf {
    RelayConfig::default().fallback_path
}
fn default_frames_per_second() -> u32 {
    RelayConfig::default().frames_per_second
}
fn default_idle_threshold() -> u32 {
    RelayConfig::default().idle_threshold
}
fn default_frame_capacity() -> usize {
    RelayConfig::default().frame_capacity
}
fn default_log_level() -> String {
    RelayConfig::default().log_level
}
fn default_stats_interval_secs() -> u64 {
    RelayConfig::default().stats_interval.as_secs()
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            port: default_capture_port(),
        }
    }
}

impl Default for BroadcastSection {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            backlog: default_backlog(),
            client_queue_depth: default_client_queue_depth(),
        }
    }
}

impl Default for FramesSection {
    fn default() -> Self {
        Self {
            fallback_path: default_fallback_path(),
            frames_per_second: default_frames_per_second(),
            idle_threshold: default_idle_threshold(),
            frame_capacity: default_frame_capacity(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl From<ConfigFile> for RelayConfig {
    fn from(file: ConfigFile) -> Self {
        Self {
            interface: file.capture.interface,
            capture_port: file.capture.port,
            listen_addr: file.broadcast.listen_addr,
            listen_backlog: file.broadcast.backlog,
            fallback_path: file.frames.fallback_path,
            frames_per_second: file.frames.frames_per_second,
            idle_threshold: file.frames.idle_threshold,
            frame_capacity: file.frames.frame_capacity,
            client_queue_depth: file.broadcast.client_queue_depth,
            stats_interval: Duration::from_secs(file.logging.stats_interval_secs),
            log_level: file.logging.level,
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Parses TOML text into a [`RelayConfig`].
///
/// Values are not validated here: command-line overrides still apply on top,
/// and only the merged result goes through [`RelayConfig::validate`].
///
/// # Errors
///
/// [`ConfigError::Parse`] for malformed TOML or unknown keys.
pub fn parse_config(text: &str) -> Result<RelayConfig, ConfigError> {
    let file: ConfigFile = toml::from_str(text)?;
    Ok(RelayConfig::from(file))
}

/// Reads and parses the configuration file at `path`.
///
/// # Errors
///
/// [`ConfigError::Io`] if the file cannot be read, otherwise as
/// [`parse_config`].
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
