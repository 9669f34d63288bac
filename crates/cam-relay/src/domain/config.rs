//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! It starts from [`Default`], is optionally overlaid with a TOML file (see
//! `infrastructure::config_file`), and finally with CLI flags in `main.rs`.
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! reads in here) makes every component easy to construct in tests.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use cam_core::domain::distribution::{DEFAULT_FRAMES_PER_SECOND, DEFAULT_IDLE_THRESHOLD};
use cam_core::protocol::datagram::CAPTURE_PORT;
use cam_core::Distributor;
use thiserror::Error;

/// Default capacity of each frame buffer (2 MiB).
pub const DEFAULT_FRAME_CAPACITY: usize = 2 * 1024 * 1024;

/// Default number of encoded parts a client may have queued.
pub const DEFAULT_CLIENT_QUEUE_DEPTH: usize = 4;

/// A configuration value that cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidConfig {
    #[error("interface name must not be empty")]
    EmptyInterface,
    #[error("frames_per_second must be greater than zero")]
    ZeroFrameRate,
    #[error("idle_threshold must be greater than zero")]
    ZeroIdleThreshold,
    #[error("frame_capacity must be greater than zero")]
    ZeroFrameCapacity,
    #[error("client_queue_depth must be greater than zero")]
    ZeroQueueDepth,
}

/// All runtime configuration for the relay.
///
/// # Example
///
/// ```rust
/// use cam_relay::domain::RelayConfig;
///
/// let cfg = RelayConfig::default();
/// assert_eq!(cfg.listen_addr.port(), 3001);
/// assert_eq!(cfg.capture_port, 2068);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Network interface the capture socket is bound to.
    pub interface: String,
    /// UDP port the camera uses as both source and destination.
    pub capture_port: u16,
    /// Address the viewer-facing TCP listener binds to.
    pub listen_addr: SocketAddr,
    /// Pending-connection backlog of the listener.
    pub listen_backlog: u32,
    /// JPEG served while no live frame is available.
    pub fallback_path: PathBuf,
    /// Distribution ticks per second.
    pub frames_per_second: u32,
    /// Ticks without a new frame before the fallback is served.
    pub idle_threshold: u32,
    /// Capacity of each of the three frame buffers, in bytes.
    pub frame_capacity: usize,
    /// Encoded parts a client may have queued before it is disconnected.
    pub client_queue_depth: usize,
    /// Period of the statistics log line; zero disables it.
    pub stats_interval: Duration,
    /// Default log filter when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for RelayConfig {
    /// | Field              | Default        |
    /// |--------------------|----------------|
    /// | interface          | `eth0`         |
    /// | capture_port       | `2068`         |
    /// | listen_addr        | `0.0.0.0:3001` |
    /// | listen_backlog     | `5`            |
    /// | fallback_path      | `fallback.jpg` |
    /// | frames_per_second  | `25`           |
    /// | idle_threshold     | `50`           |
    /// | frame_capacity     | 2 MiB          |
    /// | client_queue_depth | `4`            |
    /// | stats_interval     | 10 seconds     |
    /// | log_level          | `info`         |
    fn default() -> Self {
        Self {
            interface: "eth0".to_string(),
            capture_port: CAPTURE_PORT,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            listen_backlog: 5,
            fallback_path: PathBuf::from("fallback.jpg"),
            frames_per_second: DEFAULT_FRAMES_PER_SECOND,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            frame_capacity: DEFAULT_FRAME_CAPACITY,
            client_queue_depth: DEFAULT_CLIENT_QUEUE_DEPTH,
            stats_interval: Duration::from_secs(10),
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Checks the values that would make the relay misbehave.
    ///
    /// # Errors
    ///
    /// Returns the first [`InvalidConfig`] found.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.interface.trim().is_empty() {
            return Err(InvalidConfig::EmptyInterface);
        }
        if self.frames_per_second == 0 {
            return Err(InvalidConfig::ZeroFrameRate);
        }
        if self.idle_threshold == 0 {
            return Err(InvalidConfig::ZeroIdleThreshold);
        }
        if self.frame_capacity == 0 {
            return Err(InvalidConfig::ZeroFrameCapacity);
        }
        if self.client_queue_depth == 0 {
            return Err(InvalidConfig::ZeroQueueDepth);
        }
        Ok(())
    }

    /// Builds the tick policy described by this configuration.
    pub fn distributor(&self) -> Distributor {
        Distributor::new(self.frames_per_second, self.idle_threshold)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
