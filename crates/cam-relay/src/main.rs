//! Cam-Relay entry point.
//!
//! Passively captures the chunked JPEG-over-UDP feed of a network camera and
//! re-serves the most recent complete frame to any number of TCP viewers as a
//! `multipart` JPEG stream, 25 times per second.  While the camera is silent a
//! placeholder image is served instead.
//!
//! # Usage
//!
//! ```text
//! cam-relay [OPTIONS]
//!
//! Options:
//!   --config <PATH>              TOML configuration file
//!   --interface <NAME>           Capture interface [default: eth0]
//!   --capture-port <PORT>        Camera UDP port [default: 2068]
//!   --listen-bind <IP>           Broadcast bind address [default: 0.0.0.0]
//!   --listen-port <PORT>         Broadcast TCP port [default: 3001]
//!   --backlog <N>                Listener backlog [default: 5]
//!   --fallback <PATH>            Placeholder JPEG [default: fallback.jpg]
//!   --fps <N>                    Frames per second [default: 25]
//!   --idle-threshold <TICKS>     Ticks before the placeholder [default: 50]
//!   --frame-capacity <BYTES>     Per-frame buffer size [default: 2097152]
//!   --client-queue <N>           Queued frames per viewer [default: 4]
//!   --stats-interval <SECS>      Statistics log period, 0 = off [default: 10]
//!   --log-level <FILTER>         Log filter when RUST_LOG is unset [default: info]
//! ```
//!
//! # Precedence
//!
//! Built-in defaults, then the `--config` file, then environment variables
//! and flags.  A flag beats its environment variable.
//!
//! | Variable               | Flag                 |
//! |------------------------|----------------------|
//! | `CAM_CONFIG`           | `--config`           |
//! | `CAM_INTERFACE`        | `--interface`        |
//! | `CAM_CAPTURE_PORT`     | `--capture-port`     |
//! | `CAM_LISTEN_BIND`      | `--listen-bind`      |
//! | `CAM_LISTEN_PORT`      | `--listen-port`      |
//! | `CAM_BACKLOG`          | `--backlog`          |
//! | `CAM_FALLBACK`         | `--fallback`         |
//! | `CAM_FPS`              | `--fps`              |
//! | `CAM_IDLE_THRESHOLD`   | `--idle-threshold`   |
//! | `CAM_FRAME_CAPACITY`   | `--frame-capacity`   |
//! | `CAM_CLIENT_QUEUE`     | `--client-queue`     |
//! | `CAM_STATS_INTERVAL`   | `--stats-interval`   |
//! | `CAM_LOG_LEVEL`        | `--log-level`        |
//!
//! Capturing requires `CAP_NET_RAW` (or root).

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cam_relay::domain::RelayConfig;
use cam_relay::infrastructure::{load_config, run_relay};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Relay a chunked UDP camera feed to TCP viewers as multipart JPEG.
///
/// Every option is optional; unset options keep the value from the
/// configuration file or the built-in default.
#[derive(Debug, Default, Parser)]
#[command(
    name = "cam-relay",
    about = "Capture a chunked UDP camera feed and re-serve it as multipart JPEG",
    version
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "CAM_CONFIG")]
    config: Option<PathBuf>,

    /// Network interface to capture on.
    #[arg(long, env = "CAM_INTERFACE")]
    interface: Option<String>,

    /// UDP port the camera sends from and to.
    #[arg(long, env = "CAM_CAPTURE_PORT")]
    capture_port: Option<u16>,

    /// IP address the broadcast listener binds to.
    #[arg(long, env = "CAM_LISTEN_BIND")]
    listen_bind: Option<IpAddr>,

    /// TCP port viewers connect to.
    #[arg(long, env = "CAM_LISTEN_PORT")]
    listen_port: Option<u16>,

    /// Pending-connection backlog of the listener.
    #[arg(long, env = "CAM_BACKLOG")]
    backlog: Option<u32>,

    /// JPEG served while no live frame is available.
    #[arg(long, env = "CAM_FALLBACK")]
    fallback: Option<PathBuf>,

    /// Distribution ticks per second.
    #[arg(long, env = "CAM_FPS")]
    fps: Option<u32>,

    /// Ticks without a new frame before the placeholder is served.
    #[arg(long, env = "CAM_IDLE_THRESHOLD")]
    idle_threshold: Option<u32>,

    /// Capacity of each frame buffer in bytes.
    #[arg(long, env = "CAM_FRAME_CAPACITY")]
    frame_capacity: Option<usize>,

    /// Frames a viewer may have queued before it is disconnected.
    #[arg(long, env = "CAM_CLIENT_QUEUE")]
    client_queue: Option<usize>,

    /// Seconds between statistics log lines; 0 disables them.
    #[arg(long, env = "CAM_STATS_INTERVAL")]
    stats_interval: Option<u64>,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, env = "CAM_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the configuration file (if any) and applies the flags on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be loaded or the
    /// merged configuration is invalid.
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let base = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => RelayConfig::default(),
        };
        let config = self.apply(base);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    /// Overlays every flag that was given onto `base`.
    fn apply(self, mut base: RelayConfig) -> RelayConfig {
        if let Some(interface) = self.interface {
            base.interface = interface;
        }
        if let Some(port) = self.capture_port {
            base.capture_port = port;
        }
        let ip = self.listen_bind.unwrap_or(base.listen_addr.ip());
        let port = self.listen_port.unwrap_or(base.listen_addr.port());
        base.listen_addr = SocketAddr::new(ip, port);
        if let Some(backlog) = self.backlog {
            base.listen_backlog = backlog;
        }
        if let Some(path) = self.fallback {
            base.fallback_path = path;
        }
        if let Some(fps) = self.fps {
            base.frames_per_second = fps;
        }
        if let Some(threshold) = self.idle_threshold {
            base.idle_threshold = threshold;
        }
        if let Some(capacity) = self.frame_capacity {
            base.frame_capacity = capacity;
        }
        if let Some(depth) = self.client_queue {
            base.client_queue_depth = depth;
        }
        if let Some(secs) = self.stats_interval {
            base.stats_interval = Duration::from_secs(secs);
        }
        if let Some(level) = self.log_level {
            base.log_level = level;
        }
        base
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// Runs on Tokio's single-threaded runtime: the relay is one event loop plus
/// one small writer task per viewer, all interleaved on the main thread.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and merged with the configuration file.
/// 2. `tracing_subscriber` is initialised; `RUST_LOG` overrides the configured
///    log level.
/// 3. A Ctrl+C handler is spawned that clears the shared `running` flag.
/// 4. [`run_relay`] opens the capture socket and listener and runs until the
///    flag is cleared or capture fails.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_relay_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.log_level))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        "cam-relay starting: interface={}, capture port={}, listen={}",
        config.interface, config.capture_port, config.listen_addr
    );

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    if let Err(e) = run_relay(config, running).await {
        error!("cam-relay stopped: {e:#}");
        return Err(e);
    }

    info!("cam-relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
