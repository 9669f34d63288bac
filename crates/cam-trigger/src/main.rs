//! Cam-Trigger: keeps the camera streaming.
//!
//! The camera only sends its chunked JPEG feed while it keeps receiving a
//! vendor "trigger" datagram.  This tool loads that message from a file and
//! resends it on a fixed interval from a fixed source address, so that
//! `cam-relay` (which only listens passively) has something to capture.
//!
//! # Usage
//!
//! ```text
//! cam-trigger [OPTIONS]
//!
//! Options:
//!   --message <PATH>     Trigger message file [default: trigger_msg.bin]
//!   --bind <ADDR>        Local source address [default: 192.168.168.56:48689]
//!   --target <ADDR>      Camera address [default: 192.168.168.55:48689]
//!   --interval <SECS>    Seconds between sends [default: 3]
//! ```
//!
//! | Variable              | Flag          |
//! |-----------------------|---------------|
//! | `CAM_TRIGGER_MESSAGE` | `--message`   |
//! | `CAM_TRIGGER_BIND`    | `--bind`      |
//! | `CAM_TRIGGER_TARGET`  | `--target`    |
//! | `CAM_TRIGGER_INTERVAL`| `--interval`  |
//!
//! The tool exits with status 0 on Ctrl+C and non-zero when the message
//! cannot be loaded, the socket cannot be bound, or a send fails.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Largest trigger message accepted.
const MAX_MESSAGE_LEN: usize = 4096;

/// Error type for loading the trigger message.
#[derive(Debug, Error)]
enum TriggerError {
    #[error("cannot read trigger message {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("trigger message {path} is empty")]
    Empty { path: PathBuf },

    #[error("trigger message {path} is {size} bytes; the limit is 4096")]
    TooLarge { path: PathBuf, size: usize },
}

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Periodically send the camera's trigger datagram.
#[derive(Debug, Parser)]
#[command(
    name = "cam-trigger",
    about = "Periodically send the trigger datagram that keeps the camera streaming",
    version
)]
struct Cli {
    /// File holding the raw trigger message.
    #[arg(long, default_value = "trigger_msg.bin", env = "CAM_TRIGGER_MESSAGE")]
    message: PathBuf,

    /// Local address the datagrams are sent from.
    #[arg(long, default_value = "192.168.168.56:48689", env = "CAM_TRIGGER_BIND")]
    bind: SocketAddr,

    /// Camera address the datagrams are sent to.
    #[arg(long, default_value = "192.168.168.55:48689", env = "CAM_TRIGGER_TARGET")]
    target: SocketAddr,

    /// Seconds between two sends.
    #[arg(long, default_value_t = 3, env = "CAM_TRIGGER_INTERVAL")]
    interval: u64,
}

// ── Trigger logic ─────────────────────────────────────────────────────────────

/// Reads the trigger message, rejecting empty and oversized files.
fn load_message(path: &Path) -> Result<Vec<u8>, TriggerError> {
    let message = std::fs::read(path).map_err(|source| TriggerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if message.is_empty() {
        return Err(TriggerError::Empty {
            path: path.to_path_buf(),
        });
    }
    if message.len() > MAX_MESSAGE_LEN {
        return Err(TriggerError::TooLarge {
            path: path.to_path_buf(),
            size: message.len(),
        });
    }
    Ok(message)
}

/// Sends `message` to `target` immediately and then once per `period`, until
/// `shutdown` completes.
///
/// Returns the number of datagrams sent.
///
/// # Errors
///
/// Returns the first send failure; the loop does not retry.
async fn run_pinger<F>(
    socket: &UdpSocket,
    target: SocketAddr,
    message: &[u8],
    period: Duration,
    shutdown: F,
) -> anyhow::Result<u64>
where
    F: Future<Output = ()>,
{
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut sent = 0u64;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                socket
                    .send_to(message, target)
                    .await
                    .with_context(|| format!("failed to send trigger to {target}"))?;
                sent += 1;
                debug!("trigger #{sent} sent to {target}");
            }
        }
    }
    Ok(sent)
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let message = load_message(&cli.message)?;
    info!(
        "loaded trigger message {} ({} bytes)",
        cli.message.display(),
        message.len()
    );

    let socket = UdpSocket::bind(cli.bind)
        .await
        .with_context(|| format!("could not bind to source address {}", cli.bind))?;
    info!(
        "sending trigger from {} to {} every {}s",
        cli.bind, cli.target, cli.interval
    );

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C; stopping"),
            Err(e) => {
                error!("failed to listen for Ctrl+C signal: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    match run_pinger(
        &socket,
        cli.target,
        &message,
        Duration::from_secs(cli.interval),
        shutdown,
    )
    .await
    {
        Ok(sent) => {
            info!("cam-trigger stopped after {sent} sends");
            Ok(())
        }
        Err(e) => {
            error!("{e:#}");
            Err(e)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
