//! The relay's single event loop.
//!
//! One task multiplexes four event sources with `tokio::select!`:
//!
//! | Event                    | Action                                        |
//! |--------------------------|-----------------------------------------------|
//! | capture socket readable  | [`RelayService::on_datagram`]                 |
//! | tick interval elapsed    | shutdown check, [`RelayService::on_tick`]     |
//! | listener accepted        | [`ClientRegistry::register`]                  |
//! | writer task finished     | [`ClientRegistry::remove`]                    |
//!
//! Each handler runs to completion before the next event is looked at, so the
//! reassembler and the distribution tick never interleave.
//!
//! The interval uses [`MissedTickBehavior::Skip`]: if the loop is held up,
//! missed ticks are dropped instead of being fired back to back.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cam_core::protocol::datagram::CAPTURE_BUFFER_LEN;
use tokio::net::TcpListener;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::application::{RelayService, RelayStats};
use crate::domain::RelayConfig;
use crate::infrastructure::broadcast::{bind_listener, ClientRegistry};
use crate::infrastructure::capture::{CaptureError, CaptureSocket};
use crate::infrastructure::fallback::load_fallback;

/// Where captured packets come from.
///
/// Implemented by [`CaptureSocket`]; tests substitute an in-memory source.
pub trait PacketSource {
    /// Waits for the next packet and copies it into `buf`, returning its
    /// length.  An error ends the relay.
    fn recv(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize, CaptureError>>;
}

impl PacketSource for CaptureSocket {
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError> {
        CaptureSocket::recv(self, buf).await
    }
}

/// Loop timing and per-client limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub tick_interval: Duration,
    pub client_queue_depth: usize,
    /// Zero disables the statistics line.
    pub stats_interval: Duration,
}

impl LoopSettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            tick_interval: config.distributor().interval(),
            client_queue_depth: config.client_queue_depth,
            stats_interval: config.stats_interval,
        }
    }
}

/// Sets up every resource described by `config` and runs the relay until
/// `running` is cleared.
///
/// # Errors
///
/// Fails if the configuration is invalid, the fallback image cannot be
/// loaded, the capture socket or listener cannot be opened, or capture fails
/// while running.  All of these are fatal.
pub async fn run_relay(config: RelayConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;

    let fallback = load_fallback(&config.fallback_path, config.frame_capacity)
        .context("failed to load fallback image")?;

    let capture = CaptureSocket::open(&config.interface)
        .with_context(|| format!("failed to open capture on {}", config.interface))?;

    let listener = bind_listener(config.listen_addr, config.listen_backlog)
        .context("failed to start broadcast listener")?;
    info!(
        "broadcast server listening on {}",
        listener.local_addr().context("listener has no local address")?
    );

    let service = RelayService::new(&config, fallback);
    let stats = run_loop(
        service,
        capture,
        listener,
        LoopSettings::from_config(&config),
        running,
    )
    .await?;

    log_stats(&stats, 0);
    Ok(())
}

/// Runs the event loop over already-opened resources.
///
/// Returns the final counters when `running` is cleared.  The flag is checked
/// on every tick.
///
/// # Errors
///
/// Returns the capture error that ended the loop.
pub async fn run_loop<S: PacketSource>(
    mut service: RelayService,
    mut source: S,
    listener: TcpListener,
    settings: LoopSettings,
    running: Arc<AtomicBool>,
) -> anyhow::Result<RelayStats> {
    let (mut registry, mut closed_rx) = ClientRegistry::new(settings.client_queue_depth);

    let mut ticker = interval(settings.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut packet = vec![0u8; CAPTURE_BUFFER_LEN];
    let mut last_stats = Instant::now();

    info!(
        "relay running: one frame every {:?}, up to {} queued frames per client",
        settings.tick_interval, settings.client_queue_depth
    );

    loop {
        tokio::select! {
            received = source.recv(&mut packet) => {
                let len = match received {
                    Ok(len) => len,
                    Err(e) => {
                        error!("capture failed: {e}");
                        return Err(e).context("packet capture failed");
                    }
                };
                service.on_datagram(&packet[..len]);
            }

            _ = ticker.tick() => {
                if !running.load(Ordering::Relaxed) {
                    info!("shutdown flag set; stopping relay");
                    break;
                }
                service.on_tick(&mut registry);

                if !settings.stats_interval.is_zero()
                    && last_stats.elapsed() >= settings.stats_interval
                {
                    log_stats(&service.stats(), registry.len());
                    last_stats = Instant::now();
                }
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    registry.register(stream, peer);
                }
                Err(e) => warn!("accept error: {e}"),
            },

            Some(id) = closed_rx.recv() => {
                registry.remove(id);
            }
        }
    }

    Ok(service.stats())
}

fn log_stats(stats: &RelayStats, clients: usize) {
    info!(
        datagrams_accepted = stats.datagrams_accepted,
        datagrams_rejected = stats.datagrams_rejected,
        frames_committed = stats.frames_committed,
        frames_abandoned = stats.frames_abandoned,
        ticks = stats.ticks,
        fallback_ticks = stats.fallback_ticks,
        clients,
        "relay statistics"
    );
}
