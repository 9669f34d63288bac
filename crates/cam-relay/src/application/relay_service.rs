//! The relay's context object: ingestion on one side, distribution ticks on
//! the other.
//!
//! [`RelayService`] owns the whole frame pipeline state (buffer store,
//! reassembler, tick policy and counters).  The event loop owns exactly one
//! instance and calls into it from two kinds of events:
//!
//! - capture readiness → [`RelayService::on_datagram`] (write side)
//! - timer tick        → [`RelayService::on_tick`]     (read side)
//!
//! Because both calls take `&mut self` and run on the same task, they can never
//! overlap, which is what keeps the double-buffer flip free of locks.
//!
//! Delivery is abstracted behind the [`FrameSink`] trait so the service can be
//! tested without sockets.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, trace};

use cam_core::{
    part_header, parse_datagram, BufferStore, ChunkOutcome, DatagramError, Distributor,
    FrameBuffer, FrameSource, ReassemblyState, Reassembler,
};

use crate::domain::RelayConfig;

/// Receives one encoded multipart part per tick.
///
/// Implemented by the broadcast client registry in the infrastructure layer.
#[cfg_attr(test, mockall::automock)]
pub trait FrameSink {
    /// Number of viewers currently registered.  When zero the tick still ages
    /// the idle counter but skips encoding.
    fn client_count(&self) -> usize;

    /// Queues `part` for every registered viewer.
    fn broadcast(&mut self, part: Bytes);
}

/// Result of feeding one captured packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The packet is not a valid chunk and was dropped.
    Rejected(DatagramError),
    /// The packet was a chunk; this is what the reassembler did with it.
    Chunk(ChunkOutcome),
}

/// Running counters, reported periodically by the event loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub datagrams_accepted: u64,
    pub datagrams_rejected: u64,
    pub frames_committed: u64,
    pub frames_abandoned: u64,
    pub ticks: u64,
    pub fallback_ticks: u64,
}

/// The frame pipeline context.
pub struct RelayService {
    store: BufferStore,
    reassembler: Reassembler,
    distributor: Distributor,
    capture_port: u16,
    stats: RelayStats,
    /// The fallback never changes, so its part is encoded once.
    fallback_part: Bytes,
    /// Last encoded live part, tagged with the commit count it was built from.
    live_part: Option<(u64, Bytes)>,
}

impl RelayService {
    /// Creates the pipeline with empty double-buffer slots and the given
    /// fallback image.
    pub fn new(config: &RelayConfig, fallback: FrameBuffer) -> Self {
        let distributor = config.distributor();
        let fallback_part = encode(fallback.as_bytes());
        Self {
            store: BufferStore::new(
                config.frame_capacity,
                fallback,
                distributor.idle_threshold(),
            ),
            reassembler: Reassembler::new(),
            distributor,
            capture_port: config.capture_port,
            stats: RelayStats::default(),
            fallback_part,
            live_part: None,
        }
    }

    /// Parses one captured packet and, if it is a chunk, runs it through the
    /// reassembler.
    pub fn on_datagram(&mut self, packet: &[u8]) -> IngestOutcome {
        let chunk = match parse_datagram(packet, self.capture_port) {
            Ok(chunk) => chunk,
            Err(e) => {
                if e.is_foreign_traffic() {
                    trace!("ignoring packet: {e}");
                } else {
                    debug!("dropping malformed chunk packet: {e}");
                }
                self.stats.datagrams_rejected += 1;
                return IngestOutcome::Rejected(e);
            }
        };

        self.stats.datagrams_accepted += 1;
        let outcome = self.reassembler.handle_chunk(&chunk, &mut self.store);
        match outcome {
            ChunkOutcome::Committed { .. } => self.stats.frames_committed += 1,
            ChunkOutcome::Abandoned(_) => self.stats.frames_abandoned += 1,
            _ => {}
        }
        IngestOutcome::Chunk(outcome)
    }

    /// Performs one distribution tick and hands the selected frame to `sink`.
    pub fn on_tick<S: FrameSink + ?Sized>(&mut self, sink: &mut S) -> FrameSource {
        let source = self.distributor.tick(&mut self.store);
        self.stats.ticks += 1;
        if source == FrameSource::Fallback {
            self.stats.fallback_ticks += 1;
        }

        if sink.client_count() > 0 {
            let part = self.part_for(source);
            sink.broadcast(part);
        }
        source
    }

    /// Returns the encoded part (header + bytes) for `source`.
    pub fn part_for(&mut self, source: FrameSource) -> Bytes {
        match source {
            FrameSource::Fallback => self.fallback_part.clone(),
            FrameSource::Live(_) => {
                let generation = self.stats.frames_committed;
                match &self.live_part {
                    Some((built_at, part)) if *built_at == generation => part.clone(),
                    _ => {
                        let part = encode(self.store.frame(source).as_bytes());
                        self.live_part = Some((generation, part.clone()));
                        part
                    }
                }
            }
        }
    }

    /// Counters accumulated since startup.
    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    /// The buffer store, for inspection.
    pub fn store(&self) -> &BufferStore {
        &self.store
    }

    /// The reassembler's tracking state, for inspection.
    pub fn reassembly_state(&self) -> ReassemblyState {
        self.reassembler.state()
    }
}

/// Copies `body` behind its multipart header into one shareable buffer.
fn encode(body: &[u8]) -> Bytes {
    let header = part_header(body.len());
    let mut part = BytesMut::with_capacity(header.len() + body.len());
    part.put_slice(header.as_bytes());
    part.put_slice(body);
    part.freeze()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
