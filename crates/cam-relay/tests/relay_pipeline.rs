//! Integration tests for the relay's packet-to-part pipeline.
//!
//! # Purpose
//!
//! These tests drive [`RelayService`] through its public API the same way the
//! event loop does: raw packets go in through `on_datagram`, ticks come out
//! through a [`FrameSink`].  A recording sink stands in for the TCP clients, so
//! the tests check the exact bytes a viewer would receive.
//!
//! ```text
//! packet ──on_datagram──▶ RelayService ──on_tick──▶ RecordingSink
//!                                                    (header + JPEG bytes)
//! ```

use bytes::Bytes;

use cam_core::FrameBuffer;
use cam_relay::application::{FrameSink, IngestOutcome, RelayService};
use cam_relay::domain::RelayConfig;

// ── Fixtures ──────────────────────────────────────────────────────────────────

/// Remembers every part it was handed.
struct RecordingSink {
    clients: usize,
    parts: Vec<Bytes>,
}

impl RecordingSink {
    fn with_clients(clients: usize) -> Self {
        Self {
            clients,
            parts: Vec::new(),
        }
    }
}

impl FrameSink for RecordingSink {
    fn client_count(&self) -> usize {
        self.clients
    }

    fn broadcast(&mut self, part: Bytes) {
        self.parts.push(part);
    }
}

fn service() -> RelayService {
    let config = RelayConfig {
        frame_capacity: 4096,
        ..RelayConfig::default()
    };
    let fallback = FrameBuffer::from_slice(b"\xFF\xD8OFFLINE\xFF\xD9", 4096).unwrap();
    RelayService::new(&config, fallback)
}

fn packet(frame_no: u16, chunk_index: u16, is_last: bool, payload: &[u8]) -> Vec<u8> {
    let mut p = vec![0u8; 32];
    p[0] = 0x45;
    p[9] = 17;
    p[20..22].copy_from_slice(&2068u16.to_be_bytes());
    p[22..24].copy_from_slice(&2068u16.to_be_bytes());
    p[24..26].copy_from_slice(&((payload.len() + 4) as u16).to_be_bytes());
    p[28..30].copy_from_slice(&frame_no.to_be_bytes());
    let field = chunk_index | if is_last { 0x8000 } else { 0 };
    p[30..32].copy_from_slice(&field.to_be_bytes());
    p.extend_from_slice(payload);
    p
}

fn expected_part(body: &[u8]) -> Vec<u8> {
    let mut part = format!(
        "\r\n--newframe\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    part.extend_from_slice(body);
    part
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// A viewer connecting before the camera has sent anything sees the
/// placeholder, framed exactly as the multipart stream requires.
#[test]
fn test_first_tick_serves_fallback_with_exact_framing() {
    let mut relay = service();
    let mut sink = RecordingSink::with_clients(1);

    relay.on_tick(&mut sink);

    assert_eq!(sink.parts.len(), 1);
    assert_eq!(&sink.parts[0][..], &expected_part(b"\xFF\xD8OFFLINE\xFF\xD9")[..]);
}

/// Three chunks of frame 7 become one part carrying their concatenation.
#[test]
fn test_reassembled_frame_is_served_on_next_tick() {
    // Arrange
    let mut relay = service();
    let mut sink = RecordingSink::with_clients(1);
    for p in [
        packet(7, 0, false, b"AAA"),
        packet(7, 1, false, b"BBB"),
        packet(7, 2, true, b"CCC"),
    ] {
        assert!(matches!(relay.on_datagram(&p), IngestOutcome::Chunk(_)));
    }

    // Act
    relay.on_tick(&mut sink);

    // Assert
    assert_eq!(&sink.parts[0][..], &expected_part(b"AAABBBCCC")[..]);
}

/// The same frame keeps being served until the idle threshold, then the
/// placeholder takes over.
#[test]
fn test_stale_frame_gives_way_to_fallback_after_idle_threshold() {
    // Arrange
    let mut relay = service();
    let mut sink = RecordingSink::with_clients(1);
    relay.on_datagram(&packet(1, 0, true, b"LIVE"));

    // Act
    for _ in 0..51 {
        relay.on_tick(&mut sink);
    }

    // Assert: ticks 1..=49 are live, 50 and later are the fallback
    let live = Bytes::from(expected_part(b"LIVE"));
    let offline = Bytes::from(expected_part(b"\xFF\xD8OFFLINE\xFF\xD9"));
    assert!(sink.parts[..49].iter().all(|p| *p == live));
    assert_eq!(sink.parts[49], offline);
    assert_eq!(sink.parts[50], offline);
    assert_eq!(relay.stats().fallback_ticks, 2);
}

/// Foreign traffic mixed into the capture stream changes nothing.
#[test]
fn test_foreign_packets_between_chunks_are_ignored() {
    let mut relay = service();
    let mut sink = RecordingSink::with_clients(1);

    let mut tcp = packet(3, 1, false, b"XX");
    tcp[9] = 6;
    let mut other_port = packet(3, 1, false, b"YY");
    other_port[20..22].copy_from_slice(&53u16.to_be_bytes());

    relay.on_datagram(&packet(3, 0, false, b"he"));
    relay.on_datagram(&tcp);
    relay.on_datagram(&other_port);
    relay.on_datagram(&packet(3, 1, true, b"llo"));
    relay.on_tick(&mut sink);

    assert_eq!(&sink.parts[0][..], &expected_part(b"hello")[..]);
    assert_eq!(relay.stats().datagrams_rejected, 2);
}

/// Consecutive ticks reuse one encoded part until a new frame commits.
#[test]
fn test_live_part_shared_between_ticks_until_next_commit() {
    let mut relay = service();
    let mut sink = RecordingSink::with_clients(3);
    relay.on_datagram(&packet(9, 0, true, b"frame-nine"));

    relay.on_tick(&mut sink);
    relay.on_tick(&mut sink);

    assert_eq!(sink.parts[0].as_ptr(), sink.parts[1].as_ptr());
}

/// No viewers means no encoding, but the idle counter still advances.
#[test]
fn test_ticks_without_viewers_still_age_the_live_frame() {
    let mut relay = service();
    let mut nobody = RecordingSink::with_clients(0);
    relay.on_datagram(&packet(1, 0, true, b"LIVE"));

    for _ in 0..50 {
        relay.on_tick(&mut nobody);
    }
    let mut late_viewer = RecordingSink::with_clients(1);
    relay.on_tick(&mut late_viewer);

    assert!(nobody.parts.is_empty());
    assert_eq!(
        &late_viewer.parts[0][..],
        &expected_part(b"\xFF\xD8OFFLINE\xFF\xD9")[..]
    );
}
