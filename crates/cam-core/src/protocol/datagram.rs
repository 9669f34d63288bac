//! Capture datagram parser.
//!
//! The capture socket delivers whole IPv4 packets (the link-layer header is
//! already stripped).  Only packets that carry the camera's chunk protocol are
//! accepted:
//!
//! ```text
//! [IPv4 header:20][UDP header:8][frame_no:2][chunk:2][jpeg bytes:N]
//!
//! chunk = [last:1 bit][index:15 bits]
//! N     = declared UDP length - 4
//! ```
//!
//! All multi-byte integers are big-endian.  The camera fills the UDP length
//! field with the length of everything after the UDP header, so the packet
//! must hold at least `20 + 8 + declared` bytes.
//!
//! Parsing borrows the payload from the receive buffer; nothing is copied
//! until the reassembler appends the bytes into a frame buffer.

use thiserror::Error;

/// UDP port used as both source and destination by the camera.
pub const CAPTURE_PORT: u16 = 2068;

/// Only option-less IPv4 headers are accepted.
pub const IPV4_HEADER_LEN: usize = 20;

/// Fixed UDP header size.
pub const UDP_HEADER_LEN: usize = 8;

/// Frame number plus chunk field.
pub const SEQUENCE_LEN: usize = 4;

/// Smallest packet that can carry a chunk (an empty one).
pub const MIN_DATAGRAM_LEN: usize = IPV4_HEADER_LEN + UDP_HEADER_LEN + SEQUENCE_LEN;

/// Largest chunk payload that must survive capture.
pub const MAX_CHUNK_PAYLOAD: usize = 4096;

/// Receive buffer size for the capture socket.  Longer packets are truncated
/// by the kernel and then rejected by the declared-length check.
pub const CAPTURE_BUFFER_LEN: usize = MIN_DATAGRAM_LEN + MAX_CHUNK_PAYLOAD;

/// Bit 15 of the chunk field marks the final chunk of a frame.
pub const LAST_CHUNK_FLAG: u16 = 0x8000;

/// Bits 0–14 of the chunk field carry the chunk index.
pub const CHUNK_INDEX_MASK: u16 = 0x7FFF;

const IP_PROTOCOL_UDP: u8 = 17;

/// Reasons a captured packet is not a chunk.
///
/// None of these are fatal; the packet is simply dropped.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum DatagramError {
    /// The packet cannot even hold the IP, UDP and sequencing headers.
    #[error("packet too short: need at least {needed} bytes, got {available}")]
    TooShort { needed: usize, available: usize },

    /// The IP version nibble is not 4.
    #[error("not an IPv4 packet (version {0})")]
    NotIpv4(u8),

    /// The IPv4 header carries options.
    #[error("unsupported IPv4 header length: {0} bytes")]
    UnsupportedHeaderLength(usize),

    /// The IPv4 payload is not UDP.
    #[error("not a UDP packet (protocol {0})")]
    NotUdp(u8),

    /// Source or destination port differs from the capture port.
    #[error("wrong UDP ports: {src} -> {dst}")]
    WrongPort { src: u16, dst: u16 },

    /// The declared UDP length is too small to hold the sequencing fields.
    #[error("declared UDP length {0} cannot hold the sequencing fields")]
    TruncatedSequence(u16),

    /// The declared UDP length does not fit in the bytes received.
    #[error("length mismatch: header declares {declared} bytes, {available} received")]
    LengthMismatch { declared: usize, available: usize },
}

impl DatagramError {
    /// Returns `true` for packets that simply belong to other traffic on the
    /// interface (wrong version, protocol or port), as opposed to packets that
    /// look like chunks but are damaged.
    ///
    /// Foreign traffic is high-volume and is only logged at `trace` level.
    pub fn is_foreign_traffic(&self) -> bool {
        matches!(
            self,
            DatagramError::NotIpv4(_)
                | DatagramError::UnsupportedHeaderLength(_)
                | DatagramError::NotUdp(_)
                | DatagramError::WrongPort { .. }
        )
    }
}

/// One validated chunk of a JPEG frame, borrowing its payload from the
/// receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Frame number this chunk belongs to.
    pub frame_no: u16,
    /// Position of this chunk within the frame (15 bits).
    pub chunk_index: u16,
    /// `true` if this is the final chunk of the frame.
    pub is_last: bool,
    /// Raw JPEG bytes carried by this chunk.
    pub payload: &'a [u8],
}

impl<'a> Chunk<'a> {
    /// Builds a chunk from the raw 16-bit chunk field.
    pub fn from_raw(frame_no: u16, chunk_field: u16, payload: &'a [u8]) -> Self {
        Self {
            frame_no,
            chunk_index: chunk_field & CHUNK_INDEX_MASK,
            is_last: chunk_field & LAST_CHUNK_FLAG != 0,
            payload,
        }
    }
}

/// Validates one captured IPv4 packet and extracts its chunk.
///
/// `port` is the UDP port both ends must use (normally [`CAPTURE_PORT`]).
///
/// # Errors
///
/// Returns a [`DatagramError`] describing the first check the packet fails.
///
/// # Examples
///
/// ```rust
/// use cam_core::protocol::datagram::{parse_datagram, CAPTURE_PORT};
///
/// let mut packet = vec![0u8; 32];
/// packet[0] = 0x45; // IPv4, 20-byte header
/// packet[9] = 17; // UDP
/// packet[20..22].copy_from_slice(&CAPTURE_PORT.to_be_bytes());
/// packet[22..24].copy_from_slice(&CAPTURE_PORT.to_be_bytes());
/// packet[24..26].copy_from_slice(&7u16.to_be_bytes()); // 4 sequencing + 3 data
/// packet[28..30].copy_from_slice(&9u16.to_be_bytes()); // frame 9
/// packet[30..32].copy_from_slice(&0x8001u16.to_be_bytes()); // last, index 1
/// packet.extend_from_slice(b"JPG");
///
/// let chunk = parse_datagram(&packet, CAPTURE_PORT).unwrap();
/// assert_eq!(chunk.frame_no, 9);
/// assert_eq!(chunk.chunk_index, 1);
/// assert!(chunk.is_last);
/// assert_eq!(chunk.payload, b"JPG");
/// ```
pub fn parse_datagram(packet: &[u8], port: u16) -> Result<Chunk<'_>, DatagramError> {
    if packet.len() < MIN_DATAGRAM_LEN {
        return Err(DatagramError::TooShort {
            needed: MIN_DATAGRAM_LEN,
            available: packet.len(),
        });
    }

    let version = packet[0] >> 4;
    if version != 4 {
        return Err(DatagramError::NotIpv4(version));
    }

    let header_len = usize::from(packet[0] & 0x0F) * 4;
    if header_len != IPV4_HEADER_LEN {
        return Err(DatagramError::UnsupportedHeaderLength(header_len));
    }

    let protocol = packet[9];
    if protocol != IP_PROTOCOL_UDP {
        return Err(DatagramError::NotUdp(protocol));
    }

    let udp = &packet[IPV4_HEADER_LEN..];
    let src = read_u16(udp, 0);
    let dst = read_u16(udp, 2);
    if src != port || dst != port {
        return Err(DatagramError::WrongPort { src, dst });
    }

    let declared = read_u16(udp, 4);
    if usize::from(declared) < SEQUENCE_LEN {
        return Err(DatagramError::TruncatedSequence(declared));
    }

    let needed = IPV4_HEADER_LEN + UDP_HEADER_LEN + usize::from(declared);
    if packet.len() < needed {
        return Err(DatagramError::LengthMismatch {
            declared: usize::from(declared),
            available: packet.len() - IPV4_HEADER_LEN - UDP_HEADER_LEN,
        });
    }

    let frame_no = read_u16(udp, UDP_HEADER_LEN);
    let chunk_field = read_u16(udp, UDP_HEADER_LEN + 2);
    let payload_start = IPV4_HEADER_LEN + UDP_HEADER_LEN + SEQUENCE_LEN;
    let payload = &packet[payload_start..needed];

    Ok(Chunk::from_raw(frame_no, chunk_field, payload))
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
