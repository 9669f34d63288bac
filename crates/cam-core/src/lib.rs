//! # cam-core
//!
//! Shared library for Cam-Relay containing the capture wire format, the
//! multipart egress framing, and the frame reassembly state machine with its
//! double-buffered storage.
//!
//! This crate performs no I/O.  It never opens a socket or a file, so every
//! rule in here can be exercised from plain unit tests.
//!
//! # Architecture overview (for beginners)
//!
//! An upstream camera splits every JPEG frame into numbered UDP datagrams
//! ("chunks").  Cam-Relay sniffs those datagrams off the wire, stitches the
//! chunks of each frame back together, and re-serves the most recent complete
//! frame to any number of TCP viewers as a multipart JPEG stream.
//!
//! - **`protocol`** – How bytes look on the wire.  Incoming IPv4/UDP packets
//!   are validated and turned into borrowed [`Chunk`]s; outgoing frames are
//!   wrapped in the `--newframe` multipart header.
//!
//! - **`domain`** – The rules.  [`BufferStore`] owns three fixed-capacity
//!   buffers (two for double buffering, one for the fallback image),
//!   [`Reassembler`] decides when a frame is complete, and [`Distributor`]
//!   decides which buffer each outgoing tick serves.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `cam_core::Reassembler` instead of `cam_core::domain::reassembly::Reassembler`.
pub use domain::buffers::{BufferStore, CapacityExceeded, FrameBuffer, Slot, StoreSnapshot};
pub use domain::distribution::{Distributor, FrameSource};
pub use domain::reassembly::{AbandonReason, ChunkOutcome, ReassemblyState, Reassembler};
pub use protocol::datagram::{parse_datagram, Chunk, DatagramError};
pub use protocol::multipart::{encode_part, part_header};
