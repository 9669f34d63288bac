//! Protocol module containing the capture datagram parser and the multipart
//! egress framing.

pub mod datagram;
pub mod multipart;

pub use datagram::{parse_datagram, Chunk, DatagramError};
pub use multipart::{encode_part, part_header, BOUNDARY};
