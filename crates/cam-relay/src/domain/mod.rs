//! Domain layer for cam-relay.
//!
//! Plain configuration types with no I/O.  The frame-level rules themselves
//! (reassembly, buffering, tick policy) live in `cam-core`.
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, socket, or file types
//! - Environment variable or config file reading

pub mod config;

pub use config::{InvalidConfig, RelayConfig};
