//! Application layer for cam-relay.
//!
//! The application layer orchestrates the frame pipeline: it knows *what* to
//! do with a captured packet or a timer tick, but delegates *how* bytes reach
//! the wire to the infrastructure layer.
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or listening for connections (that is infrastructure)
//! - Tokio task spawning or timers (the event loop drives this layer)

pub mod relay_service;

pub use relay_service::{FrameSink, IngestOutcome, RelayService, RelayStats};
