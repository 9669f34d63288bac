//! Domain rules for Cam-Relay.
//!
//! This module contains pure business logic with no infrastructure dependencies.
//! Sockets, timers and files live in `cam-relay`; the code here only decides
//! what to do with bytes that have already been received.
//!
//! # Ownership model
//!
//! One [`buffers::BufferStore`] and one [`reassembly::Reassembler`] exist per
//! process.  Both are owned by a single context object and mutated from a
//! single event loop, so the write side (reassembly) and the read side
//! (distribution ticks) never touch the store at the same time.  No lock or
//! atomic is needed around the slot flip.

/// Fixed-capacity buffers and the double-buffer store.
pub mod buffers;

/// Fixed-rate tick policy (live frame vs. fallback).
pub mod distribution;

/// Chunk-to-frame state machine.
pub mod reassembly;

pub use buffers::{BufferStore, CapacityExceeded, FrameBuffer, Slot, StoreSnapshot};
pub use distribution::{Distributor, FrameSource};
pub use reassembly::{AbandonReason, ChunkOutcome, ReassemblyState, Reassembler};
