//! cam-relay library crate.
//!
//! Captures the chunked JPEG-over-UDP feed of a network camera from a raw
//! link-layer socket, reassembles whole frames, and serves the latest one to
//! every connected TCP viewer as a multipart JPEG stream.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Camera ──UDP chunks──▶ [AF_PACKET socket]
//!                              │
//! [cam-relay]                  ▼
//!   ├── domain/           RelayConfig and its validation
//!   ├── application/      RelayService: ingest packets, tick, FrameSink trait
//!   └── infrastructure/
//!         ├── capture/     Promiscuous raw capture socket (libc + AsyncFd)
//!         ├── broadcast/   TCP listener, client registry, per-client writers
//!         ├── config_file/ TOML configuration loader
//!         ├── fallback/    Placeholder image loader
//!         └── event_loop/  Single-threaded select! loop tying it together
//!                              │
//!                              ▼
//!                    Viewers (multipart JPEG over TCP)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O.
//! - `application` depends on `domain` and `cam-core` only.
//! - `infrastructure` depends on all other layers plus `tokio` and `libc`.
//!
//! # For beginners: why a single-threaded loop?
//!
//! The reassembler writes into the staging buffer while the timer reads the
//! active one.  Running both on one task means the slot flip is an ordinary
//! assignment that no tick can ever observe half-done, so no lock is needed.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: the frame pipeline context.
pub mod application;

/// Infrastructure layer: sockets, files and the event loop.
pub mod infrastructure;
