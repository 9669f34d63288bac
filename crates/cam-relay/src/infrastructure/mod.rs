//! Infrastructure layer for cam-relay.
//!
//! Everything that touches the operating system lives here: the raw capture
//! socket, the TCP broadcast server, configuration and image files, and the
//! event loop that drives the application layer.

pub mod broadcast;
pub mod capture;
pub mod config_file;
pub mod event_loop;
pub mod fallback;

pub use broadcast::{bind_listener, BroadcastError, ClientId, ClientRegistry};
pub use capture::{CaptureError, CaptureSocket};
pub use config_file::{load_config, ConfigError};
pub use event_loop::{run_loop, run_relay, LoopSettings, PacketSource};
pub use fallback::{load_fallback, FallbackError};
