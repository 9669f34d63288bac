//! Broadcast server: TCP listener, client registry and per-client writers.
//!
//! This module is responsible for:
//!
//! 1. Binding the viewer-facing TCP listener with `SO_REUSEADDR` and the
//!    configured backlog.
//! 2. Keeping the registry of connected viewers.
//! 3. Running one writer task per viewer that drains a bounded queue of
//!    encoded multipart parts into the socket.
//! 4. Reporting viewers that went away so the event loop can drop them.
//!
//! # Backpressure
//!
//! A tick hands the registry one encoded part as [`Bytes`].  Cloning `Bytes`
//! only bumps a reference count, so every viewer shares the same allocation.
//! Each viewer queue holds at most `client_queue_depth` parts.  If a tick finds
//! the queue full the viewer is too slow to keep up and is disconnected on the
//! spot; its writer task is aborted, which closes the socket.
//!
//! # Disconnect detection
//!
//! A viewer is dropped when writing to it fails or reading from it errors.
//! Anything a viewer sends is discarded.  End-of-file on the read half only
//! means the viewer shut down its sending side (`nc -N`, a request followed by
//! `shutdown(SHUT_WR)`); it may still be reading, so frames keep flowing.  A
//! viewer that closed the socket entirely is caught by the next write, which
//! fails with `EPIPE` or `ECONNRESET`.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::FrameSink;

/// Identifier assigned to every accepted viewer.
pub type ClientId = Uuid;

/// Error type for listener setup.
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("failed to create listener socket for {addr}: {source}")]
    Create {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Binds a TCP listener on `addr` with address reuse and `backlog` pending
/// connections.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns the [`BroadcastError`] variant naming the step that failed.
pub fn bind_listener(addr: SocketAddr, backlog: u32) -> Result<TcpListener, BroadcastError> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(|source| BroadcastError::Create { addr, source })?;

    socket
        .set_reuseaddr(true)
        .map_err(|source| BroadcastError::Create { addr, source })?;
    socket
        .bind(addr)
        .map_err(|source| BroadcastError::Bind { addr, source })?;
    socket
        .listen(backlog)
        .map_err(|source| BroadcastError::Listen { addr, source })
}

// ── Client registry ───────────────────────────────────────────────────────────

struct ClientHandle {
    peer: SocketAddr,
    frames: mpsc::Sender<Bytes>,
    writer: AbortHandle,
}

/// The set of connected viewers.
///
/// Owned by the event loop.  Writer tasks report their own exit through the
/// receiver returned by [`ClientRegistry::new`]; the loop then calls
/// [`ClientRegistry::remove`].
pub struct ClientRegistry {
    clients: HashMap<ClientId, ClientHandle>,
    queue_depth: usize,
    closed_tx: mpsc::UnboundedSender<ClientId>,
}

impl ClientRegistry {
    /// Creates an empty registry whose viewers may each have `queue_depth`
    /// parts queued, plus the channel on which finished writers report.
    pub fn new(queue_depth: usize) -> (Self, mpsc::UnboundedReceiver<ClientId>) {
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let registry = Self {
            clients: HashMap::new(),
            queue_depth: queue_depth.max(1),
            closed_tx,
        };
        (registry, closed_rx)
    }

    /// Starts serving `stream` and returns the viewer's new id.
    ///
    /// The first part the viewer receives is the one broadcast on the next
    /// tick.
    pub fn register(&mut self, stream: TcpStream, peer: SocketAddr) -> ClientId {
        let id = Uuid::new_v4();
        let (frames_tx, frames_rx) = mpsc::channel(self.queue_depth);
        let (reader, writer) = stream.into_split();
        let closed_tx = self.closed_tx.clone();

        let task = tokio::spawn(async move {
            match pump_frames(reader, writer, frames_rx).await {
                Ok(()) => debug!("client {id}: writer finished"),
                Err(e) => debug!("client {id}: connection error: {e}"),
            }
            // The loop may already have dropped us; nothing to do then.
            let _ = closed_tx.send(id);
        });

        self.clients.insert(
            id,
            ClientHandle {
                peer,
                frames: frames_tx,
                writer: task.abort_handle(),
            },
        );
        info!(
            "client {id} connected from {peer} ({} connected)",
            self.clients.len()
        );
        id
    }

    /// Forgets viewer `id` and closes its connection.  Returns `false` if it
    /// was already gone.
    pub fn remove(&mut self, id: ClientId) -> bool {
        match self.clients.remove(&id) {
            Some(handle) => {
                handle.writer.abort();
                info!(
                    "client {id} ({}) disconnected ({} connected)",
                    handle.peer,
                    self.clients.len()
                );
                true
            }
            None => false,
        }
    }

    /// Whether viewer `id` is registered.
    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl FrameSink for ClientRegistry {
    fn client_count(&self) -> usize {
        self.clients.len()
    }

    fn broadcast(&mut self, part: Bytes) {
        let queue_depth = self.queue_depth;
        self.clients
            .retain(|id, handle| match handle.frames.try_send(part.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "client {id} ({}) has {queue_depth} frames queued; disconnecting",
                        handle.peer
                    );
                    handle.writer.abort();
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    info!("client {id} ({}) disconnected", handle.peer);
                    false
                }
            });
    }
}

impl Drop for ClientRegistry {
    fn drop(&mut self) {
        for handle in self.clients.values() {
            handle.writer.abort();
        }
    }
}

// ── Per-client writer ─────────────────────────────────────────────────────────

/// Writes every part received on `frames` to `writer` until the queue is
/// closed or the connection fails.
///
/// Bytes arriving on `reader` are discarded.  Once `reader` reaches
/// end-of-file it is no longer polled and the writer carries on.
///
/// Returns `Ok(())` when the queue closes.
///
/// # Errors
///
/// Propagates the first read or write error.
pub async fn pump_frames<R, W>(
    mut reader: R,
    mut writer: W,
    mut frames: mpsc::Receiver<Bytes>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut scratch = [0u8; 256];
    let mut reader_open = true;
    loop {
        tokio::select! {
            part = frames.recv() => match part {
                Some(part) => writer.write_all(&part).await?,
                None => return Ok(()),
            },
            read = reader.read(&mut scratch), if reader_open => {
                if read? == 0 {
                    reader_open = false;
                }
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_pump_writes_parts_in_order_then_stops_when_queue_closes() {
        // Arrange
        let writer = Builder::new().write(b"first").write(b"second").build();
        let (reader, _peer) = tokio::io::duplex(64);
        let (tx, rx) = mpsc::channel(4);
        tx.send(Bytes::from_static(b"first")).await.unwrap();
        tx.send(Bytes::from_static(b"second")).await.unwrap();
        drop(tx);

        // Act
        let result = pump_frames(reader, writer, rx).await;

        // Assert
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_pump_keeps_writing_after_peer_half_closes() {
        // Arrange: the viewer sends a request, then shuts down its sending side
        let writer = Builder::new().write(b"frame").build();
        let (reader, mut peer) = tokio::io::duplex(64);
        peer.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
        peer.shutdown().await.unwrap();
        let (tx, rx) = mpsc::channel(4);

        let deliver_later = async move {
            // Let the pump see end-of-file before any part is queued.
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            tx.send(Bytes::from_static(b"frame")).await.unwrap();
        };

        // Act
        let (result, ()) = tokio::join!(pump_frames(reader, writer, rx), deliver_later);

        // Assert: the part was written (the mock checks on drop)
        assert!(result.is_ok());
        drop(peer);
    }

    #[tokio::test]
    async fn test_pump_propagates_read_error() {
        let writer = Builder::new().build();
        let reader = Builder::new()
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let (_tx, rx) = mpsc::channel::<Bytes>(4);

        let err = pump_frames(reader, writer, rx).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[tokio::test]
    async fn test_pump_propagates_write_error() {
        let writer = Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let (reader, _peer) = tokio::io::duplex(64);
        let (tx, rx) = mpsc::channel(4);
        tx.send(Bytes::from_static(b"part")).await.unwrap();

        let err = pump_frames(reader, writer, rx).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_pump_ignores_bytes_sent_by_viewer() {
        // Arrange
        let writer = Builder::new().write(b"frame").build();
        let (reader, mut peer) = tokio::io::duplex(64);
        peer.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let (tx, rx) = mpsc::channel(4);
        tx.send(Bytes::from_static(b"frame")).await.unwrap();
        drop(tx);

        // Act
        let result = pump_frames(reader, writer, rx).await;

        // Assert
        assert!(result.is_ok());
        drop(peer);
    }

    #[tokio::test]
    async fn test_bind_listener_on_ephemeral_port() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 5).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_bind_listener_reports_address_in_use() {
        // Arrange: address reuse does not allow two listeners on one port
        let first = bind_listener("127.0.0.1:0".parse().unwrap(), 5).unwrap();
        let addr = first.local_addr().unwrap();

        // Act
        let second = bind_listener(addr, 5);

        // Assert
        assert!(matches!(second, Err(BroadcastError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_new_registry_is_empty() {
        let (registry, _closed) = ClientRegistry::new(4);
        assert!(registry.is_empty());
        assert_eq!(registry.client_count(), 0);
    }
}
