//! Integration tests for the broadcast server over real loopback TCP.
//!
//! # Purpose
//!
//! These tests run the relay's event loop with an in-memory packet source in
//! place of the raw capture socket (which needs `CAP_NET_RAW`) and connect
//! real TCP viewers to it.  They verify:
//!
//! - Every viewer receives the same multipart parts.
//! - A viewer that disconnects does not disturb the others.
//! - A viewer that disconnects is dropped from the registry at the next write.
//! - A viewer that only shuts down its sending side keeps receiving frames.
//! - A viewer that stops reading is disconnected once its queue is full.
//! - Clearing the `running` flag stops the loop; a capture failure ends it
//!   with an error.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use cam_core::FrameBuffer;
use cam_relay::application::{FrameSink, RelayService};
use cam_relay::domain::RelayConfig;
use cam_relay::infrastructure::{
    bind_listener, run_loop, CaptureError, ClientRegistry, LoopSettings, PacketSource,
};

// ── Fixtures ──────────────────────────────────────────────────────────────────

const WAIT: Duration = Duration::from_secs(5);

/// Hands out packets pushed through a channel.  Closing the channel looks
/// like the capture socket closing.
struct ChannelSource {
    packets: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl PacketSource for ChannelSource {
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError> {
        let packet = self.packets.recv().await.ok_or(CaptureError::Closed)?;
        let len = packet.len().min(buf.len());
        buf[..len].copy_from_slice(&packet[..len]);
        Ok(len)
    }
}

fn channel_source() -> (mpsc::UnboundedSender<Vec<u8>>, ChannelSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, ChannelSource { packets: rx })
}

fn service() -> RelayService {
    let config = RelayConfig {
        frame_capacity: 4096,
        ..RelayConfig::default()
    };
    let fallback = FrameBuffer::from_slice(b"OFFLINE", 4096).unwrap();
    RelayService::new(&config, fallback)
}

fn fast_settings() -> LoopSettings {
    LoopSettings {
        tick_interval: Duration::from_millis(10),
        client_queue_depth: 64,
        stats_interval: Duration::ZERO,
    }
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

/// Reads one multipart part and returns its full bytes and its body.
async fn read_part<R: AsyncRead + Unpin>(stream: &mut R) -> (Vec<u8>, Vec<u8>) {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        let mut byte = [0u8; 1];
        stream.read_exact(&mut byte).await.unwrap();
        head.push(byte[0]);
    }

    let text = String::from_utf8(head.clone()).unwrap();
    assert!(text.starts_with("\r\n--newframe\r\nContent-Type: image/jpeg\r\n"));
    let length: usize = text
        .lines()
        .find_map(|line| line.strip_prefix("Content-Length: "))
        .unwrap()
        .trim()
        .parse()
        .unwrap();

    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).await.unwrap();
    let mut whole = head;
    whole.extend_from_slice(&body);
    (whole, body)
}

/// Reads parts until one carries `body`; returns that part's full bytes.
async fn read_until_body<R: AsyncRead + Unpin>(stream: &mut R, body: &[u8]) -> Vec<u8> {
    loop {
        let (whole, got) = read_part(stream).await;
        if got == body {
            return whole;
        }
    }
}

// ── Event loop tests ──────────────────────────────────────────────────────────

/// Two viewers see identical parts; when one leaves, the other keeps
/// receiving frames.
#[tokio::test]
async fn test_viewers_share_parts_and_survive_a_peer_disconnect() {
    // Arrange
    let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 5).unwrap();
    let addr = listener.local_addr().unwrap();
    let (packets, source) = channel_source();
    let running = Arc::new(AtomicBool::new(true));

    let relay = run_loop(service(), source, listener, fast_settings(), Arc::clone(&running));

    let driver = async {
        let mut first = TcpStream::connect(addr).await.unwrap();
        let mut second = TcpStream::connect(addr).await.unwrap();

        // Both viewers start on the placeholder.
        timeout(WAIT, read_until_body(&mut first, b"OFFLINE")).await.unwrap();
        timeout(WAIT, read_until_body(&mut second, b"OFFLINE")).await.unwrap();

        // Act: the camera delivers one frame in two chunks.
        packets.send(packet(1, 0, false, b"LIVE-")).unwrap();
        packets.send(packet(1, 1, true, b"FRAME")).unwrap();

        let a = timeout(WAIT, read_until_body(&mut first, b"LIVE-FRAME")).await.unwrap();
        let b = timeout(WAIT, read_until_body(&mut second, b"LIVE-FRAME")).await.unwrap();

        // Assert: byte-identical parts
        assert_eq!(a, b);

        // Act: the first viewer leaves.
        drop(first);

        // Assert: the second keeps getting one part per tick.
        for _ in 0..5 {
            let (_, body) = timeout(WAIT, read_part(&mut second)).await.unwrap();
            assert_eq!(body, b"LIVE-FRAME");
        }

        running.store(false, Ordering::Relaxed);
    };

    let (result, ()) = tokio::join!(relay, driver);

    let stats = result.unwrap();
    assert_eq!(stats.frames_committed, 1);
    assert!(stats.ticks > 0);
    drop(packets);
}

/// Losing the capture source is fatal to the loop.
#[tokio::test]
async fn test_capture_failure_ends_loop_with_error() {
    let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 5).unwrap();
    let (packets, source) = channel_source();
    drop(packets);

    let result = timeout(
        WAIT,
        run_loop(
            service(),
            source,
            listener,
            fast_settings(),
            Arc::new(AtomicBool::new(true)),
        ),
    )
    .await
    .unwrap();

    let err = result.unwrap_err();
    assert!(err.to_string().contains("packet capture failed"));
}

/// A cleared flag stops the loop at the next tick.
#[tokio::test]
async fn test_cleared_running_flag_stops_loop() {
    let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 5).unwrap();
    let (packets, source) = channel_source();

    let result = timeout(
        WAIT,
        run_loop(
            service(),
            source,
            listener,
            fast_settings(),
            Arc::new(AtomicBool::new(false)),
        ),
    )
    .await
    .unwrap();

    assert_eq!(result.unwrap().ticks, 0);
    drop(packets);
}

// ── Registry tests ────────────────────────────────────────────────────────────

/// Connects a viewer and returns (viewer side, server side, viewer address).
async fn accept_pair(
    addr: SocketAddr,
    listener: &TcpListener,
) -> (TcpStream, TcpStream, SocketAddr) {
    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    let (server, peer) = accepted.unwrap();
    (client.unwrap(), server, peer)
}

/// A viewer closing its socket is reported once writing to it fails, and
/// removed.
#[tokio::test]
async fn test_closed_viewer_is_reported_and_removed() {
    // Arrange
    let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 5).unwrap();
    let addr = listener.local_addr().unwrap();
    let (mut registry, mut closed) = ClientRegistry::new(4);
    let (client, server, peer) = accept_pair(addr, &listener).await;
    let id = registry.register(server, peer);
    assert_eq!(registry.client_count(), 1);
    let part = Bytes::from(cam_core::encode_part(b"JPEGDATA"));

    // Act: keep ticking until a write hits the closed socket
    drop(client);
    let reported = timeout(WAIT, async {
        loop {
            registry.broadcast(part.clone());
            if let Ok(Some(reported)) = timeout(Duration::from_millis(20), closed.recv()).await {
                return reported;
            }
        }
    })
    .await
    .unwrap();

    // Assert
    assert_eq!(reported, id);
    registry.remove(reported);
    assert!(!registry.contains(id));
    assert!(registry.is_empty());
}

/// A viewer that sends a request and then shuts down its sending side is
/// still reading, so it stays registered and gets the next part.
#[tokio::test]
async fn test_half_closed_viewer_keeps_receiving_parts() {
    // Arrange
    let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 5).unwrap();
    let addr = listener.local_addr().unwrap();
    let (mut registry, mut closed) = ClientRegistry::new(4);
    let (mut client, server, peer) = accept_pair(addr, &listener).await;
    let id = registry.register(server, peer);

    client.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
    client.shutdown().await.unwrap();
    // Give the writer time to see end-of-file on its read half.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Act
    registry.broadcast(Bytes::from(cam_core::encode_part(b"FRAME")));
    let (_, body) = timeout(WAIT, read_part(&mut client)).await.unwrap();

    // Assert
    assert_eq!(body, b"FRAME");
    assert!(registry.contains(id));
    assert!(closed.try_recv().is_err());
}

/// A viewer that never reads is disconnected once its queue overflows, and
/// the broadcast to it stops.
#[tokio::test]
async fn test_viewer_that_stops_reading_is_disconnected() {
    // Arrange
    let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 5).unwrap();
    let addr = listener.local_addr().unwrap();
    let (mut registry, _closed) = ClientRegistry::new(1);
    let (_stalled_client, server, peer) = accept_pair(addr, &listener).await;
    let id = registry.register(server, peer);
    let part = Bytes::from(vec![0xAB; 1024 * 1024]);

    // Act: keep broadcasting while the writer fills the socket buffers
    let mut rounds = 0;
    while registry.contains(id) && rounds < 1000 {
        registry.broadcast(part.clone());
        tokio::task::yield_now().await;
        rounds += 1;
    }

    // Assert
    assert!(!registry.contains(id));
    assert_eq!(registry.client_count(), 0);
}

/// A registered viewer receives exactly the bytes broadcast to it.
#[tokio::test]
async fn test_registered_viewer_receives_broadcast_bytes() {
    let listener = bind_listener("127.0.0.1:0".parse().unwrap(), 5).unwrap();
    let addr = listener.local_addr().unwrap();
    let (mut registry, _closed) = ClientRegistry::new(4);
    let (mut client, server, peer) = accept_pair(addr, &listener).await;
    registry.register(server, peer);

    let part = Bytes::from(cam_core::encode_part(b"JPEGDATA"));
    registry.broadcast(part.clone());

    let (whole, body) = timeout(WAIT, read_part(&mut client)).await.unwrap();
    assert_eq!(body, b"JPEGDATA");
    assert_eq!(whole, part.to_vec());
}
