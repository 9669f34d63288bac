//! Promiscuous link-layer capture socket.
//!
//! The camera sends its chunks to a fixed address that is not ours, so a
//! normal UDP socket never sees them.  Instead we open an `AF_PACKET` socket
//! in cooked (`SOCK_DGRAM`) mode filtered to IPv4, bind it to one interface
//! and add a promiscuous membership.  Each `recv` then yields a whole IPv4
//! packet with the link-layer header already stripped, which is exactly what
//! `cam_core::parse_datagram` expects.
//!
//! # How the socket joins the async loop (for beginners)
//!
//! The descriptor is created non-blocking and wrapped in
//! [`tokio::io::unix::AsyncFd`].  `AsyncFd` asks the reactor to wake us when
//! the kernel reports the descriptor readable.  We then try `recv`; if another
//! wakeup raced us and there is nothing left, `recv` fails with `EAGAIN`,
//! `try_io` clears the readiness flag and we wait again.
//!
//! Raw sockets need `CAP_NET_RAW` (or root).  Only Linux is supported; on other
//! targets [`CaptureSocket::open`] returns [`CaptureError::Unsupported`].

use thiserror::Error;

/// Error type for the capture socket.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("interface name {0:?} contains a NUL byte")]
    InvalidInterfaceName(String),

    #[error("unknown network interface {interface}: {source}")]
    UnknownInterface {
        interface: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create raw capture socket: {0}")]
    Socket(#[source] std::io::Error),

    #[error("failed to bind capture socket to {interface}: {source}")]
    Bind {
        interface: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to enable promiscuous mode on {interface}: {source}")]
    Promiscuous {
        interface: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to register capture socket with the runtime: {0}")]
    Register(#[source] std::io::Error),

    #[error("capture read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("capture socket closed")]
    Closed,

    #[error("raw link-layer capture is only supported on Linux")]
    Unsupported,
}

#[cfg(target_os = "linux")]
pub use linux::CaptureSocket;

#[cfg(not(target_os = "linux"))]
pub use unsupported::CaptureSocket;

#[cfg(target_os = "linux")]
mod linux {
    use std::ffi::CString;
    use std::io;
    use std::mem;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    use tokio::io::unix::AsyncFd;
    use tokio::io::Interest;
    use tracing::info;

    use super::CaptureError;

    /// A non-blocking `AF_PACKET` socket registered with the tokio reactor.
    #[derive(Debug)]
    pub struct CaptureSocket {
        fd: AsyncFd<OwnedFd>,
        interface: String,
    }

    impl CaptureSocket {
        /// Opens a promiscuous IPv4 capture socket on `interface`.
        ///
        /// Must be called from within a tokio runtime.
        ///
        /// # Errors
        ///
        /// Returns the [`CaptureError`] variant naming the step that failed.
        pub fn open(interface: &str) -> Result<Self, CaptureError> {
            let name = CString::new(interface)
                .map_err(|_| CaptureError::InvalidInterfaceName(interface.to_string()))?;

            // SAFETY: `name` is a valid NUL-terminated string for the call.
            let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
            if index == 0 {
                return Err(CaptureError::UnknownInterface {
                    interface: interface.to_string(),
                    source: io::Error::last_os_error(),
                });
            }
            let ifindex = index as libc::c_int;

            let protocol = (libc::ETH_P_IP as u16).to_be();

            // SAFETY: plain syscall; the result is checked before use.
            let raw = unsafe {
                libc::socket(
                    libc::AF_PACKET,
                    libc::SOCK_DGRAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                    libc::c_int::from(protocol),
                )
            };
            if raw < 0 {
                return Err(CaptureError::Socket(io::Error::last_os_error()));
            }
            // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
            let fd = unsafe { OwnedFd::from_raw_fd(raw) };

            // SAFETY: `sockaddr_ll` is plain old data; all-zero is a valid value.
            let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
            addr.sll_family = libc::AF_PACKET as libc::c_ushort;
            addr.sll_protocol = protocol;
            addr.sll_ifindex = ifindex;

            // SAFETY: `addr` outlives the call and the length matches its type.
            let rc = unsafe {
                libc::bind(
                    fd.as_raw_fd(),
                    (&addr as *const libc::sockaddr_ll).cast::<libc::sockaddr>(),
                    mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
                )
            };
            if rc < 0 {
                return Err(CaptureError::Bind {
                    interface: interface.to_string(),
                    source: io::Error::last_os_error(),
                });
            }

            // SAFETY: `packet_mreq` is plain old data; all-zero is a valid value.
            let mut mreq: libc::packet_mreq = unsafe { mem::zeroed() };
            mreq.mr_ifindex = ifindex;
            mreq.mr_type = libc::PACKET_MR_PROMISC as libc::c_ushort;

            // SAFETY: `mreq` outlives the call and the length matches its type.
            let rc = unsafe {
                libc::setsockopt(
                    fd.as_raw_fd(),
                    libc::SOL_PACKET,
                    libc::PACKET_ADD_MEMBERSHIP,
                    (&mreq as *const libc::packet_mreq).cast::<libc::c_void>(),
                    mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
                )
            };
            if rc < 0 {
                return Err(CaptureError::Promiscuous {
                    interface: interface.to_string(),
                    source: io::Error::last_os_error(),
                });
            }

            let fd = AsyncFd::with_interest(fd, Interest::READABLE)
                .map_err(CaptureError::Register)?;

            info!("capturing IPv4 traffic on {interface} (ifindex {ifindex}, promiscuous)");
            Ok(Self {
                fd,
                interface: interface.to_string(),
            })
        }

        /// Name of the interface this socket is bound to.
        pub fn interface(&self) -> &str {
            &self.interface
        }

        /// Waits for the next packet and copies it into `buf`.
        ///
        /// Packets longer than `buf` are truncated by the kernel; the returned
        /// length is the number of bytes actually stored.
        ///
        /// # Errors
        ///
        /// [`CaptureError::Closed`] if the socket reports end-of-stream,
        /// [`CaptureError::Read`] for any other failure except `EINTR`, which
        /// is retried.
        pub async fn recv(&self, buf: &mut [u8]) -> Result<usize, CaptureError> {
            loop {
                let mut guard = self.fd.readable().await.map_err(CaptureError::Read)?;

                let result = guard.try_io(|inner| {
                    // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
                    let n = unsafe {
                        libc::recv(
                            inner.get_ref().as_raw_fd(),
                            buf.as_mut_ptr().cast::<libc::c_void>(),
                            buf.len(),
                            0,
                        )
                    };
                    if n < 0 {
                        Err(io::Error::last_os_error())
                    } else {
                        Ok(n as usize)
                    }
                });

                match result {
                    Ok(Ok(0)) => return Err(CaptureError::Closed),
                    Ok(Ok(n)) => return Ok(n),
                    Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Ok(Err(e)) => return Err(CaptureError::Read(e)),
                    // Spurious wakeup; readiness was cleared by `try_io`.
                    Err(_would_block) => continue,
                }
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod unsupported {
    use super::CaptureError;

    /// Placeholder for targets without `AF_PACKET`.
    #[derive(Debug)]
    pub struct CaptureSocket {
        _private: (),
    }

    impl CaptureSocket {
        /// Always fails with [`CaptureError::Unsupported`].
        pub fn open(_interface: &str) -> Result<Self, CaptureError> {
            Err(CaptureError::Unsupported)
        }

        pub fn interface(&self) -> &str {
            ""
        }

        pub async fn recv(&self, _buf: &mut [u8]) -> Result<usize, CaptureError> {
            Err(CaptureError::Unsupported)
        }
    }
}
