//! The non-blocking TCP handle wrapped by the socket pool.
//!
//! A thin wrapper that puts the handle in non-blocking mode at construction
//! and exposes the raw `Read` + `Write` + `peek` surface the reader and
//! writer pools need, plus a way to resolve an asynchronously completing
//! `connect` call.

use std::io::{self, Read, Write};
use std::net::{self, SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};

/// Where a socket came from: accepted on a listener, or dialed outward.
///
/// Only `Connected` sockets are ever reconnected; accepted sockets
/// are not, since the remote end is the one that is expected to redial.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    Accepted,
    Connected,
}

/// A non-blocking TCP stream, plus the address it talks to.
#[derive(Debug)]
pub struct Socket {
    inner: TcpStream,
    remote_addr: SocketAddrV4,
}

impl Socket {
    fn from_stream(inner: TcpStream, remote_addr: SocketAddrV4) -> io::Result<Socket> {
        inner.set_nonblocking(true)?;
        Ok(Socket { inner, remote_addr })
    }

    pub fn remote_addr(&self) -> SocketAddrV4 {
        self.remote_addr
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn shutdown(&self) -> io::Result<()> {
        self.inner.shutdown(net::Shutdown::Both)
    }

    pub fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        self.inner.set_nodelay(nodelay)
    }

    /// Performs the one-byte peek the reader pool uses to distinguish an
    /// orderly close from a spurious wakeup.
    pub fn peek_one(&self) -> io::Result<usize> {
        let mut byte = [0u8; 1];
        self.inner.peek(&mut byte)
    }

    /// Checks whether an asynchronously connecting socket has resolved
    /// successfully, by reading `SO_ERROR`.
    pub fn take_connect_error(&self) -> io::Result<Option<io::Error>> {
        self.inner.take_error()
    }
}

impl Read for Socket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for Socket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

/// Starts a non-blocking outbound connection. Per POSIX, a connecting
/// socket reports writable once the connection attempt resolves one way or
/// the other; the caller is expected to register it with [`crate::poller`]
/// under `Interest::connecting` and check [`Socket::take_connect_error`]
/// when it fires.
pub fn connect(addr: SocketAddrV4) -> io::Result<Socket> {
    let stream = TcpStream::connect(addr)?;
    Socket::from_stream(stream, addr)
}

pub fn from_accepted(stream: TcpStream, remote_addr: SocketAddrV4) -> io::Result<Socket> {
    Socket::from_stream(stream, remote_addr)
}

/// Binds a non-blocking listening socket for [`crate::pool::listener::ListenerPool`].
pub fn listen(addr: SocketAddrV4) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

pub fn to_v4(addr: SocketAddr) -> io::Result<SocketAddrV4> {
    match addr {
        SocketAddr::V4(v4) => Ok(v4),
        SocketAddr::V6(_) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "meshnet only supports IPv4 transport addresses",
        )),
    }
}
