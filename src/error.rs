//! Error kinds surfaced to embedders.

use std::io;

use crate::id::SocketId;

/// Errors that can be reported out of the node's subsystems.
///
/// `Overflow` and the transport-level `again` condition never construct an
/// `Error` value that reaches the user: the writer pool absorbs both
/// silently and simply re-arms a writable wait.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("poller failure: {0}")]
    Poller(#[source] io::Error),

    #[error("socket #{id} failure: {source}")]
    Socket {
        id: SocketId,
        #[source]
        source: io::Error,
    },

    #[error("malformed frame on socket #{id}: {message}")]
    Protocol { id: SocketId, message: String },

    #[error("handshake expired on socket #{0}")]
    HandshakeExpired(SocketId),

    #[error("connection refused: {addr}: {reason}")]
    ConnectionRefused {
        addr: std::net::SocketAddrV4,
        reason: io::Error,
    },

    #[error("network down on socket #{id}: {source}")]
    NetworkDown {
        id: SocketId,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
