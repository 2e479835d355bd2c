//! The socket pools: listener, connecting, reader, writer, plus the socket
//! pool proper that owns the live handles.

pub mod connecting;
pub mod listener;
pub mod reader;
pub mod socket;
pub mod writer;
