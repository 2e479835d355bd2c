//! The reader pool: drains readable sockets into per-socket buffers and
//! decodes as many whole frames as have arrived.

use std::io::{self, Read};

use indexmap::IndexMap;

use crate::frame::{self, Frame};
use crate::id::SocketId;
use crate::poller::Readiness;
use crate::socket::Socket;

pub enum ReaderEvent {
    Frames { id: SocketId, frames: Vec<Frame> },
    /// The peer closed its write half in an orderly fashion (zero-byte peek).
    Disconnected(SocketId),
    Failure { id: SocketId, error: io::Error },
}

struct Buffer {
    bytes: Vec<u8>,
}

impl Buffer {
    fn new() -> Buffer {
        Buffer { bytes: Vec::new() }
    }
}

/// Buffers and decodes inbound bytes per socket.
///
/// A registered socket is peeked one byte before the real read: a
/// peek that returns `Ok(0)` is an orderly close, distinguishing it from a
/// readiness notification that fires spuriously with nothing to read.
pub struct ReaderPool {
    buffers: IndexMap<SocketId, Buffer>,
    removable: Vec<SocketId>,
}

impl ReaderPool {
    pub fn new() -> ReaderPool {
        ReaderPool {
            buffers: IndexMap::new(),
            removable: Vec::new(),
        }
    }

    pub fn add(&mut self, id: SocketId) {
        self.buffers.insert(id, Buffer::new());
    }

    pub fn remove_later(&mut self, id: SocketId) {
        self.removable.push(id);
    }

    pub fn apply_remove(&mut self) {
        for id in self.removable.drain(..) {
            self.buffers.shift_remove(&id);
        }
    }

    pub fn contains(&self, id: SocketId) -> bool {
        self.buffers.contains_key(&id)
    }

    /// Drains every socket that reported readable, peeking first, then reads
    /// to `WouldBlock`, then decodes whole frames out of the accumulated
    /// buffer, leaving a partial trailing frame for the next call.
    pub fn step<'a>(
        &mut self,
        ready: &[(SocketId, Readiness)],
        locate: &mut dyn FnMut(SocketId) -> Option<&'a mut Socket>,
    ) -> Vec<ReaderEvent> {
        let mut events = Vec::new();

        for &(id, readiness) in ready {
            if !readiness.readable {
                continue;
            }
            if !self.buffers.contains_key(&id) {
                continue;
            }

            let Some(sock) = locate(id) else { continue };

            match sock.peek_one() {
                Ok(0) => {
                    events.push(ReaderEvent::Disconnected(id));
                    continue;
                }
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
                Err(error) => {
                    events.push(ReaderEvent::Failure { id, error });
                    continue;
                }
            }

            let buffer = self.buffers.get_mut(&id).unwrap();
            if let Err(error) = drain(sock, buffer) {
                events.push(ReaderEvent::Failure { id, error });
                continue;
            }

            let (frames, consumed) = frame::decode(&buffer.bytes);
            if consumed > 0 {
                buffer.bytes.drain(..consumed);
            }
            if !frames.is_empty() {
                events.push(ReaderEvent::Frames { id, frames });
            }
        }

        events
    }
}

/// Reads until `WouldBlock`, appending everything read to `buffer`. The
/// orderly-close case was already handled by the caller's peek, so a
/// zero-byte read here only ends the loop.
fn drain(sock: &mut Socket, buffer: &mut Buffer) -> io::Result<()> {
    let mut chunk = [0u8; 4096];

    loop {
        match sock.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buffer.bytes.extend_from_slice(&chunk[..n]),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }

    Ok(())
}

impl Default for ReaderPool {
    fn default() -> ReaderPool {
        ReaderPool::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::os::unix::io::AsRawFd;

    fn connected_pair() -> (Socket, Socket) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = crate::socket::connect(crate::socket::to_v4(addr).unwrap()).unwrap();
        let (accepted, peer) = listener.accept().unwrap();
        let server =
            crate::socket::from_accepted(accepted, crate::socket::to_v4(peer).unwrap()).unwrap();
        (client, server)
    }

    #[test]
    fn decodes_frames_as_they_arrive() {
        use std::io::Write as _;

        let (mut client, mut server) = connected_pair();
        let id = SocketId(server.as_raw_fd());
        client.write_all(&Frame::Heartbeat.encode()).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));

        let mut pool = ReaderPool::new();
        pool.add(id);

        let ready = vec![(
            id,
            Readiness {
                readable: true,
                ..Readiness::default()
            },
        )];
        let events = pool.step(&ready, &mut |looked_up| {
            if looked_up == id {
                Some(&mut server)
            } else {
                None
            }
        });

        assert_eq!(events.len(), 1);
        match &events[0] {
            ReaderEvent::Frames { frames, .. } => assert_eq!(frames, &vec![Frame::Heartbeat]),
            _ => panic!("expected Frames event"),
        }
    }

    #[test]
    fn orderly_close_is_reported() {
        let (client, mut server) = connected_pair();
        let id = SocketId(server.as_raw_fd());
        drop(client);

        std::thread::sleep(std::time::Duration::from_millis(20));

        let mut pool = ReaderPool::new();
        pool.add(id);

        let ready = vec![(
            id,
            Readiness {
                readable: true,
                ..Readiness::default()
            },
        )];
        let events = pool.step(&ready, &mut |looked_up| {
            if looked_up == id {
                Some(&mut server)
            } else {
                None
            }
        });

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ReaderEvent::Disconnected(_)));
    }
}
