//! The socket pool: owns every live socket handle and resolves ids for the
//! other subsystems, which hold only ids.

use indexmap::IndexMap;

use crate::id::SocketId;
use crate::socket::{Origin, Socket};

struct Record {
    socket: Socket,
    origin: Origin,
}

/// Owns `Socket` objects; every other subsystem only ever holds a
/// [`SocketId`] and resolves through here.
///
/// Removal is deferred: [`SocketPool::remove_later`] only marks an
/// id for removal, and [`SocketPool::apply_remove`] drops the record. The
/// node orchestrator calls `apply_remove` last in its `step` ordering so
/// that every other pool can still resolve the id during its own cleanup
/// pass.
pub struct SocketPool {
    records: IndexMap<SocketId, Record>,
    removable: Vec<SocketId>,
}

impl SocketPool {
    pub fn new() -> SocketPool {
        SocketPool {
            records: IndexMap::new(),
            removable: Vec::new(),
        }
    }

    pub fn add_accepted(&mut self, id: SocketId, socket: Socket) {
        self.records.insert(
            id,
            Record {
                socket,
                origin: Origin::Accepted,
            },
        );
    }

    pub fn add_connected(&mut self, id: SocketId, socket: Socket) {
        self.records.insert(
            id,
            Record {
                socket,
                origin: Origin::Connected,
            },
        );
    }

    pub fn locate(&self, id: SocketId) -> Option<&Socket> {
        self.records.get(&id).map(|rec| &rec.socket)
    }

    pub fn locate_mut(&mut self, id: SocketId) -> Option<&mut Socket> {
        self.records.get_mut(&id).map(|rec| &mut rec.socket)
    }

    /// Resolves a socket together with the origin it was created from, the
    /// detail the reconnection policy needs to decide whether a dropped
    /// socket is eligible for reconnection.
    pub fn locate_with_origin(&self, id: SocketId) -> Option<(&Socket, Origin)> {
        self.records.get(&id).map(|rec| (&rec.socket, rec.origin))
    }

    pub fn remove_later(&mut self, id: SocketId) {
        self.removable.push(id);
    }

    pub fn apply_remove(&mut self) {
        for id in self.removable.drain(..) {
            self.records.shift_remove(&id);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

impl Default for SocketPool {
    fn default() -> SocketPool {
        SocketPool::new()
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
        let server = crate::socket::from_accepted(accepted, crate::socket::to_v4(peer).unwrap()).unwrap();
        (client, server)
    }

    #[test]
    fn removal_is_deferred_until_apply_remove() {
        let mut pool = SocketPool::new();
        let (client, _server) = connected_pair();
        let id = SocketId(client.as_raw_fd());
        pool.add_connected(id, client);

        pool.remove_later(id);
        assert!(pool.locate(id).is_some(), "record must survive until apply_remove");

        pool.apply_remove();
        assert!(pool.locate(id).is_none());
    }

    #[test]
    fn origin_is_preserved() {
        let mut pool = SocketPool::new();
        let (client, server) = connected_pair();
        let client_id = SocketId(client.as_raw_fd());
        let server_id = SocketId(server.as_raw_fd());
        pool.add_connected(client_id, client);
        pool.add_accepted(server_id, server);

        assert_eq!(pool.locate_with_origin(client_id).unwrap().1, Origin::Connected);
        assert_eq!(pool.locate_with_origin(server_id).unwrap().1, Origin::Accepted);
    }
}
