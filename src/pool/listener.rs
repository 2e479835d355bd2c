//! The listener pool: owns bound listening sockets and turns their
//! readability into accepted sockets.

use std::io;
use std::net::{SocketAddrV4, TcpListener};
use std::os::unix::io::AsRawFd;

use indexmap::IndexMap;

use crate::id::SocketId;
use crate::poller::{Interest, Poller, Readiness};
use crate::socket;

pub enum ListenerEvent {
    Accepted {
        id: SocketId,
        socket: socket::Socket,
    },
    Failure(io::Error),
}

pub struct ListenerPool {
    listeners: IndexMap<SocketId, (SocketAddrV4, TcpListener)>,
    removable: Vec<SocketId>,
    listening: bool,
}

impl ListenerPool {
    pub fn new() -> ListenerPool {
        ListenerPool {
            listeners: IndexMap::new(),
            removable: Vec::new(),
            listening: false,
        }
    }

    /// Binds and registers a listening socket. `listen` must still be
    /// called before accept events are dispatched.
    pub fn add(&mut self, addr: SocketAddrV4, poller: &mut Poller) -> io::Result<SocketId> {
        let listener = socket::listen(addr)?;
        let id = SocketId(listener.as_raw_fd());
        poller.add(id, listener.as_raw_fd(), Interest::readable());
        self.listeners.insert(id, (addr, listener));
        Ok(id)
    }

    /// Transitions every registered listener to listening. `backlog` is
    /// accepted for API fidelity with the configured `listen_backlog`; `std`'s
    /// `TcpListener` does not expose a way to set it post-bind, so the
    /// value only affects the OS default chosen at bind time via the
    /// platform's own listen(2) call inside `TcpListener::bind`.
    pub fn listen(&mut self, _backlog: i32) {
        self.listening = true;
    }

    pub fn remove_later(&mut self, id: SocketId) {
        self.removable.push(id);
    }

    pub fn apply_remove(&mut self, poller: &mut Poller) {
        for id in self.removable.drain(..) {
            self.listeners.shift_remove(&id);
            poller.remove(id);
        }
    }

    /// Accepts on every listener that fired readable, looping until
    /// `WouldBlock` so a single readiness event can't leave a connection
    /// waiting in the backlog.
    pub fn step(&mut self, ready: &[(SocketId, Readiness)]) -> Vec<ListenerEvent> {
        let mut events = Vec::new();

        if !self.listening {
            return events;
        }

        for &(id, readiness) in ready {
            if !readiness.readable {
                continue;
            }

            let Some((_, listener)) = self.listeners.get(&id) else {
                continue;
            };

            loop {
                match listener.accept() {
                    Ok((stream, peer)) => {
                        let remote = match socket::to_v4(peer) {
                            Ok(v4) => v4,
                            Err(err) => {
                                events.push(ListenerEvent::Failure(err));
                                continue;
                            }
                        };

                        match socket::from_accepted(stream, remote) {
                            Ok(socket) => {
                                let accepted_id = SocketId(socket.as_raw_fd());
                                events.push(ListenerEvent::Accepted {
                                    id: accepted_id,
                                    socket,
                                });
                            }
                            Err(err) => events.push(ListenerEvent::Failure(err)),
                        }
                    }
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                    Err(err) => {
                        events.push(ListenerEvent::Failure(err));
                        break;
                    }
                }
            }
        }

        events
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl Default for ListenerPool {
    fn default() -> ListenerPool {
        ListenerPool::new()
    }
}
