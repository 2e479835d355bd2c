//! The connecting pool: paces outbound connection attempts and the
//! scheduled redials the reconnection policy asks for.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::net::SocketAddrV4;
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use indexmap::IndexMap;

use crate::id::SocketId;
use crate::poller::{Interest, Poller, Readiness};
use crate::socket::{self, Socket};

pub enum ConnectingEvent {
    Connected { id: SocketId, socket: Socket },
    Refused {
        addr: SocketAddrV4,
        reason: io::Error,
    },
}

/// Outcome of a dial attempt.
pub enum ConnectOutcome {
    InProgress(SocketId),
    Failure(io::Error),
}

struct ScheduledDial {
    deadline: Instant,
    addr: SocketAddrV4,
}

impl PartialEq for ScheduledDial {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}
impl Eq for ScheduledDial {}

// Reversed so `BinaryHeap` (a max-heap) behaves as a min-heap over deadlines.
impl Ord for ScheduledDial {
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.cmp(&self.deadline)
    }
}
impl PartialOrd for ScheduledDial {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct ConnectingPool {
    in_flight: IndexMap<SocketId, (SocketAddrV4, Socket)>,
    scheduled: BinaryHeap<ScheduledDial>,
    removable: Vec<SocketId>,
}

impl ConnectingPool {
    pub fn new() -> ConnectingPool {
        ConnectingPool {
            in_flight: IndexMap::new(),
            scheduled: BinaryHeap::new(),
            removable: Vec::new(),
        }
    }

    /// Starts a non-blocking dial. The socket is registered under
    /// `Interest::connecting` and its verdict arrives from a later call to
    /// [`ConnectingPool::step`].
    pub fn connect(&mut self, addr: SocketAddrV4, poller: &mut Poller) -> ConnectOutcome {
        match socket::connect(addr) {
            Ok(sock) => {
                let id = SocketId(sock.as_raw_fd());
                poller.add(id, sock.as_raw_fd(), Interest::connecting());
                self.in_flight.insert(id, (addr, sock));
                ConnectOutcome::InProgress(id)
            }
            Err(err) => ConnectOutcome::Failure(err),
        }
    }

    /// Schedules a fresh dial after `duration`; a zero duration is refused
    /// by the reconnection policy upstream, never reaching here.
    pub fn connect_timeout(&mut self, duration: Duration, addr: SocketAddrV4) {
        self.scheduled.push(ScheduledDial {
            deadline: Instant::now() + duration,
            addr,
        });
    }

    /// Pops every scheduled dial whose deadline has passed.
    pub fn due_dials(&mut self) -> Vec<SocketAddrV4> {
        let now = Instant::now();
        let mut due = Vec::new();

        while let Some(top) = self.scheduled.peek() {
            if top.deadline > now {
                break;
            }
            due.push(self.scheduled.pop().unwrap().addr);
        }

        due
    }

    pub fn remove_later(&mut self, id: SocketId) {
        self.removable.push(id);
    }

    pub fn apply_remove(&mut self, poller: &mut Poller) {
        for id in self.removable.drain(..) {
            self.in_flight.shift_remove(&id);
            poller.remove(id);
        }
    }

    /// Checks every in-flight socket that reported connecting-readiness for
    /// a completed connection, successful or refused.
    pub fn step(&mut self, ready: &[(SocketId, Readiness)]) -> Vec<ConnectingEvent> {
        let mut events = Vec::new();

        for &(id, readiness) in ready {
            if !readiness.connecting {
                continue;
            }

            let Some((addr, _)) = self.in_flight.get(&id) else {
                continue;
            };
            let addr = *addr;

            let (_, sock) = self.in_flight.get(&id).unwrap();
            match sock.take_connect_error() {
                Ok(None) => {
                    let (_, sock) = self.in_flight.shift_remove(&id).unwrap();
                    events.push(ConnectingEvent::Connected { id, socket: sock });
                }
                Ok(Some(err)) => {
                    self.in_flight.shift_remove(&id);
                    self.remove_later(id);
                    events.push(ConnectingEvent::Refused { addr, reason: err });
                }
                Err(err) => {
                    self.in_flight.shift_remove(&id);
                    self.remove_later(id);
                    events.push(ConnectingEvent::Refused { addr, reason: err });
                }
            }
        }

        events
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}

impl Default for ConnectingPool {
    fn default() -> ConnectingPool {
        ConnectingPool::new()
    }
}
