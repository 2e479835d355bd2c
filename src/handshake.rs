//! The handshake processor: two-step HELLO/ACK role negotiation.
//!
//! Each socket settles into one of three outcomes (unusable / reader /
//! writer), decided by comparing the two nodes' ids under a fixed total
//! order so both ends always agree without further negotiation.

use std::time::{Duration, Instant};

use indexmap::IndexMap;

use crate::frame::Frame;
use crate::id::{NodeId, SocketId};

/// Outcome of a completed handshake on one socket.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HandshakeVerdict {
    /// Lost the simultaneous-open race; the socket should be closed.
    Unusable,
    Reader,
    Writer,
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum State {
    /// Waiting for the peer's HELLO (we accepted the connection).
    AwaitingHello,
    /// Sent our HELLO, waiting for the peer's ACK (we dialed out).
    AwaitingAck,
}

struct Entry {
    deadline: Instant,
    state: State,
}

pub enum HandshakeEvent {
    /// Send this frame on this socket (HELLO when starting, ACK on receipt).
    Send { id: SocketId, frame: Frame },
    Completed { id: SocketId, remote: NodeId, verdict: HandshakeVerdict },
    Expired(SocketId),
    Failure { id: SocketId, message: String },
}

/// Tracks per-socket handshake state and deadlines.
pub struct HandshakeProcessor {
    local_id: NodeId,
    behind_nat: bool,
    timeout: Duration,
    entries: IndexMap<SocketId, Entry>,
}

impl HandshakeProcessor {
    pub fn new(local_id: NodeId, behind_nat: bool, timeout: Duration) -> HandshakeProcessor {
        HandshakeProcessor {
            local_id,
            behind_nat,
            timeout,
            entries: IndexMap::new(),
        }
    }

    /// Starts a handshake on a socket we dialed out on: send HELLO and wait
    /// for ACK.
    pub fn start(&mut self, id: SocketId) -> HandshakeEvent {
        self.entries.insert(
            id,
            Entry {
                deadline: Instant::now() + self.timeout,
                state: State::AwaitingAck,
            },
        );
        HandshakeEvent::Send {
            id,
            frame: Frame::Hello {
                node_id: self.local_id,
                behind_nat: self.behind_nat,
            },
        }
    }

    /// Registers a socket we accepted, which waits for the peer's HELLO.
    pub fn await_hello(&mut self, id: SocketId) {
        self.entries.insert(
            id,
            Entry {
                deadline: Instant::now() + self.timeout,
                state: State::AwaitingHello,
            },
        );
    }

    pub fn cancel(&mut self, id: SocketId) {
        self.entries.shift_remove(&id);
    }

    pub fn contains(&self, id: SocketId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Feeds one decoded frame belonging to an in-progress handshake on
    /// `id`. Non-handshake frames (heartbeat, application) must not be
    /// routed here; see [`crate::input`].
    pub fn on_frame(&mut self, id: SocketId, frame: Frame) -> Vec<HandshakeEvent> {
        let Some(entry) = self.entries.get(&id) else {
            return Vec::new();
        };

        match (entry.state, frame) {
            (State::AwaitingHello, Frame::Hello { node_id, .. }) => {
                self.entries.shift_remove(&id);
                let is_writer_here = self.local_id.is_canonical_writer(node_id);
                let ack = HandshakeEvent::Send {
                    id,
                    frame: Frame::Ack {
                        node_id: self.local_id,
                        is_writer_here,
                    },
                };
                let verdict = if is_writer_here {
                    HandshakeVerdict::Writer
                } else {
                    HandshakeVerdict::Reader
                };
                vec![
                    ack,
                    HandshakeEvent::Completed {
                        id,
                        remote: node_id,
                        verdict,
                    },
                ]
            }
            (State::AwaitingAck, Frame::Ack { node_id, is_writer_here }) => {
                self.entries.shift_remove(&id);
                // `is_writer_here` is the remote's own verdict about itself;
                // our side recomputes independently from the same total
                // order, so a disagreement can only mean the well-known
                // simultaneous-open race on the *other* socket of the pair,
                // never on this one.
                let we_are_writer = self.local_id.is_canonical_writer(node_id);
                let _ = is_writer_here;
                let verdict = if we_are_writer {
                    HandshakeVerdict::Writer
                } else {
                    HandshakeVerdict::Reader
                };
                vec![HandshakeEvent::Completed {
                    id,
                    remote: node_id,
                    verdict,
                }]
            }
            (_, other) => {
                self.entries.shift_remove(&id);
                vec![HandshakeEvent::Failure {
                    id,
                    message: format!("unexpected frame during handshake: {:?}", other),
                }]
            }
        }
    }

    /// Closes out any handshake whose deadline has passed.
    pub fn step(&mut self) -> Vec<HandshakeEvent> {
        let now = Instant::now();
        let expired: Vec<SocketId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(&id, _)| id)
            .collect();

        for id in &expired {
            self.entries.shift_remove(id);
        }

        expired.into_iter().map(HandshakeEvent::Expired).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_id_becomes_writer_on_the_accepting_side() {
        let mut proc = HandshakeProcessor::new(NodeId::new(1), false, Duration::from_secs(5));
        let id = SocketId(7);
        proc.await_hello(id);

        let events = proc.on_frame(
            id,
            Frame::Hello {
                node_id: NodeId::new(2),
                behind_nat: false,
            },
        );

        let completed = events
            .iter()
            .find_map(|e| match e {
                HandshakeEvent::Completed { verdict, .. } => Some(*verdict),
                _ => None,
            })
            .unwrap();
        assert_eq!(completed, HandshakeVerdict::Writer);
    }

    #[test]
    fn higher_id_becomes_reader_on_the_dialing_side() {
        let mut proc = HandshakeProcessor::new(NodeId::new(2), false, Duration::from_secs(5));
        let id = SocketId(9);
        proc.start(id);

        let events = proc.on_frame(
            id,
            Frame::Ack {
                node_id: NodeId::new(1),
                is_writer_here: true,
            },
        );

        assert_eq!(events.len(), 1);
        match &events[0] {
            HandshakeEvent::Completed { verdict, .. } => {
                assert_eq!(*verdict, HandshakeVerdict::Reader)
            }
            _ => panic!("expected Completed"),
        }
    }

    #[test]
    fn expiry_fires_after_deadline() {
        let mut proc = HandshakeProcessor::new(NodeId::new(1), false, Duration::from_millis(1));
        let id = SocketId(3);
        proc.await_hello(id);
        std::thread::sleep(Duration::from_millis(5));

        let events = proc.step();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], HandshakeEvent::Expired(found) if found == id));
        assert!(!proc.contains(id));
    }
}
