//! The input processor: stateless routing of decoded frames to the
//! handshake processor, heartbeat liveness, or the application callback.
//!
//! Deserialization itself (bytes → frames, leaving a partial trailing frame)
//! happens in [`crate::pool::reader`] as frames are drained off the wire;
//! this module only classifies an already-decoded [`Frame`] by its tag and
//! says where it belongs, without re-parsing bytes a second time.

use indexmap::IndexSet;

use crate::frame::Frame;
use crate::id::SocketId;

/// Where a decoded frame should be routed.
pub enum Routed {
    Handshake(Frame),
    /// A HEARTBEAT frame on an established socket; carries no payload and
    /// requires no action beyond the reader pool already having observed
    /// the socket as alive.
    Heartbeat,
    Application { tag: u8, payload: Vec<u8> },
}

/// Tracks which sockets are still mid-handshake so a frame can be routed
/// without the caller re-deriving that state on every call.
pub struct InputProcessor {
    handshaking: IndexSet<SocketId>,
}

impl InputProcessor {
    pub fn new() -> InputProcessor {
        InputProcessor {
            handshaking: IndexSet::new(),
        }
    }

    pub fn add(&mut self, id: SocketId) {
        self.handshaking.insert(id);
    }

    pub fn mark_handshake_done(&mut self, id: SocketId) {
        self.handshaking.shift_remove(&id);
    }

    pub fn remove(&mut self, id: SocketId) {
        self.handshaking.shift_remove(&id);
    }

    /// Classifies one decoded frame arriving on `id`.
    pub fn route(&self, id: SocketId, frame: Frame) -> Routed {
        match frame {
            Frame::Hello { .. } | Frame::Ack { .. } => Routed::Handshake(frame),
            Frame::Heartbeat => {
                let _ = id;
                Routed::Heartbeat
            }
            Frame::Application { tag, payload } => Routed::Application { tag, payload },
        }
    }

    pub fn is_handshaking(&self, id: SocketId) -> bool {
        self.handshaking.contains(&id)
    }
}

impl Default for InputProcessor {
    fn default() -> InputProcessor {
        InputProcessor::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::NodeId;

    #[test]
    fn hello_and_ack_route_to_handshake() {
        let proc = InputProcessor::new();
        let id = SocketId(1);

        let hello = Frame::Hello {
            node_id: NodeId::new(1),
            behind_nat: false,
        };
        assert!(matches!(proc.route(id, hello), Routed::Handshake(_)));
    }

    #[test]
    fn heartbeat_routes_to_heartbeat() {
        let proc = InputProcessor::new();
        assert!(matches!(proc.route(SocketId(1), Frame::Heartbeat), Routed::Heartbeat));
    }

    #[test]
    fn application_frame_routes_with_tag_and_payload() {
        let proc = InputProcessor::new();
        let frame = Frame::Application {
            tag: 0x42,
            payload: b"hi".to_vec(),
        };
        match proc.route(SocketId(1), frame) {
            Routed::Application { tag, payload } => {
                assert_eq!(tag, 0x42);
                assert_eq!(payload, b"hi");
            }
            _ => panic!("expected Application"),
        }
    }
}
