//! The wire envelope shared by control and application frames.
//!
//! Control frames (HELLO, ACK, HEARTBEAT) have a fixed-size payload once the
//! tag byte is known. Application payloads are opaque to this crate; they
//! are carried as a tag byte followed
//! by a 4-byte network-order length and that many payload bytes, which is
//! enough for [`Decoder::decode`] to know where one frame ends without
//! understanding its contents.

use crate::id::NodeId;

pub const TAG_HELLO: u8 = 0x01;
pub const TAG_ACK: u8 = 0x02;
pub const TAG_HEARTBEAT: u8 = 0x03;

/// One fully decoded frame taken off a socket's input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Hello { node_id: NodeId, behind_nat: bool },
    Ack { node_id: NodeId, is_writer_here: bool },
    Heartbeat,
    Application { tag: u8, payload: Vec<u8> },
}

impl Frame {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::Hello { node_id, behind_nat } => {
                let mut out = Vec::with_capacity(18);
                out.push(TAG_HELLO);
                out.extend_from_slice(&node_id.to_bytes());
                out.push(*behind_nat as u8);
                out
            }
            Frame::Ack {
                node_id,
                is_writer_here,
            } => {
                let mut out = Vec::with_capacity(18);
                out.push(TAG_ACK);
                out.extend_from_slice(&node_id.to_bytes());
                out.push(*is_writer_here as u8);
                out
            }
            Frame::Heartbeat => vec![TAG_HEARTBEAT],
            Frame::Application { tag, payload } => {
                let mut out = Vec::with_capacity(5 + payload.len());
                out.push(*tag);
                out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
                out.extend_from_slice(payload);
                out
            }
        }
    }
}

/// Decodes as many whole frames as are present in `buf`, returning them
/// along with the number of bytes consumed. Bytes past the returned count
/// are an incomplete trailing frame and must be left in the caller's buffer.
pub fn decode(buf: &[u8]) -> (Vec<Frame>, usize) {
    let mut frames = Vec::new();
    let mut offset = 0;

    loop {
        match decode_one(&buf[offset..]) {
            Some((frame, len)) => {
                frames.push(frame);
                offset += len;
            }
            None => break,
        }
    }

    (frames, offset)
}

fn decode_one(buf: &[u8]) -> Option<(Frame, usize)> {
    let tag = *buf.first()?;

    match tag {
        TAG_HELLO => {
            if buf.len() < 18 {
                return None;
            }
            let mut id_bytes = [0u8; 16];
            id_bytes.copy_from_slice(&buf[1..17]);
            Some((
                Frame::Hello {
                    node_id: NodeId::from_bytes(id_bytes),
                    behind_nat: buf[17] != 0,
                },
                18,
            ))
        }
        TAG_ACK => {
            if buf.len() < 18 {
                return None;
            }
            let mut id_bytes = [0u8; 16];
            id_bytes.copy_from_slice(&buf[1..17]);
            Some((
                Frame::Ack {
                    node_id: NodeId::from_bytes(id_bytes),
                    is_writer_here: buf[17] != 0,
                },
                18,
            ))
        }
        TAG_HEARTBEAT => Some((Frame::Heartbeat, 1)),
        other => {
            if buf.len() < 5 {
                return None;
            }
            let mut len_bytes = [0u8; 4];
            len_bytes.copy_from_slice(&buf[1..5]);
            let len = u32::from_be_bytes(len_bytes) as usize;

            if buf.len() < 5 + len {
                return None;
            }

            Some((
                Frame::Application {
                    tag: other,
                    payload: buf[5..5 + len].to_vec(),
                },
                5 + len,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trips() {
        let frame = Frame::Hello {
            node_id: NodeId::new(42),
            behind_nat: true,
        };
        let bytes = frame.encode();
        let (frames, consumed) = decode(&bytes);
        assert_eq!(consumed, bytes.len());
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn ack_round_trips() {
        let frame = Frame::Ack {
            node_id: NodeId::new(7),
            is_writer_here: false,
        };
        let bytes = frame.encode();
        let (frames, consumed) = decode(&bytes);
        assert_eq!(consumed, bytes.len());
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn heartbeat_is_a_single_byte() {
        let bytes = Frame::Heartbeat.encode();
        assert_eq!(bytes, vec![TAG_HEARTBEAT]);
        let (frames, consumed) = decode(&bytes);
        assert_eq!(consumed, 1);
        assert_eq!(frames, vec![Frame::Heartbeat]);
    }

    #[test]
    fn application_frame_round_trips() {
        let frame = Frame::Application {
            tag: 0x10,
            payload: b"hello mesh".to_vec(),
        };
        let bytes = frame.encode();
        let (frames, consumed) = decode(&bytes);
        assert_eq!(consumed, bytes.len());
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn partial_trailing_frame_is_left_unconsumed() {
        let full = Frame::Heartbeat.encode();
        let mut buf = full.clone();
        buf.extend_from_slice(&[TAG_HELLO, 0, 0]); // incomplete HELLO

        let (frames, consumed) = decode(&buf);
        assert_eq!(frames, vec![Frame::Heartbeat]);
        assert_eq!(consumed, full.len());
    }

    #[test]
    fn multiple_frames_decode_in_one_pass() {
        let mut buf = Frame::Heartbeat.encode();
        buf.extend(Frame::Heartbeat.encode());
        buf.extend(Frame::Ack {
            node_id: NodeId::new(1),
            is_writer_here: true,
        }.encode());

        let (frames, consumed) = decode(&buf);
        assert_eq!(consumed, buf.len());
        assert_eq!(frames.len(), 3);
    }
}
