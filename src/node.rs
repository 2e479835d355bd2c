//! The node orchestrator: wires the pools, the handshake processor, the
//! heartbeat scheduler, and the reconnection policy into one cooperative
//! event engine.
//!
//! One observer trait plus a boxed [`ReconnectionPolicy`] cover everything
//! an embedder can plug in at runtime; everything else is fixed wiring
//! between the pools.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddrV4;
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::config::Config;
use crate::error::Error;
use crate::frame::Frame;
use crate::handshake::{HandshakeEvent, HandshakeProcessor, HandshakeVerdict};
use crate::heartbeat::HeartbeatScheduler;
use crate::id::{NodeId, SocketId};
use crate::input::{InputProcessor, Routed};
use crate::pool::connecting::{ConnectingEvent, ConnectingPool};
use crate::pool::listener::{ListenerEvent, ListenerPool};
use crate::pool::reader::{ReaderEvent, ReaderPool};
use crate::pool::socket::SocketPool;
use crate::pool::writer::WriterPool;
use crate::poller::{Interest, Poller};
use crate::reconnect::ReconnectionPolicy;
use crate::socket::Origin;

/// Callbacks the embedding application implements to observe the node.
///
/// One trait covers every pool's events; every method has a no-op default
/// so an embedder only overrides what it cares about.
pub trait NodeObserver {
    fn on_failure(&mut self, _id: SocketId, _err: &Error) {}
    fn on_node_ready(&mut self, _peer: NodeId) {}
    fn on_message(&mut self, _peer: NodeId, _tag: u8, _payload: Vec<u8>) {}
    fn on_heartbeat(&mut self, _peer: NodeId) {}
}

/// The per-process event engine for one mesh participant.
pub struct Node<O: NodeObserver> {
    id: NodeId,
    config: Config,
    poller: Poller,
    listener_pool: ListenerPool,
    connecting_pool: ConnectingPool,
    reader_pool: ReaderPool,
    writer_pool: WriterPool,
    socket_pool: SocketPool,
    handshake: HandshakeProcessor,
    heartbeat: HeartbeatScheduler,
    input: InputProcessor,
    reconnection: Box<dyn ReconnectionPolicy>,
    readers: HashMap<NodeId, SocketId>,
    writers: HashMap<NodeId, SocketId>,
    peers: HashMap<SocketId, NodeId>,
    observer: O,
}

impl<O: NodeObserver> Node<O> {
    pub fn new(
        id: NodeId,
        config: Config,
        reconnection: Box<dyn ReconnectionPolicy>,
        observer: O,
    ) -> Result<Node<O>, Error> {
        let config = config.validated()?;
        debug!("node: {}", id);

        let handshake = HandshakeProcessor::new(id, config.behind_nat, config.handshake_timeout);
        let heartbeat = HeartbeatScheduler::new(config.heartbeat_timeout);
        let writer_pool = WriterPool::new(config.chunk_size);

        Ok(Node {
            id,
            handshake,
            heartbeat,
            config,
            poller: Poller::new(),
            listener_pool: ListenerPool::new(),
            connecting_pool: ConnectingPool::new(),
            reader_pool: ReaderPool::new(),
            writer_pool,
            socket_pool: SocketPool::new(),
            input: InputProcessor::new(),
            reconnection,
            readers: HashMap::new(),
            writers: HashMap::new(),
            peers: HashMap::new(),
            observer,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn add_listener(&mut self, addr: SocketAddrV4) -> io::Result<SocketId> {
        self.listener_pool.add(addr, &mut self.poller)
    }

    pub fn listen(&mut self, backlog: i32) {
        self.listener_pool.listen(backlog);
    }

    /// Convenience over [`Node::listen`] using the configured
    /// `listen_backlog` (default 50).
    pub fn listen_default(&mut self) {
        let backlog = self.config.listen_backlog;
        self.listener_pool.listen(backlog);
    }

    /// Dispatches an outbound connection attempt. Returns `true` if the
    /// dial was accepted by the connecting pool; failures are reported
    /// through the observer, not the return value.
    pub fn connect_host(&mut self, addr: SocketAddrV4) -> bool {
        match self.connecting_pool.connect(addr, &mut self.poller) {
            crate::pool::connecting::ConnectOutcome::InProgress(_) => true,
            crate::pool::connecting::ConnectOutcome::Failure(err) => {
                error!("connect to {}: {}", addr, err);
                false
            }
        }
    }

    /// Enqueues application bytes for `id`. `priority` is accepted for call
    /// signature parity but unused: the writer account model has a single
    /// buffer per socket, so every priority shares the same lane.
    pub fn send(&mut self, id: SocketId, _priority: u8, tag: u8, payload: &[u8]) {
        let frame = Frame::Application {
            tag,
            payload: payload.to_vec(),
        };
        self.writer_pool.enqueue(id, &frame.encode());
    }

    pub fn readers(&self) -> &HashMap<NodeId, SocketId> {
        &self.readers
    }

    pub fn writers(&self) -> &HashMap<NodeId, SocketId> {
        &self.writers
    }

    pub fn writer_pool_remain_bytes(&self) -> u64 {
        self.writer_pool.remain_bytes()
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// The single cooperative advance. Blocking is concentrated
    /// entirely in the one `poller.poll` call; every pool afterward only
    /// processes readiness already observed.
    pub fn step(&mut self, budget: Duration) -> Result<(), Error> {
        let started = Instant::now();

        for addr in self.connecting_pool.due_dials() {
            self.connecting_pool.connect(addr, &mut self.poller);
        }

        let ready = self.poller.poll(budget).map_err(Error::Poller)?;

        let listener_events = self.listener_pool.step(&ready);
        for event in listener_events {
            self.handle_listener_event(event);
        }

        let connecting_events = self.connecting_pool.step(&ready);
        for event in connecting_events {
            self.handle_connecting_event(event);
        }

        for &(id, readiness) in &ready {
            if readiness.writable {
                self.writer_pool.mark_writable(id);
            }
        }

        let remaining = budget.saturating_sub(started.elapsed());
        let socket_pool = &mut self.socket_pool;
        let poller = &mut self.poller;
        let writer_events = self.writer_pool.send(remaining, poller, &mut |id| {
            socket_pool.locate_mut(id)
        });
        for event in writer_events {
            self.handle_writer_event(event);
        }

        let socket_pool = &mut self.socket_pool;
        let reader_events = self.reader_pool.step(&ready, &mut |id| {
            socket_pool.locate_mut(id)
        });
        for event in reader_events {
            self.handle_reader_event(event);
        }

        for event in self.handshake.step() {
            self.handle_handshake_event(event);
        }

        for id in self.heartbeat.step() {
            self.writer_pool.enqueue(id, &Frame::Heartbeat.encode());
        }

        self.connecting_pool.apply_remove(&mut self.poller);
        self.listener_pool.apply_remove(&mut self.poller);
        self.reader_pool.apply_remove();
        self.writer_pool.apply_remove(&mut self.poller);
        self.socket_pool.apply_remove();

        Ok(())
    }

    fn handle_listener_event(&mut self, event: ListenerEvent) {
        match event {
            ListenerEvent::Accepted { id, socket } => {
                debug!("socket accepted: #{}: {}", id, socket.remote_addr());
                self.poller
                    .add(id, std::os::unix::io::AsRawFd::as_raw_fd(&socket), Interest::readable());
                self.input.add(id);
                self.reader_pool.add(id);
                self.handshake.await_hello(id);
                self.socket_pool.add_accepted(id, socket);
            }
            ListenerEvent::Failure(err) => {
                error!("listener pool failure: {}", err);
            }
        }
    }

    fn handle_connecting_event(&mut self, event: ConnectingEvent) {
        match event {
            ConnectingEvent::Connected { id, socket } => {
                debug!("socket connected: #{}: {}", id, socket.remote_addr());
                self.poller.add(
                    id,
                    std::os::unix::io::AsRawFd::as_raw_fd(&socket),
                    Interest::readable(),
                );
                self.input.add(id);
                self.reader_pool.add(id);
                self.socket_pool.add_connected(id, socket);

                let hello = self.handshake.start(id);
                self.handle_handshake_event(hello);
            }
            ConnectingEvent::Refused { addr, reason } => {
                error!("connection refused: {}: {}, reconnecting", addr, reason);
                let timeout = self.reconnection.timeout();
                if timeout > Duration::ZERO {
                    self.connecting_pool.connect_timeout(timeout, addr);
                }
            }
        }
    }

    fn handle_writer_event(&mut self, event: crate::pool::writer::WriterEvent) {
        use crate::pool::writer::WriterEvent;

        match event {
            WriterEvent::BytesWritten { .. } => {}
            WriterEvent::Failure { id, error } => {
                error!("write to socket failure: #{}: {}", id, error);
                self.observer.on_failure(
                    id,
                    &Error::Socket {
                        id,
                        source: error,
                    },
                );
                self.schedule_reconnection(id);
                self.close_socket(id);
            }
        }
    }

    fn handle_reader_event(&mut self, event: ReaderEvent) {
        match event {
            ReaderEvent::Frames { id, frames } => {
                for frame in frames {
                    self.handle_frame(id, frame);
                }
            }
            ReaderEvent::Disconnected(id) => {
                debug!("socket disconnected: #{}", id);
                self.schedule_reconnection(id);
                self.close_socket(id);
            }
            ReaderEvent::Failure { id, error } => {
                error!("read from socket failure: #{}: {}", id, error);
                self.observer.on_failure(
                    id,
                    &Error::Socket {
                        id,
                        source: error,
                    },
                );
                self.close_socket(id);
            }
        }
    }

    fn handle_frame(&mut self, id: SocketId, frame: Frame) {
        if self.input.is_handshaking(id) {
            for event in self.handshake.on_frame(id, frame) {
                self.handle_handshake_event(event);
            }
            return;
        }

        match self.input.route(id, frame) {
            Routed::Handshake(frame) => {
                warn!("unexpected handshake frame on established socket #{}: {:?}", id, frame);
            }
            Routed::Heartbeat => {
                if let Some(&peer) = self.peers.get(&id) {
                    self.observer.on_heartbeat(peer);
                }
            }
            Routed::Application { tag, payload } => {
                if let Some(&peer) = self.peers.get(&id) {
                    self.observer.on_message(peer, tag, payload);
                }
            }
        }
    }

    fn handle_handshake_event(&mut self, event: HandshakeEvent) {
        match event {
            HandshakeEvent::Send { id, frame } => {
                self.writer_pool.enqueue(id, &frame.encode());
            }
            HandshakeEvent::Completed { id, remote, verdict } => match verdict {
                HandshakeVerdict::Unusable => {
                    debug!("handshake complete: socket #{} excluded for node: {}", id, remote);
                    self.close_socket(id);
                }
                HandshakeVerdict::Reader => {
                    // Two sockets opened simultaneously toward the same peer
                    // always agree on the role each end plays, since the
                    // canonical-writer rule is purely a function of the two
                    // node ids: both of this node's sockets to `remote`
                    // would independently compute "reader" here. The socket
                    // that completed its handshake first is kept canonical;
                    // any later one is the simultaneous-open duplicate and
                    // is closed (at most one reader per peer).
                    if self.readers.contains_key(&remote) {
                        debug!("handshake complete: socket #{} is a duplicate reader for node: {}, closing", id, remote);
                        self.close_socket(id);
                        return;
                    }
                    debug!("handshake complete: socket #{} is reader for node: {}", id, remote);
                    self.readers.insert(remote, id);
                    self.peers.insert(id, remote);
                    self.input.mark_handshake_done(id);
                    self.heartbeat.add(id);
                    self.observer.on_node_ready(remote);
                }
                HandshakeVerdict::Writer => {
                    if self.writers.contains_key(&remote) {
                        debug!("handshake complete: socket #{} is a duplicate writer for node: {}, closing", id, remote);
                        self.close_socket(id);
                        return;
                    }
                    debug!("handshake complete: socket #{} is writer for node: {}", id, remote);
                    self.writers.insert(remote, id);
                    self.peers.insert(id, remote);
                    self.input.mark_handshake_done(id);
                    self.heartbeat.add(id);
                    self.observer.on_node_ready(remote);
                }
            },
            HandshakeEvent::Expired(id) => {
                warn!("handshake expired for socket: #{}", id);
                self.close_socket(id);
            }
            HandshakeEvent::Failure { id, message } => {
                error!("{}", message);
                self.observer.on_failure(id, &Error::Protocol { id, message });
                self.close_socket(id);
            }
        }
    }

    fn schedule_reconnection(&mut self, id: SocketId) {
        let timeout = self.reconnection.timeout();
        if timeout <= Duration::ZERO {
            return;
        }

        if let Some((socket, origin)) = self.socket_pool.locate_with_origin(id) {
            if origin == Origin::Connected {
                self.connecting_pool.connect_timeout(timeout, socket.remote_addr());
            }
        }
    }

    fn close_socket(&mut self, id: SocketId) {
        self.handshake.cancel(id);
        self.heartbeat.remove(id);
        self.input.remove(id);
        self.reader_pool.remove_later(id);
        self.writer_pool.remove_later(id);
        self.socket_pool.remove_later(id);
        self.peers.remove(&id);
        self.readers.retain(|_, sid| *sid != id);
        self.writers.retain(|_, sid| *sid != id);
    }
}
