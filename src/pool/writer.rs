//! The writer pool: per-socket output buffering, MTU-sized chunked sends,
//! and flow control driven by poller writable events.
//!
//! One `account` per socket carries a cursor into its pending buffer and a
//! `writable` flag toggled by the poller; a flush pass walks the writable
//! accounts round-robin for the remaining budget.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use indexmap::IndexMap;

use crate::id::SocketId;
use crate::poller::Poller;
use crate::socket::Socket;

struct Account {
    writable: bool,
    chunk_size: u16,
    buffer: Vec<u8>,
    cursor: usize,
}

impl Account {
    fn new(chunk_size: u16) -> Account {
        Account {
            // Optimistic: every socket is tried immediately. Only a
            // `WouldBlock` send result ever clears this and arms a
            // poller writable-wait; a fresh account never preemptively
            // waits on one.
            writable: true,
            chunk_size,
            buffer: Vec::new(),
            cursor: 0,
        }
    }
}

pub enum WriterEvent {
    BytesWritten { id: SocketId, n: u64 },
    Failure { id: SocketId, error: io::Error },
}

/// Per-socket send buffering and round-robin flushing.
///
/// Accounts live in an [`IndexMap`] so a flush pass visits sockets in the
/// order they were first enqueued, giving every socket a fair share of a
/// bounded flush budget instead of always favoring the one with the lowest
/// id.
pub struct WriterPool {
    accounts: IndexMap<SocketId, Account>,
    removable: Vec<SocketId>,
    remain_bytes: u64,
    chunk_size: u16,
}

impl WriterPool {
    pub fn new(chunk_size: u16) -> WriterPool {
        WriterPool {
            accounts: IndexMap::new(),
            removable: Vec::new(),
            remain_bytes: 0,
            chunk_size,
        }
    }

    fn ensure_account(&mut self, id: SocketId) -> &mut Account {
        self.accounts
            .entry(id)
            .or_insert_with(|| Account::new(self.chunk_size))
    }

    pub fn add(&mut self, id: SocketId) {
        self.ensure_account(id);
    }

    pub fn remove_later(&mut self, id: SocketId) {
        self.removable.push(id);
    }

    pub fn apply_remove(&mut self, poller: &mut Poller) {
        for id in self.removable.drain(..) {
            self.accounts.shift_remove(&id);
            poller.remove(id);
        }
    }

    pub fn remain_bytes(&self) -> u64 {
        self.remain_bytes
    }

    /// Appends `data` to `id`'s output buffer. A first enqueue for a
    /// previously unknown id creates its account, optimistically writable
    /// until a send actually blocks.
    pub fn enqueue(&mut self, id: SocketId, data: &[u8]) {
        if data.is_empty() {
            return;
        }

        let acc = self.ensure_account(id);
        acc.buffer.extend_from_slice(data);
        self.remain_bytes += data.len() as u64;
    }

    /// Marks `id` writable after the poller reports `POLLOUT`.
    pub fn mark_writable(&mut self, id: SocketId) {
        if let Some(acc) = self.accounts.get_mut(&id) {
            acc.writable = true;
        }
    }

    /// Flushes every writable account's buffer for up to `budget`, sending
    /// MTU-sized chunks per round and absorbing `WouldBlock` as flow control
    /// rather than an error. A send that blocks arms a poller writable-wait
    /// for that socket; a buffer that fully drains clears it again, so an
    /// idle writer never keeps `POLLOUT` firing.
    pub fn send<'a>(
        &mut self,
        budget: Duration,
        poller: &mut Poller,
        locate: &mut dyn FnMut(SocketId) -> Option<&'a mut Socket>,
    ) -> Vec<WriterEvent> {
        let started = Instant::now();
        let mut events = Vec::new();

        loop {
            for (&id, acc) in self.accounts.iter_mut() {
                if !acc.writable {
                    continue;
                }

                if acc.cursor == acc.buffer.len() {
                    acc.buffer.clear();
                    acc.cursor = 0;
                    poller.stop_write(id);
                    continue;
                }

                let end = std::cmp::min(acc.cursor + acc.chunk_size as usize, acc.buffer.len());
                let chunk = &acc.buffer[acc.cursor..end];

                let Some(sock) = locate(id) else { continue };

                match sock.write(chunk) {
                    Ok(n) => {
                        if n > 0 {
                            self.remain_bytes -= n as u64;
                            acc.cursor += n;
                            events.push(WriterEvent::BytesWritten { id, n: n as u64 });
                        }
                        if acc.cursor == acc.buffer.len() {
                            acc.buffer.clear();
                            acc.cursor = 0;
                            poller.stop_write(id);
                        }
                    }
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                        acc.writable = false;
                        poller.wait_for_write(id);
                    }
                    Err(err) => {
                        self.removable.push(id);
                        events.push(WriterEvent::Failure { id, error: err });
                    }
                }
            }

            if started.elapsed() >= budget {
                break;
            }
            if !self.accounts.values().any(|acc| acc.writable && !acc.buffer.is_empty()) {
                break;
            }
        }

        events
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
