//! The readiness poller.
//!
//! Built directly on `libc::poll`, the intersection of what `select`,
//! `poll`, and `epoll` can all provide. A single `Poller` distinguishes
//! connecting, readable, and writable interest on level-triggered
//! semantics; callers re-register interest explicitly (there is no
//! edge-triggered "drain until `WouldBlock`" discipline here).

use std::os::unix::io::RawFd;
use std::time::Duration;
use std::{cmp, fmt, io};

use indexmap::IndexMap;

use crate::id::SocketId;

/// Interest bits a caller may register for a socket.
///
/// `CONNECTING` and `WRITABLE` both translate to `POLLOUT` at the syscall
/// level (a connecting socket becomes writable once the connection
/// resolves); the bit is kept distinct here purely so a caller can tell,
/// from the returned [`Readiness`], which disposition it was waiting on.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct Interest(u8);

const CONNECTING: u8 = 0b001;
const READABLE: u8 = 0b010;
const WRITABLE: u8 = 0b100;

impl Interest {
    #[inline]
    pub fn empty() -> Interest {
        Interest(0)
    }

    #[inline]
    pub fn connecting() -> Interest {
        Interest(CONNECTING)
    }

    #[inline]
    pub fn readable() -> Interest {
        Interest(READABLE)
    }

    #[inline]
    pub fn writable() -> Interest {
        Interest(WRITABLE)
    }

    #[inline]
    pub fn is_connecting(self) -> bool {
        self.0 & CONNECTING != 0
    }

    #[inline]
    pub fn is_readable(self) -> bool {
        self.0 & READABLE != 0
    }

    #[inline]
    pub fn is_writable(self) -> bool {
        self.0 & WRITABLE != 0
    }

    #[inline]
    fn wants_pollout(self) -> bool {
        self.is_connecting() || self.is_writable()
    }

    #[inline]
    fn without_writable(self) -> Interest {
        Interest(self.0 & !WRITABLE)
    }
}

impl std::ops::BitOr for Interest {
    type Output = Interest;

    #[inline]
    fn bitor(self, other: Interest) -> Interest {
        Interest(self.0 | other.0)
    }
}

impl std::ops::BitOrAssign for Interest {
    #[inline]
    fn bitor_assign(&mut self, other: Interest) {
        self.0 |= other.0;
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let mut dbg = fmt.debug_struct("Interest");
        dbg.field("connecting", &self.is_connecting());
        dbg.field("readable", &self.is_readable());
        dbg.field("writable", &self.is_writable());
        dbg.finish()
    }
}

/// The readiness reported back for one registered id.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    pub connecting: bool,
    pub error: bool,
    pub hangup: bool,
}

impl Readiness {
    pub fn is_empty(self) -> bool {
        !(self.readable || self.writable || self.connecting || self.error || self.hangup)
    }
}

struct Registration {
    fd: RawFd,
    interest: Interest,
}

/// Multiplexed readiness poller shared by the connecting, listener, reader
/// and writer pools.
pub struct Poller {
    registrations: IndexMap<SocketId, Registration>,
}

impl Poller {
    pub fn new() -> Poller {
        Poller {
            registrations: IndexMap::new(),
        }
    }

    pub fn add(&mut self, id: SocketId, fd: RawFd, interest: Interest) {
        self.registrations.insert(id, Registration { fd, interest });
    }

    pub fn remove(&mut self, id: SocketId) {
        self.registrations.shift_remove(&id);
    }

    pub fn contains(&self, id: SocketId) -> bool {
        self.registrations.contains_key(&id)
    }

    /// Re-arms a socket for a writable-readiness notification after an
    /// `again`/`overflow` send result.
    pub fn wait_for_write(&mut self, id: SocketId) {
        if let Some(reg) = self.registrations.get_mut(&id) {
            reg.interest |= Interest::writable();
        }
    }

    /// Clears writable interest once a socket's output buffer has drained,
    /// so a fully-flushed writer doesn't keep `POLLOUT` firing every cycle.
    pub fn stop_write(&mut self, id: SocketId) {
        if let Some(reg) = self.registrations.get_mut(&id) {
            reg.interest = reg.interest.without_writable();
        }
    }

    pub fn empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Blocks for up to `timeout`, returning the set of ids with new
    /// readiness. On interruption by a signal, returns an empty set.
    pub fn poll(&mut self, timeout: Duration) -> io::Result<Vec<(SocketId, Readiness)>> {
        if self.registrations.is_empty() {
            // `libc::poll` with zero fds just sleeps for `timeout`; do that
            // directly rather than paying for the syscall setup.
            std::thread::sleep(timeout);
            return Ok(Vec::new());
        }

        let mut pollfds: Vec<libc::pollfd> = self
            .registrations
            .values()
            .map(|reg| libc::pollfd {
                fd: reg.fd,
                events: interest_to_poll(reg.interest),
                revents: 0,
            })
            .collect();

        let millis = cmp::min(timeout.as_millis(), libc::c_int::MAX as u128) as libc::c_int;

        let ret = unsafe {
            libc::poll(
                pollfds.as_mut_ptr(),
                pollfds.len() as libc::nfds_t,
                millis,
            )
        };

        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Vec::new());
            }
            return Err(err);
        }

        let mut ready = Vec::with_capacity(ret as usize);

        for (pollfd, (id, reg)) in pollfds.iter().zip(self.registrations.iter()) {
            if pollfd.revents == 0 {
                continue;
            }

            let readiness = poll_to_readiness(pollfd.revents, reg.interest);
            if !readiness.is_empty() {
                ready.push((*id, readiness));
            }
        }

        Ok(ready)
    }
}

impl Default for Poller {
    fn default() -> Poller {
        Poller::new()
    }
}

fn interest_to_poll(interest: Interest) -> libc::c_short {
    let mut events = 0;

    if interest.is_readable() {
        events |= libc::POLLIN;
    }

    if interest.wants_pollout() {
        events |= libc::POLLOUT;
    }

    events as libc::c_short
}

fn poll_to_readiness(revents: libc::c_short, interest: Interest) -> Readiness {
    Readiness {
        readable: revents & libc::POLLIN != 0,
        writable: interest.is_writable() && revents & libc::POLLOUT != 0,
        connecting: interest.is_connecting() && revents & libc::POLLOUT != 0,
        error: revents & libc::POLLERR != 0,
        hangup: revents & libc::POLLHUP != 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::os::unix::io::AsRawFd;

    #[test]
    fn empty_poller_times_out_without_panicking() {
        let mut poller = Poller::new();
        let ready = poller.poll(Duration::from_millis(5)).unwrap();
        assert!(ready.is_empty());
    }

    #[test]
    fn connected_stream_reports_writable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).unwrap();
        let _accepted = listener.accept().unwrap();

        let mut poller = Poller::new();
        let id = SocketId(1);
        poller.add(id, stream.as_raw_fd(), Interest::writable());

        let ready = poller.poll(Duration::from_millis(200)).unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].0, id);
        assert!(ready[0].1.writable);
    }

    #[test]
    fn remove_stops_reporting_readiness() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let stream = TcpStream::connect(addr).unwrap();
        let _accepted = listener.accept().unwrap();

        let mut poller = Poller::new();
        let id = SocketId(1);
        poller.add(id, stream.as_raw_fd(), Interest::writable());
        poller.remove(id);

        assert!(poller.empty());
        let ready = poller.poll(Duration::from_millis(5)).unwrap();
        assert!(ready.is_empty());
    }
}
