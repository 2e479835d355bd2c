//! The heartbeat scheduler: a min-heap of per-socket deadlines that re-arms
//! itself after every firing.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use crate::id::SocketId;

const MAX_TIMEOUT_SECS: u64 = 86_400;

struct Scheduled {
    deadline: Instant,
    id: SocketId,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}
impl Eq for Scheduled {}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.cmp(&self.deadline)
    }
}
impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Schedules a liveness frame on every registered socket every `timeout`.
///
/// `remove` has to erase *all* entries for an id, not just the next one,
/// since `add` may have been called more than once for the same id across
/// reconnects before the stale entries drained.
pub struct HeartbeatScheduler {
    timeout: Duration,
    heap: BinaryHeap<Scheduled>,
    removed: std::collections::HashSet<SocketId>,
    live: std::collections::HashMap<SocketId, u32>,
}

impl HeartbeatScheduler {
    pub fn new(timeout: Duration) -> HeartbeatScheduler {
        let clamped = Duration::from_secs(timeout.as_secs().min(MAX_TIMEOUT_SECS));
        HeartbeatScheduler {
            timeout: clamped,
            heap: BinaryHeap::new(),
            removed: std::collections::HashSet::new(),
            live: std::collections::HashMap::new(),
        }
    }

    pub fn add(&mut self, id: SocketId) {
        self.removed.remove(&id);
        *self.live.entry(id).or_insert(0) += 1;
        self.heap.push(Scheduled {
            deadline: Instant::now() + self.timeout,
            id,
        });
    }

    /// Erases every pending entry for `id`.
    pub fn remove(&mut self, id: SocketId) {
        self.removed.insert(id);
        self.live.remove(&id);
    }

    /// Pops every entry whose deadline has passed, re-inserting each with a
    /// fresh deadline, and returns the ids that should receive a heartbeat
    /// frame this step.
    pub fn step(&mut self) -> Vec<SocketId> {
        let now = Instant::now();
        let mut due = Vec::new();

        while let Some(top) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let Scheduled { id, .. } = self.heap.pop().unwrap();

            if self.removed.contains(&id) || !self.live.contains_key(&id) {
                continue;
            }

            due.push(id);
            self.heap.push(Scheduled {
                deadline: now + self.timeout,
                id,
            });
        }

        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_entries_are_rearmed() {
        let mut sched = HeartbeatScheduler::new(Duration::from_millis(1));
        let id = SocketId(4);
        sched.add(id);

        std::thread::sleep(Duration::from_millis(5));
        let due = sched.step();
        assert_eq!(due, vec![id]);

        std::thread::sleep(Duration::from_millis(5));
        let due_again = sched.step();
        assert_eq!(due_again, vec![id]);
    }

    #[test]
    fn removed_socket_never_fires_again() {
        let mut sched = HeartbeatScheduler::new(Duration::from_millis(1));
        let id = SocketId(5);
        sched.add(id);
        sched.remove(id);

        std::thread::sleep(Duration::from_millis(5));
        assert!(sched.step().is_empty());
    }

    #[test]
    fn timeout_is_clamped_to_a_day() {
        let sched = HeartbeatScheduler::new(Duration::from_secs(999_999));
        assert_eq!(sched.timeout, Duration::from_secs(MAX_TIMEOUT_SECS));
    }
}
