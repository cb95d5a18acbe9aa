// [libs/netmon-scheduler/src/state.rs]
//! The Scheduler's live cache: a min-heap of poll deadlines plus the map
//! of monitors it references. Both live behind one mutex — see
//! `Scheduler`'s `state` field — and the heap may carry stale items for
//! monitors already removed from the map (lazy deletion on pop).

use netmon_protocol::{Monitor, Protocol, TypedCredential};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct HeapItem {
    pub monitor_id: Uuid,
    pub deadline: Instant,
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap`, a max-heap, pops the earliest deadline first.
        other.deadline.cmp(&self.deadline)
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub struct ScheduledMonitor {
    pub monitor: Monitor,
    pub credential_ciphertext: String,
    pub credential_protocol: Protocol,
    pub decrypted_credential: Option<TypedCredential>,
    pub consecutive_failures: u32,
    pub is_polling: bool,
    pub next_poll_deadline: Instant,
}

#[derive(Default)]
pub struct SchedulerState {
    pub heap: BinaryHeap<HeapItem>,
    pub monitors: HashMap<Uuid, ScheduledMonitor>,
}
