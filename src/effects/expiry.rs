use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::effects::instance::InstanceId;
use crate::entities::ids::EntityId;
use crate::entities::stats::ModifierId;
use crate::world::time::Timestamp;

/// Something that stops existing at a known time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpiryKey {
    Instance(InstanceId),
    Modifier { owner: EntityId, id: ModifierId },
}

#[derive(Clone, Copy, Debug)]
struct ExpiryEntry {
    key: ExpiryKey,
    due: Timestamp,
    seq: u64,
}

/// Min-heap by due time, then insertion order.
impl Ord for ExpiryEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ExpiryEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ExpiryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for ExpiryEntry {}

/// Heap of deadlines with an index for O(1) cancel. Cancelled or rescheduled
/// entries stay in the heap and are skipped when they surface.
#[derive(Debug, Default)]
struct ExpiryQueue {
    heap: BinaryHeap<ExpiryEntry>,
    index: HashMap<ExpiryKey, (Timestamp, u64)>,
    next_seq: u64,
}

impl ExpiryQueue {
    fn set(&mut self, key: ExpiryKey, due: Timestamp) -> bool {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        let existed = self.index.insert(key, (due, seq)).is_some();
        self.heap.push(ExpiryEntry { key, due, seq });
        existed
    }

    fn is_live(&self, entry: &ExpiryEntry) -> bool {
        self.index.get(&entry.key) == Some(&(entry.due, entry.seq))
    }

    fn pop_ready(&mut self, now: Timestamp) -> Option<ExpiryKey> {
        loop {
            let entry = *self.heap.peek()?;
            if !self.is_live(&entry) {
                self.heap.pop();
                continue;
            }
            if entry.due > now {
                return None;
            }
            self.heap.pop();
            self.index.remove(&entry.key);
            return Some(entry.key);
        }
    }

    fn next_due(&mut self) -> Option<Timestamp> {
        loop {
            let entry = *self.heap.peek()?;
            if self.is_live(&entry) {
                return Some(entry.due);
            }
            self.heap.pop();
        }
    }

    fn stop(&mut self, key: &ExpiryKey) -> Option<Timestamp> {
        self.index.remove(key).map(|(due, _)| due)
    }
}

/// Single time-ordered index shared by effect instances and stat modifiers,
/// swept by the scheduler.
#[derive(Debug, Default)]
pub struct ExpiryIndex {
    queue: Mutex<ExpiryQueue>,
}

impl ExpiryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Poisoning is ignored: every queue operation leaves heap and index consistent.
    fn queue(&self) -> MutexGuard<'_, ExpiryQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedules (or reschedules) `key`. Returns true if it was already scheduled.
    pub fn schedule(&self, key: ExpiryKey, due: Timestamp) -> bool {
        self.queue().set(key, due)
    }

    /// Forgets `key`, returning when it would have been due.
    pub fn cancel(&self, key: &ExpiryKey) -> Option<Timestamp> {
        self.queue().stop(key)
    }

    /// Removes and returns up to `limit` keys due at `now`, earliest first.
    pub fn pop_due(&self, now: Timestamp, limit: usize) -> Vec<ExpiryKey> {
        let mut queue = self.queue();
        let mut due = Vec::new();
        while due.len() < limit {
            match queue.pop_ready(now) {
                Some(key) => due.push(key),
                None => break,
            }
        }
        due
    }

    pub fn next_due(&self) -> Option<Timestamp> {
        self.queue().next_due()
    }

    pub fn due_at(&self, key: &ExpiryKey) -> Option<Timestamp> {
        self.queue().index.get(key).map(|(due, _)| *due)
    }

    pub fn len(&self) -> usize {
        self.queue().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
