//! Sleep deadline queue
//!
//! A fixed-capacity binary min-heap of `(deadline, process)` pairs, one entry
//! per process slot at most. The sleep timer path drains every entry whose
//! deadline has passed and re-arms the comparator for the next one.

use crate::process::{MAX_PROCESSES, ProcessId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sleeper {
    pub deadline_ms: u64,
    pub id: ProcessId,
}

impl Sleeper {
    const NONE: Self = Self {
        deadline_ms: 0,
        id: ProcessId::KERNEL,
    };

    /// Heap order: earliest deadline first, ties by id.
    fn before(&self, other: &Self) -> bool {
        (self.deadline_ms, self.id) < (other.deadline_ms, other.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFull;

pub struct DeadlineQueue {
    heap: [Sleeper; MAX_PROCESSES],
    len: usize,
}

impl DeadlineQueue {
    pub const fn new() -> Self {
        Self {
            heap: [Sleeper::NONE; MAX_PROCESSES],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Queue `id` to wake at `deadline_ms`, replacing any earlier entry.
    pub fn insert(&mut self, id: ProcessId, deadline_ms: u64) -> Result<(), QueueFull> {
        self.remove(id);
        if self.len == MAX_PROCESSES {
            return Err(QueueFull);
        }
        self.heap[self.len] = Sleeper { deadline_ms, id };
        self.len += 1;
        self.sift_up(self.len - 1);
        Ok(())
    }

    /// Drop the entry for `id`, if any. Returns whether one existed.
    pub fn remove(&mut self, id: ProcessId) -> bool {
        let Some(pos) = self.heap[..self.len].iter().position(|s| s.id == id) else {
            return false;
        };
        self.remove_at(pos);
        true
    }

    pub fn next_deadline(&self) -> Option<u64> {
        (self.len > 0).then(|| self.heap[0].deadline_ms)
    }

    /// Pop the earliest sleeper if its deadline is at or before `now_ms`.
    pub fn pop_expired(&mut self, now_ms: u64) -> Option<Sleeper> {
        if self.len == 0 || self.heap[0].deadline_ms > now_ms {
            return None;
        }
        let first = self.heap[0];
        self.remove_at(0);
        Some(first)
    }

    /// Iterate over every sleeper whose deadline has elapsed, removing it.
    pub fn drain_expired(&mut self, now_ms: u64) -> DrainExpired<'_> {
        DrainExpired { queue: self, now_ms }
    }

    fn remove_at(&mut self, pos: usize) {
        self.len -= 1;
        if pos == self.len {
            return;
        }
        self.heap[pos] = self.heap[self.len];
        self.sift_down(pos);
        self.sift_up(pos);
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.heap[pos].before(&self.heap[parent]) {
                break;
            }
            self.heap.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < self.len && self.heap[left].before(&self.heap[smallest]) {
                smallest = left;
            }
            if right < self.len && self.heap[right].before(&self.heap[smallest]) {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.heap.swap(pos, smallest);
            pos = smallest;
        }
    }
}

impl Default for DeadlineQueue {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DrainExpired<'a> {
    queue: &'a mut DeadlineQueue,
    now_ms: u64,
}

impl Iterator for DrainExpired<'_> {
    type Item = ProcessId;

    fn next(&mut self) -> Option<ProcessId> {
        self.queue.pop_expired(self.now_ms).map(|s| s.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: u16) -> ProcessId {
        ProcessId::new(n)
    }

    #[test]
    fn test_drains_in_deadline_order() {
        let mut q = DeadlineQueue::new();
        q.insert(pid(1), 300).unwrap();
        q.insert(pid(2), 100).unwrap();
        q.insert(pid(3), 200).unwrap();

        assert_eq!(q.next_deadline(), Some(100));
        let woke: Vec<_> = q.drain_expired(250).collect();
        assert_eq!(woke, [pid(2), pid(3)]);
        assert_eq!(q.next_deadline(), Some(300));
    }

    #[test]
    fn test_deadline_is_inclusive() {
        let mut q = DeadlineQueue::new();
        q.insert(pid(1), 100).unwrap();
        assert_eq!(q.drain_expired(99).count(), 0);
        assert_eq!(q.drain_expired(100).collect::<Vec<_>>(), [pid(1)]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_remove_keeps_heap_order() {
        let mut q = DeadlineQueue::new();
        for (i, d) in [50, 10, 40, 20, 30].into_iter().enumerate() {
            q.insert(pid(i as u16 + 1), d).unwrap();
        }
        assert!(q.remove(pid(2)));
        assert!(!q.remove(pid(2)));

        let order: Vec<_> = q.drain_expired(u64::MAX).collect();
        assert_eq!(order, [pid(4), pid(5), pid(3), pid(1)]);
    }

    #[test]
    fn test_reinsert_replaces() {
        let mut q = DeadlineQueue::new();
        q.insert(pid(1), 500).unwrap();
        q.insert(pid(1), 100).unwrap();
        assert_eq!(q.len(), 1);
        assert_eq!(q.next_deadline(), Some(100));
    }

    #[test]
    fn test_capacity() {
        let mut q = DeadlineQueue::new();
        for i in 0..MAX_PROCESSES {
            q.insert(pid(i as u16 + 1), i as u64).unwrap();
        }
        assert_eq!(q.insert(pid(99), 0), Err(QueueFull));
    }
}
