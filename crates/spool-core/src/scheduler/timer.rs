//! Deadline-ordered heap of sleeping tasks
//!
//! Entries are keyed by (deadline, sequence). The sequence number grows with
//! every insertion, so two sleeps with the same deadline fire in the order
//! they were scheduled.

use crate::clock::Clock;
use crate::scheduler::TaskId;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Longest sleep actually scheduled, about a century
pub const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Entry in the timer heap
#[derive(Debug)]
struct TimerEntry {
    /// When to wake the task
    deadline: Instant,
    /// Insertion order, breaks deadline ties
    sequence: u64,
    task: TaskId,
}

// Reverse ordering for min-heap (earliest deadline, then lowest sequence)
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}

impl Eq for TimerEntry {}

/// Min-heap of sleeping tasks
pub struct TimerHeap {
    heap: BinaryHeap<TimerEntry>,
    sequence: u64,
    clock: Rc<dyn Clock>,
}

impl TimerHeap {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            heap: BinaryHeap::new(),
            sequence: 0,
            clock,
        }
    }

    /// Put `task` to sleep for `delay`; returns its deadline.
    ///
    /// Delays past what `Instant` can represent are clamped to [`FAR_FUTURE`].
    pub fn schedule(&mut self, delay: Duration, task: TaskId) -> Instant {
        let now = self.clock.now();
        let deadline = now
            .checked_add(delay)
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        self.schedule_at(deadline, task);
        deadline
    }

    /// Put `task` to sleep until `deadline`
    pub fn schedule_at(&mut self, deadline: Instant, task: TaskId) {
        self.sequence += 1;
        self.heap.push(TimerEntry {
            deadline,
            sequence: self.sequence,
            task,
        });
    }

    /// Earliest pending deadline
    pub fn peek_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.deadline)
    }

    /// Remove every entry whose deadline is at or before `now`, earliest first
    pub fn pop_expired(&mut self, now: Instant) -> Vec<TaskId> {
        let mut expired = Vec::new();
        while let Some(entry) = self.heap.peek() {
            if entry.deadline > now {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                expired.push(entry.task);
            }
        }
        expired
    }

    /// Drop every timer held by `task`; returns whether any was found
    pub fn cancel(&mut self, task: TaskId) -> bool {
        let before = self.heap.len();
        self.heap.retain(|e| e.task != task);
        self.heap.len() != before
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl std::fmt::Debug for TimerHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHeap")
            .field("pending", &self.heap.len())
            .field("next", &self.peek_deadline())
            .finish()
    }
}
