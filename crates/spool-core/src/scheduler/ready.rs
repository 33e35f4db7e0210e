//! FIFO of runnable tasks

use crate::scheduler::TaskId;
use std::collections::VecDeque;

/// Strict FIFO of task handles ready to run.
///
/// Double enqueues are not suppressed; the scheduler never issues them.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    queue: VecDeque<TaskId>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task at the back
    pub fn enqueue(&mut self, task: TaskId) {
        self.queue.push_back(task);
    }

    /// Remove the oldest task
    pub fn dequeue(&mut self) -> Option<TaskId> {
        self.queue.pop_front()
    }

    /// Drop every entry for `task`; returns whether any was found
    pub fn remove(&mut self, task: TaskId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|t| *t != task);
        self.queue.len() != before
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let (a, b, c) = (TaskId::new(), TaskId::new(), TaskId::new());
        let mut q = ReadyQueue::new();
        assert!(q.is_empty());

        q.enqueue(a);
        q.enqueue(b);
        q.enqueue(c);
        assert_eq!(q.len(), 3);

        assert_eq!(q.dequeue(), Some(a));
        q.enqueue(a);
        assert_eq!(q.dequeue(), Some(b));
        assert_eq!(q.dequeue(), Some(c));
        assert_eq!(q.dequeue(), Some(a));
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn test_duplicates_kept_and_removed_together() {
        let (a, b) = (TaskId::new(), TaskId::new());
        let mut q = ReadyQueue::new();
        q.enqueue(a);
        q.enqueue(b);
        q.enqueue(a);
        assert_eq!(q.len(), 3);

        assert!(q.remove(a));
        assert!(!q.remove(a));
        assert_eq!(q.dequeue(), Some(b));
        assert!(q.is_empty());
    }
}
