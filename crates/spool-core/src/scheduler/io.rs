//! Per-descriptor I/O waiters

use crate::error::TaskError;
use crate::poller::{Direction, Interest, Poller, Readiness};
use crate::scheduler::TaskId;
use rustc_hash::FxHashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;
use tracing::debug;

/// At most one waiter per direction
#[derive(Debug, Default, Clone, Copy)]
struct Waiters {
    read: Option<TaskId>,
    write: Option<TaskId>,
}

impl Waiters {
    fn slot(&mut self, direction: Direction) -> &mut Option<TaskId> {
        match direction {
            Direction::Read => &mut self.read,
            Direction::Write => &mut self.write,
        }
    }

    fn is_empty(&self) -> bool {
        self.read.is_none() && self.write.is_none()
    }
}

/// Read and write waiters keyed by descriptor, plus the poller that
/// watches them.
pub struct IoWaitSets {
    waiters: FxHashMap<RawFd, Waiters>,
    poller: Box<dyn Poller>,
    /// Reused interest buffer
    interest: Vec<Interest>,
}

impl IoWaitSets {
    pub fn new(poller: Box<dyn Poller>) -> Self {
        Self {
            waiters: FxHashMap::default(),
            poller,
            interest: Vec::new(),
        }
    }

    /// Make `task` the waiter for `direction` on `fd`.
    ///
    /// Returns the waiter it replaced, if a different task held the slot.
    pub fn register(&mut self, fd: RawFd, direction: Direction, task: TaskId) -> Option<TaskId> {
        let slot = self.waiters.entry(fd).or_default().slot(direction);
        let previous = slot.replace(task);
        debug!(fd, ?direction, task = %task, "registered waiter");
        previous.filter(|p| *p != task)
    }

    /// Remove the waiter for `direction` on `fd`.
    ///
    /// A descriptor with no waiters left drops out of the polled set.
    pub fn unregister(&mut self, fd: RawFd, direction: Direction) -> Option<TaskId> {
        let waiters = self.waiters.get_mut(&fd)?;
        let task = waiters.slot(direction).take();
        if waiters.is_empty() {
            self.waiters.remove(&fd);
        }
        task
    }

    /// Remove every registration held by `task`
    pub fn unregister_task(&mut self, task: TaskId) -> bool {
        let mut found = false;
        self.waiters.retain(|_, w| {
            for slot in [&mut w.read, &mut w.write] {
                if *slot == Some(task) {
                    *slot = None;
                    found = true;
                }
            }
            !w.is_empty()
        });
        found
    }

    /// Whether `task` is registered on any descriptor
    pub fn contains_task(&self, task: TaskId) -> bool {
        self.waiters
            .values()
            .any(|w| w.read == Some(task) || w.write == Some(task))
    }

    /// Block for at most `timeout` until a registered descriptor is ready.
    pub fn poll(&mut self, timeout: Option<Duration>) -> io::Result<Readiness> {
        self.interest.clear();
        self.interest.extend(self.waiters.iter().map(|(fd, w)| Interest {
            fd: *fd,
            read: w.read.is_some(),
            write: w.write.is_some(),
        }));
        // Stable order keeps wakeups reproducible across runs
        self.interest.sort_unstable_by_key(|i| i.fd);
        self.poller.poll(&self.interest, timeout)
    }

    /// Unregister the waiters `readiness` signals and return them.
    ///
    /// Waiters on failed descriptors come back paired with the error they
    /// should be resumed with. A signal for a slot with no waiter is ignored.
    pub fn take_ready(&mut self, readiness: &Readiness) -> Vec<(TaskId, Option<TaskError>)> {
        let mut woken = Vec::new();
        for &fd in &readiness.failed {
            for direction in [Direction::Read, Direction::Write] {
                if let Some(task) = self.unregister(fd, direction) {
                    woken.push((task, Some(TaskError::DescriptorClosed(fd))));
                }
            }
        }
        for &fd in &readiness.readable {
            if let Some(task) = self.unregister(fd, Direction::Read) {
                woken.push((task, None));
            }
        }
        for &fd in &readiness.writable {
            if let Some(task) = self.unregister(fd, Direction::Write) {
                woken.push((task, None));
            }
        }
        woken
    }

    /// Number of descriptors in the polled set
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

impl std::fmt::Debug for IoWaitSets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoWaitSets")
            .field("waiters", &self.waiters)
            .finish_non_exhaustive()
    }
}
