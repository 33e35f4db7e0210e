//! The scheduler loop

use crate::clock::{Clock, MonotonicClock};
use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, TaskError};
use crate::poller::{Direction, Poller, SysPoller};
use crate::scheduler::{IoWaitSets, ReadyQueue, RunOutcome, Task, TaskId, TaskState, TimerHeap};
use crate::unit::{call_after, call_once, Context, Requests, Suspend, Unit};
use crate::value::Value;
use rustc_hash::FxHashMap;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Total tasks submitted, including ones spawned by units
    pub tasks_spawned: u64,

    /// Tasks whose outermost unit completed
    pub tasks_completed: u64,

    /// Tasks discarded because of an unhandled error or misuse
    pub tasks_failed: u64,

    /// Tasks removed by cancellation or displaced as I/O waiters
    pub tasks_cancelled: u64,

    /// Blocking polls performed
    pub polls: u64,

    /// Sleeping tasks woken by their deadline
    pub timers_fired: u64,

    /// Waiting tasks woken by descriptor readiness
    pub io_wakeups: u64,
}

/// Single-threaded cooperative scheduler.
///
/// Owns every live task. A task is referenced by at most one of the ready
/// queue, the timer heap, and the I/O wait sets; finished tasks are dropped
/// on the spot.
pub struct Scheduler {
    config: SchedulerConfig,
    clock: Rc<dyn Clock>,
    ready: ReadyQueue,
    timers: TimerHeap,
    io: IoWaitSets,
    tasks: FxHashMap<TaskId, Task>,
    stats: SchedulerStats,
}

impl Scheduler {
    /// Create a scheduler on the host clock and `poll(2)`
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self::with_driver(config, SysPoller::new(), MonotonicClock)
    }

    /// Create a scheduler on a custom readiness primitive and clock
    pub fn with_driver(
        config: SchedulerConfig,
        poller: impl Poller + 'static,
        clock: impl Clock + 'static,
    ) -> Self {
        let clock: Rc<dyn Clock> = Rc::new(clock);
        Self {
            config,
            timers: TimerHeap::new(clock.clone()),
            clock,
            ready: ReadyQueue::new(),
            io: IoWaitSets::new(Box::new(poller)),
            tasks: FxHashMap::default(),
            stats: SchedulerStats::default(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Submit a unit of work as a new task
    pub fn add_task(&mut self, unit: impl Unit + 'static) -> Result<TaskId, SchedulerError> {
        self.add_boxed(Box::new(unit))
    }

    pub fn add_boxed(&mut self, unit: Box<dyn Unit>) -> Result<TaskId, SchedulerError> {
        if let Some(max) = self.config.max_tasks {
            if self.tasks.len() >= max {
                return Err(SchedulerError::TaskLimit(max));
            }
        }
        let id = TaskId::new();
        self.admit(id, unit);
        Ok(id)
    }

    /// Run `f` once, as soon as the loop gets to it
    pub fn call_soon<F>(&mut self, f: F) -> Result<TaskId, SchedulerError>
    where
        F: FnOnce(&mut Context<'_>) + 'static,
    {
        self.add_task(call_once(f))
    }

    /// Run `f` once, after `delay`
    pub fn call_later<F>(&mut self, delay: Duration, f: F) -> Result<TaskId, SchedulerError>
    where
        F: FnOnce(&mut Context<'_>) + 'static,
    {
        self.add_task(call_after(delay, f))
    }

    fn admit(&mut self, id: TaskId, unit: Box<dyn Unit>) {
        let task = Task::with_id(id, unit).with_max_depth(self.config.max_delegation_depth);
        debug!(task = %id, name = task.name(), "task added");
        self.tasks.insert(id, task);
        self.ready.enqueue(id);
        self.stats.tasks_spawned += 1;
    }

    /// Remove a task from every container without notifying it.
    ///
    /// Returns false if the task is not live.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        if self.tasks.remove(&id).is_none() {
            return false;
        }
        self.ready.remove(id);
        self.timers.cancel(id);
        self.io.unregister_task(id);
        self.stats.tasks_cancelled += 1;
        debug!(task = %id, "task cancelled");
        true
    }

    /// State of a live task; `None` once it has finished or been dropped
    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.tasks.get(&id).map(Task::state)
    }

    /// Number of live tasks
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// True when nothing is ready, sleeping, or waiting
    pub fn is_idle(&self) -> bool {
        self.ready.is_empty() && self.timers.is_empty() && self.io.is_empty()
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Run until every task has finished and nothing is sleeping or waiting.
    ///
    /// Returns immediately when idle. Fails only if the readiness primitive
    /// fails; task errors never end the loop.
    pub fn run(&mut self) -> Result<SchedulerStats, SchedulerError> {
        loop {
            while let Some(id) = self.ready.dequeue() {
                self.run_task(id);
            }

            if self.timers.is_empty() && self.io.is_empty() {
                break;
            }

            let now = self.clock.now();
            let mut timeout = self
                .timers
                .peek_deadline()
                .map(|deadline| deadline.saturating_duration_since(now));
            if let Some(cap) = self.config.max_poll_interval() {
                timeout = Some(timeout.map_or(cap, |t| t.min(cap)));
            }

            debug!(?timeout, descriptors = self.io.len(), timers = self.timers.len(), "polling");
            let readiness = self.io.poll(timeout).map_err(SchedulerError::Poll)?;
            self.stats.polls += 1;

            for (id, error) in self.io.take_ready(&readiness) {
                self.stats.io_wakeups += 1;
                self.wake(id, error);
            }
            for id in self.timers.pop_expired(self.clock.now()) {
                self.stats.timers_fired += 1;
                self.wake(id, None);
            }
        }

        // Live tasks here are suspended on nothing and can never resume
        if !self.tasks.is_empty() {
            warn!(stranded = self.tasks.len(), "dropping tasks with no pending wakeup");
            self.tasks.clear();
        }
        Ok(self.stats.clone())
    }

    fn wake(&mut self, id: TaskId, error: Option<TaskError>) {
        let Some(task) = self.tasks.get_mut(&id) else {
            return;
        };
        trace!(task = %id, error = error.is_some(), "woken");
        if let Some(error) = error {
            task.set_resume(Err(error));
        }
        task.set_state(TaskState::Ready);
        self.ready.enqueue(id);
    }

    fn run_task(&mut self, id: TaskId) {
        let capacity = self
            .config
            .max_tasks
            .map(|max| max.saturating_sub(self.tasks.len()));
        let mut requests = Requests::with_capacity(capacity);

        let Some(task) = self.tasks.get_mut(&id) else {
            return;
        };
        let input = task.take_resume().unwrap_or(Ok(Value::Nil));
        let outcome = {
            let mut cx = Context::new(Some(id), &*self.clock, &mut requests);
            task.run(input, &mut cx)
        };

        // Spawned tasks queue ahead of the spawner's own re-entry
        for (child, unit) in requests.spawned.drain(..) {
            self.admit(child, unit);
        }
        self.dispatch(id, outcome);
        for target in requests.cancelled.drain(..) {
            self.cancel(target);
        }
    }

    fn dispatch(&mut self, id: TaskId, outcome: RunOutcome) {
        match outcome {
            RunOutcome::Suspended(Suspend::Sleep(delay)) => {
                self.set_state(id, TaskState::Sleeping);
                self.timers.schedule(delay, id);
            }
            RunOutcome::Suspended(Suspend::Readable(fd)) => self.wait_io(id, fd, Direction::Read),
            RunOutcome::Suspended(Suspend::Writable(fd)) => self.wait_io(id, fd, Direction::Write),
            RunOutcome::Suspended(Suspend::Yield) => {
                self.set_state(id, TaskState::Ready);
                self.ready.enqueue(id);
            }
            RunOutcome::Yielded(value) => {
                trace!(task = %id, ?value, "value passed through to scheduler");
                self.set_state(id, TaskState::Ready);
                self.ready.enqueue(id);
            }
            RunOutcome::Finished(value) => {
                if let Some(task) = self.tasks.remove(&id) {
                    info!(task = %id, name = task.name(), ?value, "task terminated");
                }
                self.stats.tasks_completed += 1;
            }
            RunOutcome::Failed(error) => self.fail(id, error),
        }
    }

    fn wait_io(&mut self, id: TaskId, fd: RawFd, direction: Direction) {
        if fd < 0 {
            self.fail(
                id,
                TaskError::misuse(format!("wait on invalid descriptor {fd}")),
            );
            return;
        }
        let state = match direction {
            Direction::Read => TaskState::WaitingRead,
            Direction::Write => TaskState::WaitingWrite,
        };
        self.set_state(id, state);
        if let Some(displaced) = self.io.register(fd, direction, id) {
            // Last registration wins; the previous waiter can never be woken
            warn!(fd, ?direction, task = %displaced, by = %id, "waiter displaced");
            self.cancel(displaced);
        }
    }

    fn fail(&mut self, id: TaskId, error: TaskError) {
        let name = self
            .tasks
            .remove(&id)
            .map(|t| t.name().to_string())
            .unwrap_or_default();
        if error.is_misuse() {
            warn!(task = %id, name = %name, %error, "task discarded after misuse");
        } else {
            warn!(task = %id, name = %name, %error, "unhandled task failure");
        }
        self.stats.tasks_failed += 1;
    }

    fn set_state(&mut self, id: TaskId, state: TaskState) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.set_state(state);
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.tasks.len())
            .field("ready", &self.ready.len())
            .field("timers", &self.timers)
            .field("io", &self.io)
            .finish()
    }
}
