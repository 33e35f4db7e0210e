//! Resumable units of work and the suspension protocol.
//!
//! A unit is an explicit state machine. Each call to [`Unit::resume`] runs
//! it to its next step and reports what happened as a [`Step`]: a plain
//! value, a delegation to a nested unit, a suspension marker, completion,
//! or an error. The [`Task`](crate::Task) trampoline interprets delegation
//! and completion; the [`Scheduler`](crate::Scheduler) interprets suspension.

use std::fmt;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::error::TaskError;
use crate::scheduler::TaskId;
use crate::value::Value;

/// Input delivered to a unit when it is resumed.
///
/// `Err` means a delegated child (or the scheduler, for a failed
/// descriptor) raised an error the unit may handle.
pub type Resume = Result<Value, TaskError>;

/// Reason a unit gives control back to the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspend {
    /// Become runnable again after the delay elapses
    Sleep(Duration),
    /// Become runnable when the descriptor is readable
    Readable(RawFd),
    /// Become runnable when the descriptor is writable
    Writable(RawFd),
    /// Go to the back of the ready queue
    Yield,
}

impl fmt::Display for Suspend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Suspend::Sleep(d) => write!(f, "sleep({d:?})"),
            Suspend::Readable(fd) => write!(f, "wait_readable({fd})"),
            Suspend::Writable(fd) => write!(f, "wait_writable({fd})"),
            Suspend::Yield => write!(f, "yield_now"),
        }
    }
}

/// Outcome of resuming a unit once
pub enum Step {
    /// Hand a plain value back to whatever resumed this unit
    Value(Value),
    /// Run a nested unit; its outcome becomes this unit's next input
    Delegate(Box<dyn Unit>),
    /// Give control back to the scheduler until the condition holds
    Suspend(Suspend),
    /// Finish with a result
    Complete(Value),
    /// Finish with an error
    Error(TaskError),
}

impl Step {
    /// Delegate to `unit`.
    pub fn delegate(unit: impl Unit + 'static) -> Self {
        Step::Delegate(Box::new(unit))
    }

    /// Complete with anything convertible to a [`Value`].
    pub fn complete(value: impl Into<Value>) -> Self {
        Step::Complete(value.into())
    }

    /// Finish with a [`TaskError::Failed`].
    pub fn fail(message: impl Into<String>) -> Self {
        Step::Error(TaskError::failed(message))
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Step::Delegate(unit) => f.debug_tuple("Delegate").field(&unit.name()).finish(),
            Step::Suspend(s) => f.debug_tuple("Suspend").field(s).finish(),
            Step::Complete(v) => f.debug_tuple("Complete").field(v).finish(),
            Step::Error(e) => f.debug_tuple("Error").field(e).finish(),
        }
    }
}

impl From<Result<Value, TaskError>> for Step {
    fn from(result: Result<Value, TaskError>) -> Self {
        match result {
            Ok(v) => Step::Complete(v),
            Err(e) => Step::Error(e),
        }
    }
}

/// Sleep for `delay` before continuing.
pub fn sleep(delay: Duration) -> Step {
    Step::Suspend(Suspend::Sleep(delay))
}

/// Wait until `fd` is readable.
pub fn wait_readable(fd: RawFd) -> Step {
    Step::Suspend(Suspend::Readable(fd))
}

/// Wait until `fd` is writable.
pub fn wait_writable(fd: RawFd) -> Step {
    Step::Suspend(Suspend::Writable(fd))
}

/// Let every other ready task run first.
pub fn yield_now() -> Step {
    Step::Suspend(Suspend::Yield)
}

/// An independently suspendable unit of work
pub trait Unit {
    /// Run until the next step.
    fn resume(&mut self, input: Resume, cx: &mut Context<'_>) -> Step;

    /// Name used in logs.
    fn name(&self) -> &str {
        "unit"
    }
}

impl<U: Unit + ?Sized> Unit for Box<U> {
    fn resume(&mut self, input: Resume, cx: &mut Context<'_>) -> Step {
        (**self).resume(input, cx)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Side requests a unit makes while it runs, applied by the scheduler once
/// the current step returns.
#[derive(Default)]
pub(crate) struct Requests {
    pub(crate) spawned: Vec<(TaskId, Box<dyn Unit>)>,
    pub(crate) cancelled: Vec<TaskId>,
    /// Remaining live-task headroom; `None` = unlimited
    pub(crate) capacity: Option<usize>,
}

impl Requests {
    pub(crate) fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }
}

/// Execution context handed to a unit on every resume
pub struct Context<'a> {
    task: Option<TaskId>,
    clock: &'a dyn Clock,
    depth: usize,
    requests: &'a mut Requests,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        task: Option<TaskId>,
        clock: &'a dyn Clock,
        requests: &'a mut Requests,
    ) -> Self {
        Self {
            task,
            clock,
            depth: 0,
            requests,
        }
    }

    /// The task being driven, or `None` when the unit runs outside a scheduler.
    pub fn task_id(&self) -> Option<TaskId> {
        self.task
    }

    /// Current monotonic time as seen by the scheduler's clock.
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Number of units suspended below the active one in this task.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
    }

    /// Submit `unit` as a new, independent task.
    ///
    /// The task becomes ready once the current step returns to the scheduler.
    pub fn spawn(&mut self, unit: impl Unit + 'static) -> Result<TaskId, TaskError> {
        self.spawn_boxed(Box::new(unit))
    }

    pub fn spawn_boxed(&mut self, unit: Box<dyn Unit>) -> Result<TaskId, TaskError> {
        if self.task.is_none() {
            return Err(TaskError::misuse("spawn outside a scheduler"));
        }
        if let Some(capacity) = self.requests.capacity.as_mut() {
            if *capacity == 0 {
                return Err(TaskError::failed("task limit reached"));
            }
            *capacity -= 1;
        }
        let id = TaskId::new();
        self.requests.spawned.push((id, unit));
        Ok(id)
    }

    /// Drop task `id` from the scheduler without notifying it.
    ///
    /// Cancelling the current task discards it after this step returns.
    pub fn cancel(&mut self, id: TaskId) {
        self.requests.cancelled.push(id);
    }
}

/// Unit backed by a closure
pub struct FnUnit<F> {
    name: &'static str,
    f: F,
}

/// Build a unit from a closure that is called on every resume.
pub fn from_fn<F>(f: F) -> FnUnit<F>
where
    F: FnMut(Resume, &mut Context<'_>) -> Step,
{
    FnUnit { name: "fn", f }
}

impl<F> FnUnit<F> {
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl<F> Unit for FnUnit<F>
where
    F: FnMut(Resume, &mut Context<'_>) -> Step,
{
    fn resume(&mut self, input: Resume, cx: &mut Context<'_>) -> Step {
        (self.f)(input, cx)
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// One-shot callback, optionally delayed.
///
/// Runs the closure once and completes. With a delay it first sleeps.
pub struct Callback<F> {
    delay: Option<Duration>,
    f: Option<F>,
}

/// Callback that runs as soon as its task is scheduled.
pub fn call_once<F>(f: F) -> Callback<F>
where
    F: FnOnce(&mut Context<'_>),
{
    Callback {
        delay: None,
        f: Some(f),
    }
}

/// Callback that runs after `delay`.
pub fn call_after<F>(delay: Duration, f: F) -> Callback<F>
where
    F: FnOnce(&mut Context<'_>),
{
    Callback {
        delay: Some(delay),
        f: Some(f),
    }
}

impl<F> Unit for Callback<F>
where
    F: FnOnce(&mut Context<'_>),
{
    fn resume(&mut self, input: Resume, cx: &mut Context<'_>) -> Step {
        if let Err(e) = input {
            return Step::Error(e);
        }
        if let Some(delay) = self.delay.take() {
            return sleep(delay);
        }
        match self.f.take() {
            Some(f) => {
                f(cx);
                Step::Complete(Value::Nil)
            }
            None => Step::Error(TaskError::misuse("callback resumed after it ran")),
        }
    }

    fn name(&self) -> &str {
        "callback"
    }
}
