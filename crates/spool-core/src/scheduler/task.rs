//! Task structure and the delegation trampoline

use crate::clock::MonotonicClock;
use crate::error::TaskError;
use crate::unit::{Context, Requests, Resume, Step, Suspend, Unit};
use crate::value::Value;
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Unique identifier for a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Generate a new unique TaskId
    pub fn new() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// State of a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// In the ready queue
    Ready,
    /// Being driven by the scheduler
    Running,
    /// In the timer heap
    Sleeping,
    /// Registered as a read waiter
    WaitingRead,
    /// Registered as a write waiter
    WaitingWrite,
    /// Unit stack unwound completely
    Done,
}

/// What a call to [`Task::run`] ended with
#[derive(Debug)]
pub enum RunOutcome {
    /// The active unit asked to be suspended
    Suspended(Suspend),
    /// The outermost unit handed back a plain value
    Yielded(Value),
    /// The outermost unit completed
    Finished(Value),
    /// An error unwound past the outermost unit
    Failed(TaskError),
}

thread_local! {
    static RUNNING: Cell<Option<TaskId>> = const { Cell::new(None) };
}

/// The task currently being driven on this thread, if any
pub fn current_task() -> Option<TaskId> {
    RUNNING.with(|r| r.get())
}

/// Marks a task as the running one for as long as it lives
struct RunningGuard;

impl RunningGuard {
    fn enter(task: TaskId) -> Result<Self, TaskId> {
        RUNNING.with(|r| match r.get() {
            Some(other) => Err(other),
            None => {
                r.set(Some(task));
                Ok(RunningGuard)
            }
        })
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        RUNNING.with(|r| r.set(None));
    }
}

/// A unit of work and the units it has delegated to.
///
/// The innermost unit is active. Delegation pushes onto `parents`, which
/// lives on the heap, so nesting depth never grows the host stack.
pub struct Task {
    id: TaskId,
    name: String,
    state: TaskState,
    /// Innermost (active) unit
    current: Box<dyn Unit>,
    /// Suspended delegators, outermost first
    parents: Vec<Box<dyn Unit>>,
    /// Input for the next resume, set when a waiter is woken with an error
    resume: Option<Resume>,
    max_depth: Option<usize>,
}

impl Task {
    /// Create a new Task
    pub fn new(unit: Box<dyn Unit>) -> Self {
        Self::with_id(TaskId::new(), unit)
    }

    pub(crate) fn with_id(id: TaskId, unit: Box<dyn Unit>) -> Self {
        Self {
            id,
            name: unit.name().to_string(),
            state: TaskState::Ready,
            current: unit,
            parents: Vec::new(),
            resume: None,
            max_depth: None,
        }
    }

    /// Limit how many delegations may be outstanding at once
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Name of the outermost unit
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn set_state(&mut self, state: TaskState) {
        self.state = state;
    }

    /// Number of delegators suspended below the active unit
    pub fn depth(&self) -> usize {
        self.parents.len()
    }

    pub(crate) fn set_resume(&mut self, input: Resume) {
        self.resume = Some(input);
    }

    pub(crate) fn take_resume(&mut self) -> Option<Resume> {
        self.resume.take()
    }

    /// Drive the active unit until it suspends or the stack unwinds.
    ///
    /// Delegation and completion of nested units are handled here without
    /// returning to the caller.
    pub fn run(&mut self, input: Resume, cx: &mut Context<'_>) -> RunOutcome {
        let _guard = match RunningGuard::enter(self.id) {
            Ok(guard) => guard,
            Err(other) => {
                return RunOutcome::Failed(TaskError::misuse(format!(
                    "task {} resumed while task {} is running",
                    self.id, other
                )))
            }
        };
        self.drive(input, cx)
    }

    fn drive(&mut self, mut input: Resume, cx: &mut Context<'_>) -> RunOutcome {
        if self.state == TaskState::Done {
            return RunOutcome::Failed(TaskError::misuse(format!(
                "task {} resumed after it finished",
                self.id
            )));
        }
        self.state = TaskState::Running;

        loop {
            cx.set_depth(self.parents.len());
            match self.current.resume(input, cx) {
                Step::Delegate(child) => {
                    if let Some(max) = self.max_depth.filter(|max| self.parents.len() >= *max) {
                        trace!(task = %self.id, max, "delegation refused");
                        input = Err(TaskError::DepthExceeded(max));
                        continue;
                    }
                    trace!(task = %self.id, depth = self.parents.len() + 1, child = child.name(), "delegate");
                    let parent = std::mem::replace(&mut self.current, child);
                    self.parents.push(parent);
                    input = Ok(Value::Nil);
                }
                Step::Suspend(reason) => return RunOutcome::Suspended(reason),
                Step::Value(value) => match self.parents.pop() {
                    // A nested unit handing back a value is done with it
                    Some(parent) => {
                        self.current = parent;
                        input = Ok(value);
                    }
                    None => return RunOutcome::Yielded(value),
                },
                Step::Complete(value) => match self.parents.pop() {
                    Some(parent) => {
                        trace!(task = %self.id, depth = self.parents.len(), "child completed");
                        self.current = parent;
                        input = Ok(value);
                    }
                    None => {
                        self.state = TaskState::Done;
                        return RunOutcome::Finished(value);
                    }
                },
                Step::Error(err) => match self.parents.pop() {
                    Some(parent) => {
                        trace!(task = %self.id, depth = self.parents.len(), error = %err, "child failed");
                        self.current = parent;
                        input = Err(err);
                    }
                    None => {
                        self.state = TaskState::Done;
                        return RunOutcome::Failed(err);
                    }
                },
            }
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("depth", &self.parents.len())
            .finish()
    }
}

/// Drive `unit` without a scheduler, yielding the plain values it hands
/// back, like iterating a generator.
///
/// Suspension markers and spawns have no meaning here and end the
/// iteration with a [`TaskError::Misuse`].
pub fn values(unit: impl Unit + 'static) -> Values {
    Values {
        task: Task::new(Box::new(unit)),
        done: false,
    }
}

/// Iterator returned by [`values`]
pub struct Values {
    task: Task,
    done: bool,
}

impl Iterator for Values {
    type Item = Result<Value, TaskError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let clock = MonotonicClock;
        let mut requests = Requests::default();
        let mut cx = Context::new(None, &clock, &mut requests);
        match self.task.drive(Ok(Value::Nil), &mut cx) {
            RunOutcome::Yielded(value) => Some(Ok(value)),
            RunOutcome::Finished(_) => {
                self.done = true;
                None
            }
            RunOutcome::Suspended(reason) => {
                self.done = true;
                Some(Err(TaskError::misuse(format!("{reason} outside a task"))))
            }
            RunOutcome::Failed(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
