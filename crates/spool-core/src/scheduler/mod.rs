//! Cooperative scheduler
//!
//! One loop on one thread drives every task. Tasks sit in exactly one of
//! three places while not running: the ready queue, the timer heap, or the
//! I/O wait sets. The loop drains ready tasks, then blocks on readiness for
//! at most the time until the nearest timer, and converts both kinds of
//! event back into ready-queue entries.

mod io;
mod ready;
#[allow(clippy::module_inception)]
mod scheduler;
mod task;
mod timer;

pub use io::IoWaitSets;
pub use ready::ReadyQueue;
pub use scheduler::{Scheduler, SchedulerStats};
pub use task::{current_task, values, RunOutcome, Task, TaskId, TaskState, Values};
pub use timer::{TimerHeap, FAR_FUTURE};
