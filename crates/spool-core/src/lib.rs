//! Spool: a single-threaded cooperative scheduler
//!
//! Units of work are explicit state machines ([`Unit`]) that report each
//! step as a [`Step`]. A [`Task`] drives a stack of delegating units with a
//! trampoline, so nesting never grows the host stack. The [`Scheduler`]
//! interleaves tasks at their suspension points: sleeping tasks wait in a
//! deadline-ordered heap, I/O-bound tasks wait on descriptor readiness, and
//! everything else runs in FIFO order.
//!
//! ```ignore
//! use spool_core::{from_fn, sleep, Scheduler, Step, Value};
//! use std::time::Duration;
//!
//! let mut sched = Scheduler::new();
//! let mut n = 3;
//! sched.add_task(from_fn(move |_, _| {
//!     if n == 0 {
//!         return Step::Complete(Value::Nil);
//!     }
//!     n -= 1;
//!     sleep(Duration::from_millis(10))
//! }))?;
//! sched.run()?;
//! ```

#[cfg(not(unix))]
compile_error!("spool-core requires a unix platform");

pub mod clock;
pub mod config;
pub mod error;
pub mod net;
pub mod poller;
pub mod scheduler;
pub mod sim;
pub mod unit;
pub mod value;

pub use clock::{Clock, MonotonicClock};
pub use config::{ConfigError, SchedulerConfig};
pub use error::{SchedulerError, TaskError};
pub use poller::{Direction, Interest, Poller, Readiness, SysPoller};
pub use scheduler::{
    current_task, values, IoWaitSets, ReadyQueue, RunOutcome, Scheduler, SchedulerStats, Task,
    TaskId, TaskState, TimerHeap, Values,
};
pub use unit::{
    call_after, call_once, from_fn, sleep, wait_readable, wait_writable, yield_now, Callback,
    Context, FnUnit, Resume, Step, Suspend, Unit,
};
pub use value::Value;
