//! `spool countdown`: a slow counter and a fast counter interleaved by their
//! sleep deadlines.

use spool_core::{sleep, Context, Resume, Scheduler, SchedulerConfig, Step, Unit, Value};
use std::time::Duration;

/// Prints "Down n" then sleeps four ticks, until n reaches zero
struct Countdown {
    n: u32,
    tick: Duration,
}

impl Unit for Countdown {
    fn resume(&mut self, input: Resume, _cx: &mut Context<'_>) -> Step {
        if let Err(e) = input {
            return Step::Error(e);
        }
        if self.n == 0 {
            return Step::Complete(Value::Nil);
        }
        println!("Down {}", self.n);
        self.n -= 1;
        sleep(self.tick.saturating_mul(4))
    }

    fn name(&self) -> &str {
        "countdown"
    }
}

/// Prints "Up x" then sleeps one tick, for x in 0..stop
struct Countup {
    x: u32,
    stop: u32,
    tick: Duration,
}

impl Unit for Countup {
    fn resume(&mut self, input: Resume, _cx: &mut Context<'_>) -> Step {
        if let Err(e) = input {
            return Step::Error(e);
        }
        if self.x >= self.stop {
            return Step::Complete(Value::Nil);
        }
        println!("Up {}", self.x);
        self.x += 1;
        sleep(self.tick)
    }

    fn name(&self) -> &str {
        "countup"
    }
}

pub fn execute(config: SchedulerConfig, down: u32, up: u32, tick_ms: u64) -> anyhow::Result<()> {
    let tick = Duration::from_millis(tick_ms);
    let mut sched = Scheduler::with_config(config);
    sched.add_task(Countdown { n: down, tick })?;
    sched.add_task(Countup { x: 0, stop: up, tick })?;

    let stats = sched.run()?;
    tracing::debug!(?stats, "scheduler finished");
    Ok(())
}
