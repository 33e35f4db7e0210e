//! `spool callbacks`: counters as chains of one-shot callbacks, each
//! scheduling its successor with a delay.

use spool_core::{call_after, Context, Scheduler, SchedulerConfig};
use std::time::Duration;

fn countdown(n: u32, tick: Duration) -> impl FnOnce(&mut Context<'_>) + 'static {
    move |cx| {
        if n == 0 {
            return;
        }
        println!("Down {n}");
        chain(cx, call_after(tick.saturating_mul(4), countdown(n - 1, tick)));
    }
}

fn countup(x: u32, stop: u32, tick: Duration) -> impl FnOnce(&mut Context<'_>) + 'static {
    move |cx| {
        if x >= stop {
            return;
        }
        println!("Up {x}");
        chain(cx, call_after(tick, countup(x + 1, stop, tick)));
    }
}

fn chain(cx: &mut Context<'_>, next: impl spool_core::Unit + 'static) {
    if let Err(e) = cx.spawn(next) {
        tracing::warn!(error = %e, "could not schedule next callback");
    }
}

pub fn execute(config: SchedulerConfig, down: u32, up: u32, tick_ms: u64) -> anyhow::Result<()> {
    let tick = Duration::from_millis(tick_ms);
    let mut sched = Scheduler::with_config(config);
    sched.call_soon(countdown(down, tick))?;
    sched.call_soon(countup(0, up, tick))?;

    let stats = sched.run()?;
    tracing::debug!(?stats, "scheduler finished");
    Ok(())
}
