//! `spool generate`: iterate a unit's plain values without a scheduler.

use spool_core::{from_fn, values, Step, Value};

pub fn execute(from: i64) -> anyhow::Result<()> {
    println!("Counting down from {from}");
    let mut n = from;
    let counter = from_fn(move |_, _| {
        if n <= 0 {
            return Step::Complete(Value::Nil);
        }
        n -= 1;
        Step::Value(Value::Int(n + 1))
    })
    .named("countdown");

    for value in values(counter) {
        let value = value?;
        match value.as_int() {
            Some(i) => println!("{i}"),
            None => println!("{value:?}"),
        }
    }
    println!("Done counting down");
    Ok(())
}
