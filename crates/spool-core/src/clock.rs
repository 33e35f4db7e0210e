//! Monotonic time source.

use std::time::Instant;

/// Source of monotonic time for deadlines
pub trait Clock {
    fn now(&self) -> Instant;
}

/// The host's monotonic clock
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<C: Clock + ?Sized> Clock for std::rc::Rc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}
