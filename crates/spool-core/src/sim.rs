//! Deterministic clock and poller for tests and simulations.
//!
//! [`SimClock`] only moves when told to. [`SimPoller`] delivers scripted
//! readiness events and, instead of blocking, advances the clock to the next
//! event or by the requested timeout. A scheduler built on the pair runs
//! timer-heavy programs instantly and reproducibly.

use crate::clock::Clock;
use crate::poller::{Direction, Interest, Poller, Readiness};
use std::cell::{Cell, RefCell};
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Virtual monotonic clock
#[derive(Debug, Clone)]
pub struct SimClock {
    base: Instant,
    offset: Rc<Cell<Duration>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    /// Time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }

    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }

    /// Move to `offset` after creation; never moves backwards
    pub fn advance_to(&self, offset: Duration) {
        if offset > self.offset.get() {
            self.offset.set(offset);
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        self.base + self.offset.get()
    }
}

#[derive(Debug, Clone, Copy)]
enum EventKind {
    Ready(Direction),
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct ScriptedEvent {
    at: Duration,
    fd: RawFd,
    kind: EventKind,
}

impl ScriptedEvent {
    fn matches(&self, interest: &[Interest]) -> bool {
        interest.iter().any(|i| {
            i.fd == self.fd
                && match self.kind {
                    EventKind::Ready(direction) => i.wants(direction),
                    EventKind::Failed => true,
                }
        })
    }
}

#[derive(Debug, Default)]
struct SimState {
    events: Vec<ScriptedEvent>,
    polls: usize,
    timeouts: Vec<Option<Duration>>,
    last_interest: Vec<Interest>,
}

/// Scripted [`Poller`] driving a [`SimClock`].
///
/// Each scripted event fires once, at or after its time, the first time a
/// poll is interested in it. Clones share the same script.
#[derive(Debug, Clone)]
pub struct SimPoller {
    clock: SimClock,
    state: Rc<RefCell<SimState>>,
}

impl SimPoller {
    pub fn new(clock: SimClock) -> Self {
        Self {
            clock,
            state: Rc::new(RefCell::new(SimState::default())),
        }
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// `fd` becomes ready in `direction` at `at` after clock creation
    pub fn ready_at(&self, at: Duration, fd: RawFd, direction: Direction) {
        self.push(ScriptedEvent {
            at,
            fd,
            kind: EventKind::Ready(direction),
        });
    }

    /// `fd` reports an error condition at `at`
    pub fn fail_at(&self, at: Duration, fd: RawFd) {
        self.push(ScriptedEvent {
            at,
            fd,
            kind: EventKind::Failed,
        });
    }

    fn push(&self, event: ScriptedEvent) {
        let mut state = self.state.borrow_mut();
        state.events.push(event);
        // Stable sort keeps scripting order for simultaneous events
        state.events.sort_by_key(|e| e.at);
    }

    /// Number of polls performed
    pub fn polls(&self) -> usize {
        self.state.borrow().polls
    }

    /// Timeout passed to every poll, in order
    pub fn timeouts(&self) -> Vec<Option<Duration>> {
        self.state.borrow().timeouts.clone()
    }

    /// Interest passed to the most recent poll
    pub fn last_interest(&self) -> Vec<Interest> {
        self.state.borrow().last_interest.clone()
    }

    /// Scripted events not yet delivered
    pub fn pending(&self) -> usize {
        self.state.borrow().events.len()
    }
}

impl Poller for SimPoller {
    fn poll(&mut self, interest: &[Interest], timeout: Option<Duration>) -> io::Result<Readiness> {
        let mut state = self.state.borrow_mut();
        state.polls += 1;
        state.timeouts.push(timeout);
        state.last_interest = interest.to_vec();

        let now = self.clock.elapsed();
        let limit = timeout.map(|t| now + t);
        let next = state
            .events
            .iter()
            .filter(|e| e.matches(interest))
            .map(|e| e.at)
            .find(|at| limit.map_or(true, |limit| *at <= limit));

        let fire_at = match next {
            Some(at) => at.max(now),
            None => match limit {
                Some(limit) => {
                    self.clock.advance_to(limit);
                    return Ok(Readiness::default());
                }
                None => {
                    return Err(io::Error::new(
                        io::ErrorKind::WouldBlock,
                        "simulation stalled: infinite wait with nothing scripted",
                    ))
                }
            },
        };
        self.clock.advance_to(fire_at);

        let mut readiness = Readiness::default();
        state.events.retain(|e| {
            if e.at > fire_at || !e.matches(interest) {
                return true;
            }
            match e.kind {
                EventKind::Ready(Direction::Read) => readiness.readable.push(e.fd),
                EventKind::Ready(Direction::Write) => readiness.writable.push(e.fd),
                EventKind::Failed => readiness.failed.push(e.fd),
            }
            false
        });
        Ok(readiness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_interest(fd: RawFd) -> Interest {
        Interest {
            fd,
            read: true,
            write: false,
        }
    }

    #[test]
    fn test_timeout_advances_clock() {
        let clock = SimClock::new();
        let mut poller = SimPoller::new(clock.clone());
        let r = poller.poll(&[], Some(Duration::from_secs(3))).unwrap();
        assert!(r.is_empty());
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
        assert_eq!(poller.timeouts(), vec![Some(Duration::from_secs(3))]);
    }

    #[test]
    fn test_event_before_timeout_fires_early() {
        let clock = SimClock::new();
        let mut poller = SimPoller::new(clock.clone());
        poller.ready_at(Duration::from_secs(1), 5, Direction::Read);

        let r = poller
            .poll(&[read_interest(5)], Some(Duration::from_secs(10)))
            .unwrap();
        assert_eq!(r.readable, vec![5]);
        assert_eq!(clock.elapsed(), Duration::from_secs(1));
        assert_eq!(poller.pending(), 0);
    }

    #[test]
    fn test_unwatched_event_stays_pending() {
        let clock = SimClock::new();
        let mut poller = SimPoller::new(clock.clone());
        poller.ready_at(Duration::ZERO, 5, Direction::Write);

        let r = poller.poll(&[read_interest(5)], Some(Duration::ZERO)).unwrap();
        assert!(r.is_empty());
        assert_eq!(poller.pending(), 1);
    }

    #[test]
    fn test_infinite_wait_without_events_errors() {
        let mut poller = SimPoller::new(SimClock::new());
        let err = poller.poll(&[read_interest(1)], None).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_clock_never_moves_backwards() {
        let clock = SimClock::new();
        clock.advance(Duration::from_secs(5));
        clock.advance_to(Duration::from_secs(2));
        assert_eq!(clock.elapsed(), Duration::from_secs(5));
    }
}
