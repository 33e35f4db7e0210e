//! Readiness polling over the host's `poll(2)`.

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Direction a task waits in on a descriptor
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

/// Directions of interest for one descriptor
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Interest {
    pub fd: RawFd,
    pub read: bool,
    pub write: bool,
}

impl Interest {
    pub fn wants(&self, direction: Direction) -> bool {
        match direction {
            Direction::Read => self.read,
            Direction::Write => self.write,
        }
    }
}

/// Descriptors reported by one poll
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub readable: Vec<RawFd>,
    pub writable: Vec<RawFd>,
    /// Descriptors in an error state or no longer open
    pub failed: Vec<RawFd>,
}

impl Readiness {
    pub fn is_empty(&self) -> bool {
        self.readable.is_empty() && self.writable.is_empty() && self.failed.is_empty()
    }
}

/// Blocking readiness primitive the scheduler waits on.
///
/// `timeout` of `None` blocks until some descriptor is ready; `Some(ZERO)`
/// returns immediately.
pub trait Poller {
    fn poll(&mut self, interest: &[Interest], timeout: Option<Duration>) -> io::Result<Readiness>;
}

impl<P: Poller + ?Sized> Poller for Box<P> {
    fn poll(&mut self, interest: &[Interest], timeout: Option<Duration>) -> io::Result<Readiness> {
        (**self).poll(interest, timeout)
    }
}

/// [`Poller`] backed by `libc::poll`
#[derive(Default)]
pub struct SysPoller {
    /// Reused between calls
    fds: Vec<libc::pollfd>,
}

impl SysPoller {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for SysPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysPoller")
            .field("descriptors", &self.fds.len())
            .finish()
    }
}

/// Millisecond timeout for `poll(2)`, rounded up so a wakeup never lands
/// before the deadline it was computed from.
fn timeout_millis(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        None => -1,
        Some(t) => {
            let mut ms = t.as_millis();
            if Duration::from_millis(ms as u64) < t {
                ms += 1;
            }
            ms.min(libc::c_int::MAX as u128) as libc::c_int
        }
    }
}

impl Poller for SysPoller {
    fn poll(&mut self, interest: &[Interest], timeout: Option<Duration>) -> io::Result<Readiness> {
        self.fds.clear();
        self.fds.extend(interest.iter().map(|i| {
            let mut events = 0;
            if i.read {
                events |= libc::POLLIN;
            }
            if i.write {
                events |= libc::POLLOUT;
            }
            libc::pollfd {
                fd: i.fd,
                events,
                revents: 0,
            }
        }));

        // SAFETY: `fds` is a live, initialized buffer of exactly `fds.len()`
        // pollfd entries, and nothing else touches it during the call
        let ret = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout_millis(timeout),
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            // A signal cut the wait short; the caller recomputes its timeout.
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Readiness::default());
            }
            return Err(err);
        }

        let mut readiness = Readiness::default();
        if ret == 0 {
            return Ok(readiness);
        }
        for pfd in &self.fds {
            let revents = pfd.revents;
            if revents == 0 {
                continue;
            }
            if revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
                readiness.failed.push(pfd.fd);
                continue;
            }
            let hangup = revents & libc::POLLHUP != 0;
            if pfd.events & libc::POLLIN != 0 && (revents & libc::POLLIN != 0 || hangup) {
                readiness.readable.push(pfd.fd);
            }
            if pfd.events & libc::POLLOUT != 0 && (revents & libc::POLLOUT != 0 || hangup) {
                readiness.writable.push(pfd.fd);
            }
        }
        Ok(readiness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::time::Instant;

    #[test]
    fn test_timeout_rounds_up() {
        assert_eq!(timeout_millis(None), -1);
        assert_eq!(timeout_millis(Some(Duration::ZERO)), 0);
        assert_eq!(timeout_millis(Some(Duration::from_micros(1))), 1);
        assert_eq!(timeout_millis(Some(Duration::from_millis(7))), 7);
        assert_eq!(timeout_millis(Some(Duration::from_secs(u64::MAX))), libc::c_int::MAX);
    }

    #[test]
    fn test_socketpair_readiness() {
        let (mut a, b) = UnixStream::pair().unwrap();
        let mut poller = SysPoller::new();
        let interest = [Interest {
            fd: b.as_raw_fd(),
            read: true,
            write: false,
        }];

        let r = poller.poll(&interest, Some(Duration::ZERO)).unwrap();
        assert!(r.is_empty());

        a.write_all(b"ping").unwrap();
        let r = poller.poll(&interest, Some(Duration::from_secs(1))).unwrap();
        assert_eq!(r.readable, vec![b.as_raw_fd()]);
        assert!(r.writable.is_empty());
    }

    #[test]
    fn test_hangup_reports_readable() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(a);
        let mut poller = SysPoller::new();
        let r = poller
            .poll(
                &[Interest {
                    fd: b.as_raw_fd(),
                    read: true,
                    write: false,
                }],
                Some(Duration::from_secs(1)),
            )
            .unwrap();
        assert_eq!(r.readable, vec![b.as_raw_fd()]);
    }

    fn write_interest(fd: RawFd) -> [Interest; 1] {
        [Interest {
            fd,
            read: false,
            write: true,
        }]
    }

    #[test]
    fn test_unopened_descriptor_reports_failed() {
        // Far above any open-file limit, so never an open descriptor
        let fd: RawFd = 1 << 30;
        let mut poller = SysPoller::new();
        let r = poller
            .poll(
                &[Interest {
                    fd,
                    read: true,
                    write: true,
                }],
                Some(Duration::from_secs(1)),
            )
            .unwrap();
        assert_eq!(r.failed, vec![fd]);
        assert!(r.readable.is_empty());
        assert!(r.writable.is_empty());
    }

    #[test]
    fn test_pipe_without_reader_reports_failed() {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: pipe writes two descriptors into a two-element array
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let [read_end, write_end] = fds;
        // SAFETY: read_end was just opened by pipe and is closed once
        unsafe { libc::close(read_end) };

        let mut poller = SysPoller::new();
        let r = poller
            .poll(&write_interest(write_end), Some(Duration::from_secs(1)))
            .unwrap();
        // SAFETY: write_end was opened by pipe and is closed once
        unsafe { libc::close(write_end) };

        assert_eq!(r.failed, vec![write_end]);
        assert!(r.readable.is_empty());
        assert!(r.writable.is_empty());
    }

    #[test]
    fn test_empty_interest_sleeps_for_timeout() {
        let mut poller = SysPoller::new();
        let start = Instant::now();
        let r = poller.poll(&[], Some(Duration::from_millis(20))).unwrap();
        assert!(r.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
