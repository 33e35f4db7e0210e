//! Socket operations as units of work.
//!
//! Each unit tries its operation on a non-blocking socket first and waits
//! for readiness only when the kernel reports `WouldBlock`. Delegate to them
//! from inside a task:
//!
//! ```ignore
//! Step::delegate(net::recv(stream.clone(), 4096))
//! // next resume: Ok(Value::Bytes(data)), empty on end of stream
//! ```

use crate::error::TaskError;
use crate::unit::{wait_readable, wait_writable, Context, Resume, Step, Unit};
use crate::value::Value;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::rc::Rc;
use tracing::{debug, warn};

/// Accept one connection; completes with a boxed [`Connection`]
pub struct Accept {
    listener: Rc<TcpListener>,
}

/// Accepted connection, already switched to non-blocking mode
#[derive(Debug)]
pub struct Connection {
    pub stream: TcpStream,
    pub peer: SocketAddr,
}

/// Accept a connection on `listener`, which must be non-blocking.
pub fn accept(listener: Rc<TcpListener>) -> Accept {
    Accept { listener }
}

impl Unit for Accept {
    fn resume(&mut self, input: Resume, _cx: &mut Context<'_>) -> Step {
        if let Err(e) = input {
            return Step::Error(e);
        }
        match self.listener.accept() {
            Ok((stream, peer)) => match stream.set_nonblocking(true) {
                Ok(()) => Step::Complete(Value::boxed(Connection { stream, peer })),
                Err(e) => Step::Error(e.into()),
            },
            Err(e) if is_retry(&e) => wait_readable(self.listener.as_raw_fd()),
            Err(e) => Step::Error(e.into()),
        }
    }

    fn name(&self) -> &str {
        "accept"
    }
}

/// Accept loop that runs every connection as its own task
pub struct Serve<F> {
    listener: Rc<TcpListener>,
    handler: F,
    accepting: bool,
}

/// Accept connections on `listener` forever, spawning `handler(conn)` as a
/// new task for each.
///
/// Failures that concern a single connection are logged and skipped; any
/// other accept error ends the loop with that error.
pub fn serve<F, U>(listener: Rc<TcpListener>, handler: F) -> Serve<F>
where
    F: FnMut(Connection) -> U,
    U: Unit + 'static,
{
    Serve {
        listener,
        handler,
        accepting: false,
    }
}

impl<F, U> Unit for Serve<F>
where
    F: FnMut(Connection) -> U,
    U: Unit + 'static,
{
    fn resume(&mut self, input: Resume, cx: &mut Context<'_>) -> Step {
        if self.accepting {
            match input {
                Ok(value) => match value.downcast::<Connection>() {
                    Ok(conn) => {
                        debug!(peer = %conn.peer, "connection accepted");
                        if let Err(e) = cx.spawn((self.handler)(conn)) {
                            warn!(error = %e, "connection dropped");
                        }
                    }
                    Err(other) => return Step::fail(format!("accept produced {other:?}")),
                },
                Err(e) if is_transient_accept_error(&e) => {
                    warn!(error = %e, "accept failed, still listening");
                }
                Err(e) => return Step::Error(e),
            }
        }
        self.accepting = true;
        Step::delegate(accept(self.listener.clone()))
    }

    fn name(&self) -> &str {
        "serve"
    }
}

/// Read up to `max` bytes; completes with `Value::Bytes`, empty at end of stream
pub struct Recv<S> {
    stream: Rc<S>,
    max: usize,
}

pub fn recv<S>(stream: Rc<S>, max: usize) -> Recv<S>
where
    S: AsRawFd,
    for<'a> &'a S: Read,
{
    Recv { stream, max }
}

impl<S> Unit for Recv<S>
where
    S: AsRawFd,
    for<'a> &'a S: Read,
{
    fn resume(&mut self, input: Resume, _cx: &mut Context<'_>) -> Step {
        if let Err(e) = input {
            return Step::Error(e);
        }
        let mut buf = vec![0u8; self.max];
        match (&*self.stream).read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Step::Complete(Value::Bytes(buf))
            }
            Err(e) if is_retry(&e) => wait_readable(self.stream.as_raw_fd()),
            Err(e) => Step::Error(e.into()),
        }
    }

    fn name(&self) -> &str {
        "recv"
    }
}

/// Write all of `data`; completes with the byte count as `Value::Int`
pub struct SendAll<S> {
    stream: Rc<S>,
    data: Vec<u8>,
    written: usize,
}

pub fn send<S>(stream: Rc<S>, data: impl Into<Vec<u8>>) -> SendAll<S>
where
    S: AsRawFd,
    for<'a> &'a S: Write,
{
    SendAll {
        stream,
        data: data.into(),
        written: 0,
    }
}

impl<S> Unit for SendAll<S>
where
    S: AsRawFd,
    for<'a> &'a S: Write,
{
    fn resume(&mut self, input: Resume, _cx: &mut Context<'_>) -> Step {
        if let Err(e) = input {
            return Step::Error(e);
        }
        while self.written < self.data.len() {
            match (&*self.stream).write(&self.data[self.written..]) {
                Ok(0) => {
                    return Step::Error(TaskError::from(io::Error::from(io::ErrorKind::WriteZero)))
                }
                Ok(n) => self.written += n,
                Err(e) if is_retry(&e) => return wait_writable(self.stream.as_raw_fd()),
                Err(e) => return Step::Error(e.into()),
            }
        }
        Step::Complete(Value::from(self.written))
    }

    fn name(&self) -> &str {
        "send"
    }
}

/// Whether an `accept` failure concerns only the one connection, so the
/// listener can keep accepting
pub fn is_transient_accept_error(err: &TaskError) -> bool {
    matches!(
        err,
        TaskError::Io {
            kind: io::ErrorKind::ConnectionAborted
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::TimedOut
                | io::ErrorKind::Interrupted,
            ..
        }
    )
}

fn is_retry(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;
    use crate::scheduler::TaskId;
    use crate::unit::{Requests, Suspend};
    use std::os::unix::net::UnixStream;

    fn step(unit: &mut dyn Unit, input: Resume) -> Step {
        let clock = MonotonicClock;
        let mut requests = Requests::default();
        let mut cx = Context::new(Some(TaskId::new()), &clock, &mut requests);
        unit.resume(input, &mut cx)
    }

    fn pair() -> (Rc<UnixStream>, Rc<UnixStream>) {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        b.set_nonblocking(true).unwrap();
        (Rc::new(a), Rc::new(b))
    }

    #[test]
    fn test_recv_waits_then_reads() {
        let (a, b) = pair();
        let mut unit = recv(b.clone(), 16);
        assert!(matches!(
            step(&mut unit, Ok(Value::Nil)),
            Step::Suspend(Suspend::Readable(fd)) if fd == b.as_raw_fd()
        ));

        (&*a).write_all(b"hello").unwrap();
        match step(&mut unit, Ok(Value::Nil)) {
            Step::Complete(v) => assert_eq!(v.as_bytes(), Some(&b"hello"[..])),
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_recv_end_of_stream_is_empty() {
        let (a, b) = pair();
        drop(a);
        match step(&mut recv(b, 16), Ok(Value::Nil)) {
            Step::Complete(v) => assert_eq!(v.as_bytes(), Some(&[][..])),
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_send_writes_everything() {
        let (a, b) = pair();
        match step(&mut send(a, b"abc".to_vec()), Ok(Value::Nil)) {
            Step::Complete(v) => assert_eq!(v, Value::Int(3)),
            other => panic!("unexpected step: {other:?}"),
        }
        let mut buf = [0u8; 3];
        (&*b).read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn test_error_input_propagates() {
        let (_a, b) = pair();
        match step(&mut recv(b, 1), Err(TaskError::DescriptorClosed(3))) {
            Step::Error(e) => assert_eq!(e, TaskError::DescriptorClosed(3)),
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_transient_accept_errors() {
        let aborted = TaskError::from(io::Error::from(io::ErrorKind::ConnectionAborted));
        assert!(is_transient_accept_error(&aborted));
        let reset = TaskError::from(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(is_transient_accept_error(&reset));

        let denied = TaskError::from(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!is_transient_accept_error(&denied));
        assert!(!is_transient_accept_error(&TaskError::DescriptorClosed(4)));
    }

    fn listener() -> Rc<TcpListener> {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        Rc::new(listener)
    }

    #[test]
    fn test_serve_survives_aborted_connection() {
        let mut unit = serve(listener(), |_conn| recv(Rc::new(UnixStream::pair().unwrap().0), 1));
        assert!(matches!(step(&mut unit, Ok(Value::Nil)), Step::Delegate(_)));

        let aborted = TaskError::from(io::Error::from(io::ErrorKind::ConnectionAborted));
        assert!(matches!(step(&mut unit, Err(aborted)), Step::Delegate(_)));

        let fatal = TaskError::from(io::Error::from(io::ErrorKind::PermissionDenied));
        match step(&mut unit, Err(fatal.clone())) {
            Step::Error(e) => assert_eq!(e, fatal),
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_accept_would_block() {
        let listener = listener();
        assert!(matches!(
            step(&mut accept(listener.clone()), Ok(Value::Nil)),
            Step::Suspend(Suspend::Readable(fd)) if fd == listener.as_raw_fd()
        ));
    }
}
