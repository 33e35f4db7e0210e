//! `spool echo`: TCP echo server. The listener task spawns one handler task
//! per connection; every handler replies "Got:" followed by what it read.

use anyhow::Context as _;
use spool_core::net::{self, Connection};
use spool_core::{Context, Resume, Scheduler, SchedulerConfig, Step, Unit, Value};
use std::net::{TcpListener, TcpStream};
use std::rc::Rc;
use tracing::info;

const READ_SIZE: usize = 1000;

struct Handler {
    stream: Rc<TcpStream>,
    peer: String,
    writing: bool,
}

fn handle(conn: Connection) -> Handler {
    info!(peer = %conn.peer, "connection accepted");
    Handler {
        stream: Rc::new(conn.stream),
        peer: conn.peer.to_string(),
        writing: false,
    }
}

impl Unit for Handler {
    fn resume(&mut self, input: Resume, _cx: &mut Context<'_>) -> Step {
        let value = match input {
            Ok(v) => v,
            Err(e) => return Step::Error(e),
        };
        if self.writing || value.is_nil() {
            self.writing = false;
            return Step::delegate(net::recv(self.stream.clone(), READ_SIZE));
        }
        match value.as_bytes() {
            Some([]) => {
                info!(peer = %self.peer, "connection closed");
                Step::Complete(Value::Nil)
            }
            Some(data) => {
                let mut reply = b"Got:".to_vec();
                reply.extend_from_slice(data);
                self.writing = true;
                Step::delegate(net::send(self.stream.clone(), reply))
            }
            None => Step::fail("recv produced a non-byte value"),
        }
    }

    fn name(&self) -> &str {
        "echo-handler"
    }
}

pub fn execute(config: SchedulerConfig, addr: &str) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).with_context(|| format!("binding {addr}"))?;
    listener.set_nonblocking(true)?;
    info!(addr = %listener.local_addr()?, "echo server listening");

    let mut sched = Scheduler::with_config(config);
    sched.add_task(net::serve(Rc::new(listener), handle))?;
    sched.run()?;
    Ok(())
}
