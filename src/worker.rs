use std::{
    io::{self, BufWriter, Write},
    net::TcpStream,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{after, select, tick, Receiver};
use derive_more::Display;
use tracing::{debug, error, trace};

use crate::config::SinkConfig;

const DEFAULT_ORDERING: Ordering = Ordering::SeqCst;
const WRITE_BUFFER_SIZE: usize = 4096;

/// Where the delivery worker currently is in its connection lifecycle.
#[derive(Clone, Copy, Debug, Display, Hash, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Opening a connection to statsite.
    Connect = 0,
    /// Connected, buffering lines and flushing on a timer.
    Stream = 1,
    /// Discarding metrics until the reconnect backoff elapses.
    Backoff = 2,
    /// The queue was closed and the worker has exited.
    Terminated = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Connect,
            1 => WorkerState::Stream,
            2 => WorkerState::Backoff,
            _ => WorkerState::Terminated,
        }
    }
}

/// The worker's state, readable from the sink.
#[derive(Clone, Debug, Default)]
pub(crate) struct SharedWorkerState(Arc<AtomicU8>);

impl SharedWorkerState {
    pub(crate) fn load(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(DEFAULT_ORDERING))
    }
    fn store(&self, state: WorkerState) {
        self.0.store(state as u8, DEFAULT_ORDERING)
    }
}

/// Opens the stream the worker writes metric lines to.
pub(crate) trait Connect: Send + 'static {
    type Stream: Write;

    fn connect(&mut self) -> io::Result<Self::Stream>;

    /// Remote address, for log messages.
    fn addr(&self) -> &str;
}

#[derive(Clone, Debug)]
pub(crate) struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub(crate) fn new(addr: String) -> Self {
        Self { addr }
    }
}

impl Connect for TcpConnector {
    type Stream = TcpStream;

    // No connect timeout beyond the platform's.
    fn connect(&mut self) -> io::Result<TcpStream> {
        TcpStream::connect(self.addr.as_str())
    }

    fn addr(&self) -> &str {
        &self.addr
    }
}

enum Step<S: Write> {
    Connect,
    Stream(BufWriter<S>),
    Backoff,
    Terminated,
}

impl<S: Write> Step<S> {
    fn state(&self) -> WorkerState {
        match self {
            Step::Connect => WorkerState::Connect,
            Step::Stream(_) => WorkerState::Stream,
            Step::Backoff => WorkerState::Backoff,
            Step::Terminated => WorkerState::Terminated,
        }
    }
}

/// Drops the connection without pushing the buffered bytes at it.
fn abandon<S: Write>(writer: BufWriter<S>) {
    let (_stream, _unflushed) = writer.into_parts();
}

/// Owns the statsite connection and moves queued lines onto it.
///
/// `run` loops over the connection states until the queue is closed:
/// - Connect: dial the aggregator. Failure goes to Backoff.
/// - Stream: buffer each dequeued line and flush on every tick. A failed
///   write or flush goes to Backoff.
/// - Backoff: throw away whatever arrives on the queue until the backoff
///   elapses, then Connect again.
///
/// A closed queue seen in Stream or Backoff ends the loop.
pub(crate) struct Worker<C: Connect> {
    connector: C,
    queue: Receiver<String>,
    flush_interval: Duration,
    reconnect_backoff: Duration,
    state: SharedWorkerState,
}

impl<C: Connect> Worker<C> {
    pub(crate) fn new(
        connector: C,
        queue: Receiver<String>,
        config: &SinkConfig,
        state: SharedWorkerState,
    ) -> Self {
        Self {
            connector,
            queue,
            flush_interval: config.get_flush_interval(),
            reconnect_backoff: config.get_reconnect_backoff(),
            state,
        }
    }

    pub(crate) fn run(mut self) {
        let ticker = tick(self.flush_interval);
        let mut step = Step::Connect;
        loop {
            let state = step.state();
            debug!(addr = self.connector.addr(), %state, "Statsite worker transition");
            self.state.store(state);
            step = match step {
                Step::Connect => self.connect(),
                Step::Stream(writer) => self.stream(writer, &ticker),
                Step::Backoff => self.backoff(),
                Step::Terminated => break,
            };
        }
    }

    fn connect(&mut self) -> Step<C::Stream> {
        match self.connector.connect() {
            Ok(stream) => Step::Stream(BufWriter::with_capacity(WRITE_BUFFER_SIZE, stream)),
            Err(err) => {
                error!(addr = self.connector.addr(), error = %err, "Error connecting to statsite");
                Step::Backoff
            }
        }
    }

    fn stream(
        &mut self,
        mut writer: BufWriter<C::Stream>,
        ticker: &Receiver<Instant>,
    ) -> Step<C::Stream> {
        loop {
            select! {
                recv(self.queue) -> line => match line {
                    Ok(line) => {
                        if let Err(err) = writer.write_all(line.as_bytes()) {
                            error!(addr = self.connector.addr(), error = %err, "Error writing to statsite");
                            abandon(writer);
                            return Step::Backoff;
                        }
                    }
                    // Disconnected only once everything queued has been received.
                    Err(_) => {
                        self.finish(writer);
                        return Step::Terminated;
                    }
                },
                recv(ticker) -> _ => {
                    let pending = writer.buffer().len();
                    if pending == 0 {
                        continue;
                    }
                    if let Err(err) = writer.flush() {
                        error!(addr = self.connector.addr(), error = %err, "Error flushing to statsite");
                        abandon(writer);
                        return Step::Backoff;
                    }
                    trace!(bytes = pending, "Flushed metrics to statsite");
                },
            }
        }
    }

    fn finish(&self, mut writer: BufWriter<C::Stream>) {
        if let Err(err) = writer.flush() {
            error!(addr = self.connector.addr(), error = %err, "Error flushing to statsite on shutdown");
            abandon(writer);
        }
    }

    fn backoff(&mut self) -> Step<C::Stream> {
        let retry = after(self.reconnect_backoff);
        let mut discarded: u64 = 0;
        loop {
            select! {
                recv(self.queue) -> line => match line {
                    Ok(_) => discarded += 1,
                    Err(_) => {
                        debug!(discarded, "Metrics queue closed during backoff");
                        return Step::Terminated;
                    }
                },
                recv(retry) -> _ => {
                    debug!(discarded, "Backoff elapsed, reconnecting to statsite");
                    return Step::Connect;
                },
            }
        }
    }
}

impl<C: Connect> Drop for Worker<C> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(
                addr = self.connector.addr(),
                "Statsite worker panicked, metrics will be discarded from now on"
            );
        }
        self.state.store(WorkerState::Terminated);
    }
}
