use std::{net::Ipv6Addr, thread};

use thiserror::Error;
use tracing::{debug, dispatcher, Dispatch};
use url::Url;

use crate::{
    config::SinkConfig,
    metric::{flatten_key, flatten_key_labels, format_line, Label, MetricKind},
    queue::SubmissionQueue,
    worker::{SharedWorkerState, TcpConnector, Worker, WorkerState},
};

/// Statsite's default listening port, used when a URL doesn't name one.
pub const DEFAULT_PORT: u16 = 8125;
const WORKER_THREAD_NAME: &str = "statsite-sink";

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Invalid statsite address {0:?}, expected host:port")]
    InvalidAddress(String),
    #[error("Couldn't parse statsite URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Statsite URL has no host: {0:?}")]
    MissingHost(String),
    #[error("Couldn't start the statsite worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Fire-and-forget metric emission. Nothing here reports back whether a
/// metric was delivered, buffered or dropped.
pub trait MetricSink {
    fn set_gauge(&self, key: &[&str], val: f32);
    fn set_gauge_with_labels(&self, key: &[&str], val: f32, labels: &[Label]);
    fn emit_key(&self, key: &[&str], val: f32);
    fn emit_key_with_labels(&self, key: &[&str], val: f32, labels: &[Label]);
    fn incr_counter(&self, key: &[&str], val: f32);
    fn incr_counter_with_labels(&self, key: &[&str], val: f32, labels: &[Label]);
    fn add_sample(&self, key: &[&str], val: f32);
    fn add_sample_with_labels(&self, key: &[&str], val: f32, labels: &[Label]);
    /// Stops accepting metrics. Anything emitted afterwards is dropped.
    fn shutdown(&self);
}

/// Sends metrics to a statsite server over TCP.
///
/// Emitting formats the metric line and hands it to a background thread
/// through a bounded queue. The calling thread never waits on the network:
/// when the queue is full the metric is dropped. While statsite is
/// unreachable the worker discards metrics and retries the connection
/// every few seconds.
#[derive(Debug)]
pub struct StatsiteSink {
    addr: String,
    queue: SubmissionQueue,
    state: SharedWorkerState,
}

fn validate_addr(addr: &str) -> Result<(), SinkError> {
    let invalid = || SinkError::InvalidAddress(addr.to_string());
    let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(invalid());
    }
    // IPv6 hosts must be bracketed, otherwise the port is ambiguous.
    match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        Some(ipv6) if ipv6.parse::<Ipv6Addr>().is_ok() => Ok(()),
        Some(_) => Err(invalid()),
        None if host.contains([':', '[', ']']) => Err(invalid()),
        None => Ok(()),
    }
}

fn addr_from_url(raw: &str) -> Result<String, SinkError> {
    let url = Url::parse(raw)?;
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| SinkError::MissingHost(raw.to_string()))?;
    Ok(format!("{}:{}", host, url.port().unwrap_or(DEFAULT_PORT)))
}

impl StatsiteSink {
    /// `addr` is `host:port`. Only its shape is checked here, an
    /// unreachable server is handled by the worker.
    pub fn new(addr: &str) -> Result<Self, SinkError> {
        Self::with_config(addr, SinkConfig::default())
    }

    pub fn with_config(addr: &str, config: SinkConfig) -> Result<Self, SinkError> {
        validate_addr(addr)?;
        let (queue, rx) = SubmissionQueue::bounded(config.get_queue_capacity());
        let state = SharedWorkerState::default();
        let worker = Worker::new(
            TcpConnector::new(addr.to_string()),
            rx,
            &config,
            state.clone(),
        );
        // The worker logs through whichever subscriber is current right now.
        let dispatch = dispatcher::get_default(Dispatch::clone);
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || dispatcher::with_default(&dispatch, || worker.run()))?;
        debug!(addr, "Started statsite sink");
        Ok(Self {
            addr: addr.to_string(),
            queue,
            state,
        })
    }

    /// Uses the host (and port, else [DEFAULT_PORT]) of a URL such as
    /// `statsite://metrics.internal:8125`.
    pub fn from_url(url: &str) -> Result<Self, SinkError> {
        Self::from_url_with_config(url, SinkConfig::default())
    }

    pub fn from_url_with_config(url: &str, config: SinkConfig) -> Result<Self, SinkError> {
        let addr = addr_from_url(url)?;
        Self::with_config(&addr, config)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn worker_state(&self) -> WorkerState {
        self.state.load()
    }

    fn push_metric(&self, flat_key: &str, val: f32, kind: MetricKind) {
        self.queue.try_push(format_line(flat_key, val, kind));
    }
}

impl MetricSink for StatsiteSink {
    fn set_gauge(&self, key: &[&str], val: f32) {
        self.push_metric(&flatten_key(key), val, MetricKind::Gauge);
    }
    fn set_gauge_with_labels(&self, key: &[&str], val: f32, labels: &[Label]) {
        self.push_metric(&flatten_key_labels(key, labels), val, MetricKind::Gauge);
    }
    fn emit_key(&self, key: &[&str], val: f32) {
        self.push_metric(&flatten_key(key), val, MetricKind::KeyValue);
    }
    fn emit_key_with_labels(&self, key: &[&str], val: f32, labels: &[Label]) {
        self.push_metric(&flatten_key_labels(key, labels), val, MetricKind::KeyValue);
    }
    fn incr_counter(&self, key: &[&str], val: f32) {
        self.push_metric(&flatten_key(key), val, MetricKind::Counter);
    }
    fn incr_counter_with_labels(&self, key: &[&str], val: f32, labels: &[Label]) {
        self.push_metric(&flatten_key_labels(key, labels), val, MetricKind::Counter);
    }
    fn add_sample(&self, key: &[&str], val: f32) {
        self.push_metric(&flatten_key(key), val, MetricKind::Sample);
    }
    fn add_sample_with_labels(&self, key: &[&str], val: f32, labels: &[Label]) {
        self.push_metric(&flatten_key_labels(key, labels), val, MetricKind::Sample);
    }
    fn shutdown(&self) {
        if self.queue.is_closed() {
            return;
        }
        debug!(addr = %self.addr, "Shutting down statsite sink");
        self.queue.close();
    }
}

/// Discards everything, for when metrics are turned off.
#[derive(Clone, Copy, Debug, Default)]
pub struct NopSink;

impl MetricSink for NopSink {
    fn set_gauge(&self, _key: &[&str], _val: f32) {}
    fn set_gauge_with_labels(&self, _key: &[&str], _val: f32, _labels: &[Label]) {}
    fn emit_key(&self, _key: &[&str], _val: f32) {}
    fn emit_key_with_labels(&self, _key: &[&str], _val: f32, _labels: &[Label]) {}
    fn incr_counter(&self, _key: &[&str], _val: f32) {}
    fn incr_counter_with_labels(&self, _key: &[&str], _val: f32, _labels: &[Label]) {}
    fn add_sample(&self, _key: &[&str], _val: f32) {}
    fn add_sample_with_labels(&self, _key: &[&str], _val: f32, _labels: &[Label]) {}
    fn shutdown(&self) {}
}
