//! statsite-sink ships metrics from a Rust application to a [statsite](https://github.com/statsite/statsite)
//! server over a persistent TCP connection, using statsite's line protocol.
//!
//! Emitting a metric never blocks and never fails. Each call formats one line and pushes it onto a
//! bounded queue; a background thread owns the connection, buffers lines and flushes them every 100ms.
//! If the connection can't be made or breaks, the thread logs the error, throws away whatever gets
//! emitted for the next 5 seconds and then reconnects. When the queue is full new metrics are dropped.
//! Delivery is best-effort: an outage shows up as a gap in statsite's data, not as an error in your
//! application.
//!
//! ### Example
//!
//! ```no_run
//! use statsite_sink::*;
//!
//! let sink = StatsiteSink::new("127.0.0.1:8125").expect("Failed to instantiate sink!");
//! sink.incr_counter(&["api", "requests"], 1.0);
//! sink.set_gauge_with_labels(&["api", "pool size"], 8.0, &[Label::new("region", "us-east")]);
//! sink.add_sample(&["api", "latency"], 12.5);
//! // Sends `api.requests:1|c`, `api.pool_size.us-east:8|g` and `api.latency:12.5|ms`.
//! sink.shutdown();
//! ```
//!
//! ## Keys
//!
//! Keys are slices of segments joined with `.`. Spaces and colons become `_`; nothing else is
//! escaped, so keep `|` and newlines out of your segments. Label values are appended as extra
//! segments, label names are not sent.
//!
//! ## Configuration
//!
//! The flush interval, reconnect backoff and queue capacity can be changed at construction time:
//!
//! ```no_run
//! use std::time::Duration;
//! use statsite_sink::*;
//!
//! let config = SinkConfig::default()
//!     .with_flush_interval(Duration::from_millis(250))
//!     .with_reconnect_backoff(Duration::from_secs(1));
//! let sink = StatsiteSink::from_url_with_config("statsite://metrics.internal:8125", config)
//!     .expect("Failed to instantiate sink!");
//! # sink.shutdown();
//! ```
//!
//! ## Logging
//!
//! Connection, write and flush failures are logged with [tracing] at error level. The worker thread
//! logs through whichever subscriber was the default when the sink was built.

/// [StatsiteSink] and the [MetricSink] interface it implements.
pub mod client;
pub mod config;
/// Key flattening and line encoding.
pub mod metric;
mod queue;
mod worker;

pub use client::{MetricSink, NopSink, SinkError, StatsiteSink, DEFAULT_PORT};
pub use config::SinkConfig;
pub use metric::*;
pub use worker::WorkerState;
