use std::{num::NonZeroUsize, time::Duration};

use nonzero_ext::nonzero;

// Buffered lines are forced out after this long so they can't get stuck
// in the write buffer.
const DEFAULT_FLUSH_INTERVAL_MILLIS: u64 = 100;
const DEFAULT_RECONNECT_BACKOFF_MILLIS: u64 = 5_000;
const DEFAULT_QUEUE_CAPACITY: NonZeroUsize = nonzero!(4096usize);

/// Construction-time settings for a [StatsiteSink](crate::StatsiteSink).
/// Anything left unset falls back to the statsite defaults.
#[derive(Clone, Debug, Default)]
pub struct SinkConfig {
    /// How often buffered lines are flushed to the socket. Default is 100ms.
    pub flush_interval: Option<Duration>,
    /// How long to discard metrics after a connection failure before
    /// reconnecting. Fixed, not exponential. Default is 5 seconds.
    pub reconnect_backoff: Option<Duration>,
    /// Lines that can be waiting on the worker before new ones get dropped.
    pub queue_capacity: Option<NonZeroUsize>,
}

impl SinkConfig {
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = Some(flush_interval);
        self
    }
    pub fn with_reconnect_backoff(mut self, reconnect_backoff: Duration) -> Self {
        self.reconnect_backoff = Some(reconnect_backoff);
        self
    }
    pub fn with_queue_capacity(mut self, queue_capacity: NonZeroUsize) -> Self {
        self.queue_capacity = Some(queue_capacity);
        self
    }
    pub fn get_flush_interval(&self) -> Duration {
        self.flush_interval
            .unwrap_or(Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MILLIS))
    }
    pub fn get_reconnect_backoff(&self) -> Duration {
        self.reconnect_backoff
            .unwrap_or(Duration::from_millis(DEFAULT_RECONNECT_BACKOFF_MILLIS))
    }
    pub fn get_queue_capacity(&self) -> NonZeroUsize {
        self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SinkConfig::default();
        assert_eq!(config.get_flush_interval(), Duration::from_millis(100));
        assert_eq!(config.get_reconnect_backoff(), Duration::from_secs(5));
        assert_eq!(config.get_queue_capacity().get(), 4096);
    }

    #[test]
    fn test_overrides() {
        let config = SinkConfig::default()
            .with_flush_interval(Duration::from_millis(10))
            .with_reconnect_backoff(Duration::from_millis(250))
            .with_queue_capacity(nonzero!(8usize));
        assert_eq!(config.get_flush_interval(), Duration::from_millis(10));
        assert_eq!(config.get_reconnect_backoff(), Duration::from_millis(250));
        assert_eq!(config.get_queue_capacity().get(), 8);
    }
}
