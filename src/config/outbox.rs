//! Outbox Relay tuning (spec §4.6).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    /// How often the relay polls for unprocessed events, in seconds.
    pub poll_interval_secs: u64,
    /// Max events fetched per poll.
    pub batch_size: u32,
    /// Events within a batch are dispatched this many at a time.
    pub dispatch_concurrency: usize,
    /// Publish attempts before an event is routed to the DLQ.
    pub max_retries: u32,
    /// Delay before the next publish attempt after a failure, in seconds.
    pub retry_delay_secs: u64,
    /// How often the retry sweep re-checks events past their `next_attempt`, in seconds.
    pub retry_sweep_interval_secs: u64,
    /// How often the cleanup pass runs, in seconds.
    pub cleanup_interval_secs: u64,
    /// Processed (or DLQ-routed) events older than this are deleted, in hours.
    pub cleanup_retention_hours: i64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            batch_size: 100,
            dispatch_concurrency: 10,
            max_retries: 3,
            retry_delay_secs: 30,
            retry_sweep_interval_secs: 60,
            cleanup_interval_secs: 3600,
            cleanup_retention_hours: 24,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = OutboxConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.dispatch_concurrency, 10);
    }
}
