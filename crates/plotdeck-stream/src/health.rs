//! Passive aggregation of connection health for UI display.
//!
//! The reporter only ever records what the supervisor and heartbeat
//! monitor tell it; it has no side effects and never influences the state
//! machine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::heartbeat::{HeartbeatSample, LinkQuality};
use crate::supervisor::ConnectionState;

/// Counters and timestamps accumulated over a client session.
///
/// `retry_count` resets to zero on every successful open; the remaining
/// fields accumulate until an explicit reset (manual reconnect or
/// disconnect).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionStats {
    /// Consecutive failed attempts in the current reconnect cycle.
    pub retry_count: u32,
    /// Successful re-opens after the first connect.
    pub total_reconnections: u64,
    /// Wall-clock time of the most recent successful open.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Wall-clock time of the most recent connection-level error.
    pub last_error_at: Option<DateTime<Utc>>,
    /// Application messages sent on the outbound lane.
    pub messages_sent: u64,
    /// Application messages delivered to consumers.
    pub messages_received: u64,
    /// Connection-level errors observed.
    pub errors_count: u64,
}

/// Snapshot returned by `report()`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Connection state at snapshot time.
    pub state: ConnectionState,
    /// Accumulated counters and timestamps.
    pub stats: ConnectionStats,
    /// Quality rating from the latest heartbeat sample.
    pub quality: LinkQuality,
    /// Latency of the latest heartbeat sample, when one exists.
    pub last_latency: Option<Duration>,
}

/// Aggregates supervisor and heartbeat events into [`ConnectionStats`].
#[derive(Debug, Default)]
pub struct HealthReporter {
    stats: ConnectionStats,
    quality: LinkQuality,
    last_latency: Option<Duration>,
}

impl HealthReporter {
    /// Create an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// A connection attempt is being retried; `attempt` is the number of
    /// consecutive failures so far.
    pub fn record_retry(&mut self, attempt: u32) {
        self.stats.retry_count = attempt;
    }

    /// A connection opened; `reconnect` marks re-opens after the first.
    pub fn record_connected(&mut self, reconnect: bool) {
        self.stats.retry_count = 0;
        self.stats.last_connected_at = Some(Utc::now());
        if reconnect {
            self.stats.total_reconnections += 1;
        }
    }

    /// A connection-level error occurred.
    pub fn record_error(&mut self) {
        self.stats.errors_count += 1;
        self.stats.last_error_at = Some(Utc::now());
    }

    /// An application message was delivered to consumers.
    pub fn record_message_received(&mut self) {
        self.stats.messages_received += 1;
    }

    /// An application message went out on the outbound lane.
    pub fn record_message_sent(&mut self) {
        self.stats.messages_sent += 1;
    }

    /// A heartbeat round trip completed.
    pub fn record_sample(&mut self, sample: &HeartbeatSample) {
        self.quality = LinkQuality::from_latency(sample.latency);
        self.last_latency = Some(sample.latency);
    }

    /// Explicit reset on manual reconnect/disconnect.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Current accumulated stats.
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Snapshot for UI display.
    pub fn report(&self, state: ConnectionState) -> HealthReport {
        HealthReport {
            state,
            stats: self.stats.clone(),
            quality: self.quality,
            last_latency: self.last_latency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[test]
    fn test_retry_count_resets_on_connect() {
        let mut reporter = HealthReporter::new();
        reporter.record_retry(1);
        reporter.record_retry(2);
        assert_eq!(reporter.stats().retry_count, 2);

        reporter.record_connected(false);
        assert_eq!(reporter.stats().retry_count, 0);
        assert!(reporter.stats().last_connected_at.is_some());
        assert_eq!(reporter.stats().total_reconnections, 0);
    }

    #[test]
    fn test_reconnections_accumulate() {
        let mut reporter = HealthReporter::new();
        reporter.record_connected(false);
        reporter.record_connected(true);
        reporter.record_connected(true);
        assert_eq!(reporter.stats().total_reconnections, 2);
    }

    #[test]
    fn test_errors_and_messages_accumulate() {
        let mut reporter = HealthReporter::new();
        reporter.record_error();
        reporter.record_message_received();
        reporter.record_message_received();
        reporter.record_message_sent();

        let stats = reporter.stats();
        assert_eq!(stats.errors_count, 1);
        assert_eq!(stats.messages_received, 2);
        assert_eq!(stats.messages_sent, 1);
        assert!(stats.last_error_at.is_some());
    }

    #[test]
    fn test_sample_drives_quality() {
        let mut reporter = HealthReporter::new();
        let report = reporter.report(ConnectionState::Connected);
        assert_eq!(report.quality, LinkQuality::Unknown);
        assert!(report.last_latency.is_none());

        let now = Instant::now();
        reporter.record_sample(&HeartbeatSample {
            sent_at: now,
            received_at: now + Duration::from_millis(300),
            latency: Duration::from_millis(300),
        });

        let report = reporter.report(ConnectionState::Connected);
        assert_eq!(report.quality, LinkQuality::Good);
        assert_eq!(report.last_latency, Some(Duration::from_millis(300)));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut reporter = HealthReporter::new();
        reporter.record_connected(false);
        reporter.record_connected(true);
        reporter.record_error();
        reporter.record_message_received();

        reporter.reset();
        let stats = reporter.stats();
        assert_eq!(stats.total_reconnections, 0);
        assert_eq!(stats.errors_count, 0);
        assert_eq!(stats.messages_received, 0);
        assert!(stats.last_connected_at.is_none());
    }
}
