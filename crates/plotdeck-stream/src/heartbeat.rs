//! Liveness probing and latency-based connection quality.
//!
//! Long-lived push connections behind proxies can die without a
//! transport-level error or close ever firing. The monitor catches this by
//! keeping a liveness deadline that only inbound traffic can push forward;
//! when the deadline passes while the client still believes it is
//! connected, the supervisor force-closes and reconnects.
//!
//! Policy on the progress channel: *any* inbound traffic resets the
//! deadline (a busy stream is evidently alive), but latency is measured
//! only from an explicit pong answering our ping, so the quality rating
//! never guesses.

use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use crate::error::{StreamError, StreamResult};

/// Heartbeat configuration for bidirectional channels.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// How often to send a ping probe.
    pub interval: Duration,
    /// How long the connection may stay silent before it is presumed dead.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(60),
        }
    }
}

impl HeartbeatConfig {
    /// Create a heartbeat configuration with the default cadence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the probe interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the liveness timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check the configuration for inconsistent values.
    pub fn validate(&self) -> StreamResult<()> {
        if self.interval >= self.timeout {
            return Err(StreamError::Configuration(format!(
                "heartbeat interval {:?} must be shorter than the liveness timeout {:?}",
                self.interval, self.timeout
            )));
        }
        Ok(())
    }
}

/// Qualitative connection rating derived from the latest round-trip.
///
/// Informational only; the rating never triggers reconnection itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkQuality {
    /// Round-trip under 200ms.
    Excellent,
    /// Round-trip under 500ms.
    Good,
    /// Round-trip at or above 500ms.
    Poor,
    /// No sample yet.
    #[default]
    Unknown,
}

impl LinkQuality {
    /// Rate a measured round-trip latency.
    pub fn from_latency(latency: Duration) -> Self {
        if latency < Duration::from_millis(200) {
            Self::Excellent
        } else if latency < Duration::from_millis(500) {
            Self::Good
        } else {
            Self::Poor
        }
    }
}

/// One measured ping/pong round trip. Only the most recent sample is
/// retained.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatSample {
    /// When the probe went out.
    pub sent_at: Instant,
    /// When the matching pong came back.
    pub received_at: Instant,
    /// `received_at - sent_at`.
    pub latency: Duration,
}

/// Tracks probe cadence, the liveness deadline, and the latest sample for
/// one connection.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    ping_seq: u64,
    outstanding: Option<Instant>,
    last_sample: Option<HeartbeatSample>,
    deadline: Instant,
}

impl HeartbeatMonitor {
    /// Create a monitor; call [`HeartbeatMonitor::on_connected`] when the
    /// connection opens.
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            ping_seq: 0,
            outstanding: None,
            last_sample: None,
            deadline: Instant::now() + config.timeout,
        }
    }

    /// The configured cadence.
    pub fn config(&self) -> HeartbeatConfig {
        self.config
    }

    /// Arm the monitor for a freshly opened connection.
    pub fn on_connected(&mut self, now: Instant) {
        self.outstanding = None;
        self.deadline = now + self.config.timeout;
    }

    /// Build the next ping frame and record it as outstanding.
    pub fn next_ping(&mut self, now: Instant) -> String {
        self.ping_seq += 1;
        self.outstanding = Some(now);
        json!({
            "type": "ping",
            "seq": self.ping_seq,
            "timestamp": chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        })
        .to_string()
    }

    /// Any inbound traffic pushes the liveness deadline forward.
    pub fn on_traffic(&mut self, now: Instant) {
        self.deadline = now + self.config.timeout;
    }

    /// An explicit pong settles the outstanding probe into a sample.
    pub fn on_pong(&mut self, now: Instant) -> Option<HeartbeatSample> {
        self.on_traffic(now);
        let sent_at = self.outstanding.take()?;
        let sample = HeartbeatSample {
            sent_at,
            received_at: now,
            latency: now.duration_since(sent_at),
        };
        self.last_sample = Some(sample);
        Some(sample)
    }

    /// Instant after which the connection is presumed dead.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// How long the connection has been silent past its deadline.
    pub fn silent_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.deadline) + self.config.timeout
    }

    /// The most recent round-trip sample.
    pub fn last_sample(&self) -> Option<HeartbeatSample> {
        self.last_sample
    }

    /// Quality rating from the latest sample; `Unknown` before the first.
    pub fn quality(&self) -> LinkQuality {
        self.last_sample
            .map_or(LinkQuality::Unknown, |sample| {
                LinkQuality::from_latency(sample.latency)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_thresholds() {
        assert_eq!(
            LinkQuality::from_latency(Duration::from_millis(50)),
            LinkQuality::Excellent
        );
        assert_eq!(
            LinkQuality::from_latency(Duration::from_millis(199)),
            LinkQuality::Excellent
        );
        assert_eq!(
            LinkQuality::from_latency(Duration::from_millis(200)),
            LinkQuality::Good
        );
        assert_eq!(
            LinkQuality::from_latency(Duration::from_millis(499)),
            LinkQuality::Good
        );
        assert_eq!(
            LinkQuality::from_latency(Duration::from_millis(500)),
            LinkQuality::Poor
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(HeartbeatConfig::default().validate().is_ok());

        let inverted = HeartbeatConfig::new()
            .with_interval(Duration::from_secs(60))
            .with_timeout(Duration::from_secs(30));
        assert!(inverted.validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_settles_latency_sample() {
        let mut monitor = HeartbeatMonitor::new(HeartbeatConfig::default());
        let start = Instant::now();
        monitor.on_connected(start);
        assert_eq!(monitor.quality(), LinkQuality::Unknown);

        let ping = monitor.next_ping(Instant::now());
        assert!(ping.contains(r#""type":"ping""#));

        tokio::time::advance(Duration::from_millis(150)).await;
        let sample = monitor.on_pong(Instant::now()).unwrap();
        assert_eq!(sample.latency, Duration::from_millis(150));
        assert_eq!(monitor.quality(), LinkQuality::Excellent);

        // A second pong with no outstanding ping yields no sample.
        assert!(monitor.on_pong(Instant::now()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_traffic_pushes_deadline_forward() {
        let config = HeartbeatConfig::new()
            .with_interval(Duration::from_secs(5))
            .with_timeout(Duration::from_secs(10));
        let mut monitor = HeartbeatMonitor::new(config);
        monitor.on_connected(Instant::now());
        let original_deadline = monitor.deadline();

        tokio::time::advance(Duration::from_secs(8)).await;
        monitor.on_traffic(Instant::now());
        assert!(monitor.deadline() > original_deadline);
        assert_eq!(monitor.deadline(), Instant::now() + Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_rearms_deadline_and_clears_outstanding() {
        let mut monitor = HeartbeatMonitor::new(HeartbeatConfig::default());
        monitor.on_connected(Instant::now());
        let _ping = monitor.next_ping(Instant::now());

        tokio::time::advance(Duration::from_secs(5)).await;
        monitor.on_connected(Instant::now());

        // The pre-reconnect ping must not produce a sample.
        assert!(monitor.on_pong(Instant::now()).is_none());
        assert_eq!(monitor.deadline(), Instant::now() + Duration::from_secs(60));
    }
}
