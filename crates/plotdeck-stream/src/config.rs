//! Stream client configuration.
//!
//! All knobs are explicit construction-time values; nothing is read from
//! the environment. Endpoints are plain URLs validated up front so a typo
//! fails at build time instead of as an endless reconnect loop.

use std::time::Duration;

use url::Url;

use crate::buffer::BufferOrder;
use crate::error::{StreamError, StreamResult};
use crate::heartbeat::HeartbeatConfig;
use crate::retry::RetryPolicy;

/// Which dashboard channel a client serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelProfile {
    /// One-way activity feed over server push; newest-first consumption.
    Feed,
    /// Bidirectional generation-progress channel; sequence-ascending
    /// consumption with heartbeat liveness.
    Progress,
}

impl ChannelProfile {
    /// Whether this profile runs over a bidirectional transport.
    pub fn is_bidirectional(&self) -> bool {
        matches!(self, Self::Progress)
    }

    /// Buffer ordering policy for this profile.
    pub fn buffer_order(&self) -> BufferOrder {
        match self {
            Self::Feed => BufferOrder::NewestFirst,
            Self::Progress => BufferOrder::SequenceAscending,
        }
    }
}

/// Configuration for one stream client instance.
#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// URL of the push/socket resource.
    pub endpoint: String,

    /// Which channel this client serves.
    pub profile: ChannelProfile,

    /// When false, no connection is ever attempted and the client stays
    /// disconnected.
    pub enabled: bool,

    /// Event buffer capacity.
    pub max_events: usize,

    /// How many recent message ids the dedup history covers.
    pub dedup_window: usize,

    /// Reconnection policy.
    pub retry: RetryPolicy,

    /// Heartbeat cadence (bidirectional profiles only).
    pub heartbeat: HeartbeatConfig,

    /// How long a single connection attempt may take before it counts as
    /// failed.
    pub connect_timeout: Duration,

    /// Message kinds dispatched to the high-priority callback before
    /// buffering (e.g. decisions requiring a synchronous UI response).
    pub high_priority_kinds: Vec<String>,
}

impl StreamClientConfig {
    /// Configuration for the activity feed channel.
    pub fn feed(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            profile: ChannelProfile::Feed,
            enabled: true,
            max_events: 50,
            dedup_window: 100,
            retry: RetryPolicy::default(),
            heartbeat: HeartbeatConfig::default(),
            connect_timeout: Duration::from_secs(10),
            high_priority_kinds: Vec::new(),
        }
    }

    /// Configuration for the generation-progress channel.
    pub fn progress(endpoint: impl Into<String>) -> Self {
        Self {
            profile: ChannelProfile::Progress,
            ..Self::feed(endpoint)
        }
    }

    /// Enable or disable the client; disabled clients never connect.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the event buffer capacity.
    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events;
        self
    }

    /// Set the dedup history window.
    pub fn with_dedup_window(mut self, window: usize) -> Self {
        self.dedup_window = window;
        self
    }

    /// Set the reconnection policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the heartbeat cadence.
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Set the per-attempt connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the high-priority message kinds.
    pub fn with_high_priority_kinds(
        mut self,
        kinds: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.high_priority_kinds = kinds.into_iter().map(Into::into).collect();
        self
    }

    /// Validate the configuration and parse the endpoint.
    pub fn validate(&self) -> StreamResult<Url> {
        if self.max_events == 0 {
            return Err(StreamError::Configuration(
                "max_events must be at least 1".into(),
            ));
        }
        if self.dedup_window == 0 {
            return Err(StreamError::Configuration(
                "dedup_window must be at least 1".into(),
            ));
        }
        self.retry.validate()?;
        if self.profile.is_bidirectional() {
            self.heartbeat.validate()?;
        }

        Url::parse(&self.endpoint).map_err(|e| {
            StreamError::Configuration(format!("invalid endpoint `{}`: {e}", self.endpoint))
        })
    }
}
