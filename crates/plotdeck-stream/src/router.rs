//! Inbound payload validation, classification, and deduplication.
//!
//! The router fails closed: unparsable payloads and payloads missing
//! required fields are dropped with a warning and never touch connection
//! health. Valid messages are classified against a configured kind→priority
//! lookup table, so new high-priority kinds are a configuration change, not
//! a code change.

use std::collections::VecDeque;

use ahash::AHashSet;
use tracing::{trace, warn};

use crate::config::ChannelProfile;
use crate::error::StreamError;
use crate::message::{ControlFrame, InboundFrame, StreamMessage, parse_frame};

/// Bounded history of recently seen message ids.
///
/// Holds roughly twice the configured dedup window; at capacity the oldest
/// half is evicted in one batch, trading a small amortized memory spike for
/// O(1) amortized insertion.
#[derive(Debug)]
pub struct DedupWindow {
    seen: AHashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl DedupWindow {
    /// Create a history covering the given dedup window.
    pub fn new(window: usize) -> Self {
        let capacity = window.max(1) * 2;
        Self {
            seen: AHashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record an id; returns `false` when it was already in the window.
    pub fn observe(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            // Batch-evict the oldest half rather than one-at-a-time.
            for stale in self.order.drain(..self.capacity / 2) {
                self.seen.remove(&stale);
            }
        }
        self.seen.insert(id.to_string());
        self.order.push_back(id.to_string());
        true
    }

    /// Number of ids currently tracked.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Forget all tracked ids.
    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }
}

/// Outcome of routing one raw payload.
#[derive(Debug)]
pub enum RouteOutcome {
    /// A valid, fresh application message.
    Delivered {
        /// The validated message.
        message: StreamMessage,
        /// Whether its kind is in the high-priority table.
        high_priority: bool,
    },
    /// A liveness control frame for the heartbeat monitor.
    Control(ControlFrame),
    /// Already seen within the dedup window; dropped silently.
    Duplicate,
    /// Malformed or incomplete; dropped with a warning.
    Rejected(StreamError),
}

/// Validates and classifies inbound payloads for one channel.
#[derive(Debug)]
pub struct MessageRouter {
    profile: ChannelProfile,
    high_priority: AHashSet<String>,
    dedup: DedupWindow,
}

impl MessageRouter {
    /// Create a router for the given channel profile.
    pub fn new(
        profile: ChannelProfile,
        high_priority_kinds: impl IntoIterator<Item = String>,
        dedup_window: usize,
    ) -> Self {
        Self {
            profile,
            high_priority: high_priority_kinds.into_iter().collect(),
            dedup: DedupWindow::new(dedup_window),
        }
    }

    /// Parse, validate, deduplicate, and classify one raw payload.
    pub fn route(&mut self, raw: &str) -> RouteOutcome {
        let frame = match parse_frame(raw, self.profile) {
            Ok(frame) => frame,
            Err(error) => {
                warn!("dropping malformed payload: {error}");
                return RouteOutcome::Rejected(error);
            }
        };

        let message = match frame {
            InboundFrame::Control(control) => return RouteOutcome::Control(control),
            InboundFrame::Message(message) => *message,
        };

        if !self.dedup.observe(&message.id) {
            trace!(id = %message.id, "dropping duplicate message");
            return RouteOutcome::Duplicate;
        }

        RouteOutcome::Delivered {
            high_priority: self.high_priority.contains(&message.kind),
            message,
        }
    }
}
