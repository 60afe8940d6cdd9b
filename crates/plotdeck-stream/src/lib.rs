//! # Plotdeck Stream
//!
//! Resilient real-time stream client for the Plotdeck writing dashboard.
//! The crate keeps a live, long-running connection to a server-push
//! endpoint, survives network interruptions, detects silently dead
//! connections, and hands ordered, deduplicated, bounded-memory message
//! streams to UI consumers.
//!
//! ## Channels
//!
//! - **Activity feed**: one-way push over Server-Sent Events; newest-first
//!   consumption for feed-style widgets
//! - **Generation progress**: bidirectional WebSocket with heartbeat
//!   liveness probing; sequence-ascending consumption for streaming text
//!
//! ## Reliability Features
//!
//! - **Supervised Reconnection**: exponential backoff with 10-20% jitter,
//!   terminal error state after the retry budget is spent
//! - **Heartbeat Liveness**: application-level ping/pong with a traffic
//!   deadline that catches connections proxies killed silently
//! - **Bounded Buffering**: fixed-capacity event buffer with
//!   oldest-entry eviction and a dedup window over recent message ids
//! - **Health Reporting**: attempt counts, timestamps, and latency-based
//!   connection quality for UI display
//!
//! ## Module Organization
//!
//! ```text
//! plotdeck-stream/
//! ├── client.rs      # StreamClient facade and consumer callbacks
//! ├── supervisor.rs  # Connect/reconnect state machine driver
//! ├── transport.rs   # Transport signals, connections, connector seam
//! ├── sse.rs         # SSE push adapter (feature "sse")
//! ├── websocket.rs   # WebSocket adapter (feature "websocket")
//! ├── heartbeat.rs   # Liveness probing and link quality
//! ├── router.rs      # Payload validation, classification, dedup
//! ├── buffer.rs      # Bounded ordered event buffer
//! ├── health.rs      # Connection stats aggregation
//! ├── retry.rs       # Backoff/jitter policy
//! ├── message.rs     # Message model and wire shapes
//! └── config.rs      # Client configuration
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use plotdeck_stream::{NoopHandler, StreamClient, StreamClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StreamClientConfig::feed("https://dashboard.plotdeck.dev/api/feed")
//!         .with_max_events(50)
//!         .with_high_priority_kinds(["decision_required"]);
//!
//!     let client = StreamClient::new(config, Arc::new(NoopHandler))?;
//!     client.connect().await?;
//!
//!     // ... later, from a render loop:
//!     let feed = client.snapshot().await;
//!     let health = client.report().await;
//!     println!("{} events, quality {:?}", feed.len(), health.quality);
//!     Ok(())
//! }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]

pub mod buffer;
pub mod client;
pub mod config;
pub mod error;
pub mod health;
pub mod heartbeat;
pub mod message;
pub mod retry;
pub mod router;
pub mod supervisor;
pub mod transport;

#[cfg(feature = "sse")]
pub mod sse;

#[cfg(feature = "websocket")]
pub mod websocket;

// Re-export the caller-facing surface
pub use buffer::{BufferOrder, EventBuffer};
pub use client::{NoopHandler, StreamClient, StreamHandler};
pub use config::{ChannelProfile, StreamClientConfig};
pub use error::{StreamError, StreamResult};
pub use health::{ConnectionStats, HealthReport};
pub use heartbeat::{HeartbeatConfig, HeartbeatSample, LinkQuality};
pub use message::{FeedEvent, ProgressUpdate, Severity, StreamMessage};
pub use retry::RetryPolicy;
pub use router::{MessageRouter, RouteOutcome};
pub use supervisor::ConnectionState;
pub use transport::{Connection, Connector, TransportKind, TransportSignal};

#[cfg(feature = "sse")]
pub use sse::SseConnector;

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnector;
