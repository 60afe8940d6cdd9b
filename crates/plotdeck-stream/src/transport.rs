//! Transport adapter seam: signals, live connections, and connectors.
//!
//! A [`Connection`] wraps exactly one physical connection (an SSE stream or
//! a WebSocket). It emits a small closed set of [`TransportSignal`]s over a
//! channel, which lets the supervisor's state machine be unit-tested by
//! feeding synthetic signals without a real network. A successful
//! [`Connector::connect`] *is* the open signal; the channel then carries
//! message, error, and close signals until teardown.

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{StreamError, StreamResult};

/// Signal channel depth; inbound bursts beyond this apply backpressure to
/// the transport's I/O task rather than growing without bound.
pub const SIGNAL_CHANNEL_CAPACITY: usize = 256;

/// Signals a live connection can emit, in delivery order.
#[derive(Debug)]
pub enum TransportSignal {
    /// One logical inbound message (raw wire text).
    Message(String),
    /// A transport-level failure on the open connection.
    Error(StreamError),
    /// The connection closed, normally or otherwise.
    Closed {
        /// Close reason reported by the peer or transport, when known.
        reason: Option<String>,
    },
}

/// Which way messages can flow on a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// One-way server push (the activity feed).
    Push,
    /// Bidirectional socket (the generation-progress channel).
    Socket,
}

/// A single live physical connection owned by the supervisor.
///
/// Dropping (or [`Connection::close`]-ing) the handle aborts the attached
/// I/O task, so a superseded connection can never deliver signals into a
/// newer one's place.
#[derive(Debug)]
pub struct Connection {
    signals: mpsc::Receiver<TransportSignal>,
    outbound: Option<mpsc::Sender<String>>,
    io_task: Option<tokio::task::JoinHandle<()>>,
}

impl Connection {
    /// Build an in-memory push connection; the returned sender feeds
    /// signals into it.
    pub fn push(capacity: usize) -> (mpsc::Sender<TransportSignal>, Self) {
        let (signal_tx, signals) = mpsc::channel(capacity);
        (
            signal_tx,
            Self {
                signals,
                outbound: None,
                io_task: None,
            },
        )
    }

    /// Build an in-memory duplex connection; the second half receives
    /// outbound wire text.
    pub fn duplex(
        capacity: usize,
    ) -> (mpsc::Sender<TransportSignal>, mpsc::Receiver<String>, Self) {
        let (signal_tx, signals) = mpsc::channel(capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        (
            signal_tx,
            outbound_rx,
            Self {
                signals,
                outbound: Some(outbound_tx),
                io_task: None,
            },
        )
    }

    /// Attach the background I/O task that owns the physical stream.
    pub fn with_io_task(mut self, handle: tokio::task::JoinHandle<()>) -> Self {
        self.io_task = Some(handle);
        self
    }

    /// Receive the next signal; `None` once the connection is torn down.
    pub async fn recv(&mut self) -> Option<TransportSignal> {
        self.signals.recv().await
    }

    /// Whether this connection carries an outbound lane.
    pub fn is_bidirectional(&self) -> bool {
        self.outbound.is_some()
    }

    /// Queue raw wire text on the outbound lane without waiting.
    pub fn try_send(&self, text: String) -> StreamResult<()> {
        let Some(outbound) = &self.outbound else {
            return Err(StreamError::SendFailed(
                "transport is push-only; no outbound lane".into(),
            ));
        };
        outbound
            .try_send(text)
            .map_err(|e| StreamError::SendFailed(e.to_string()))
    }

    /// Tear the connection down: drop the outbound lane, abort the I/O
    /// task, and stop accepting signals.
    pub fn close(&mut self) {
        self.outbound = None;
        self.signals.close();
        if let Some(task) = self.io_task.take() {
            task.abort();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(task) = self.io_task.take() {
            task.abort();
        }
    }
}

/// Seam between the connection supervisor and the physical transports.
///
/// One call establishes one physical connection; the supervisor owns at
/// most one [`Connection`] at a time and calls again on every reconnect
/// attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish one physical connection. Resolving `Ok` is the open
    /// signal; errors feed the supervised retry path.
    async fn connect(&self, endpoint: &Url) -> StreamResult<Connection>;

    /// Whether connections from this connector carry an outbound lane.
    fn kind(&self) -> TransportKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_connection_delivers_in_order() {
        let (signal_tx, mut connection) = Connection::push(8);

        signal_tx
            .send(TransportSignal::Message("one".into()))
            .await
            .unwrap();
        signal_tx
            .send(TransportSignal::Closed { reason: None })
            .await
            .unwrap();

        assert!(matches!(
            connection.recv().await,
            Some(TransportSignal::Message(text)) if text == "one"
        ));
        assert!(matches!(
            connection.recv().await,
            Some(TransportSignal::Closed { reason: None })
        ));

        drop(signal_tx);
        assert!(connection.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_push_connection_has_no_outbound_lane() {
        let (_signal_tx, connection) = Connection::push(8);
        assert!(!connection.is_bidirectional());
        assert!(matches!(
            connection.try_send("ping".into()),
            Err(StreamError::SendFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_duplex_connection_round_trip() {
        let (_signal_tx, mut outbound_rx, connection) = Connection::duplex(8);
        assert!(connection.is_bidirectional());

        connection.try_send(r#"{"type":"ping"}"#.into()).unwrap();
        assert_eq!(outbound_rx.recv().await.unwrap(), r#"{"type":"ping"}"#);
    }

    #[tokio::test]
    async fn test_close_aborts_io_task_and_outbound() {
        let (_signal_tx, mut outbound_rx, connection) = Connection::duplex(8);
        let task = tokio::spawn(async {
            std::future::pending::<()>().await;
        });
        let mut connection = connection.with_io_task(task);

        connection.close();
        assert!(connection.try_send("late".into()).is_err());
        // Outbound lane is gone, so the receiving half drains to None.
        assert!(outbound_rx.recv().await.is_none());
    }
}
