//! Caller-facing stream client facade.
//!
//! A [`StreamClient`] owns one supervised connection to a dashboard push
//! endpoint. Consumers register a [`StreamHandler`] for push-style
//! delivery and/or poll [`StreamClient::snapshot`] /
//! [`StreamClient::report`] for the buffered feed and connection health.
//! Multiple clients (one per channel) are fully independent.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{RwLock, mpsc, oneshot};
use uuid::Uuid;

use crate::buffer::EventBuffer;
use crate::config::StreamClientConfig;
use crate::error::{StreamError, StreamResult};
use crate::health::{HealthReport, HealthReporter};
use crate::heartbeat::HeartbeatMonitor;
use crate::message::StreamMessage;
use crate::router::MessageRouter;
use crate::supervisor::{Command, ConnectionState, Supervisor};
use crate::transport::Connector;

/// Consumer callbacks, invoked synchronously within the event-loop turn
/// that processed the underlying signal. Implementations must not block.
///
/// All methods default to no-ops so consumers implement only what they
/// need.
pub trait StreamHandler: Send + Sync + 'static {
    /// A validated message was delivered and buffered.
    fn on_message(&self, message: &StreamMessage) {
        let _ = message;
    }

    /// A message of a configured high-priority kind arrived; invoked
    /// before the message enters the buffer.
    fn on_high_priority_message(&self, message: &StreamMessage) {
        let _ = message;
    }

    /// A connection was established.
    fn on_connect(&self) {}

    /// The connection went away, with the close reason when known.
    fn on_disconnect(&self, reason: Option<&str>) {
        let _ = reason;
    }

    /// A failure was observed; see [`StreamError`] for the taxonomy.
    fn on_error(&self, error: &StreamError) {
        let _ = error;
    }
}

/// Handler for callers that only poll snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl StreamHandler for NoopHandler {}

/// A resilient client for one dashboard push channel.
///
/// Dropping the client disposes it: the driver task is aborted, the active
/// connection (if any) is torn down, and no callback fires afterwards.
#[derive(Debug)]
pub struct StreamClient {
    commands: mpsc::Sender<Command>,
    state: Arc<RwLock<ConnectionState>>,
    buffer: Arc<RwLock<EventBuffer>>,
    health: Arc<RwLock<HealthReporter>>,
    disposed: Arc<AtomicBool>,
    driver: tokio::task::JoinHandle<()>,
    session_id: String,
}

impl StreamClient {
    /// Create a client with the transport implied by the channel profile
    /// (SSE for the feed, WebSocket for the progress channel).
    pub fn new(
        config: StreamClientConfig,
        handler: Arc<dyn StreamHandler>,
    ) -> StreamResult<Self> {
        let connector = default_connector(&config)?;
        Self::with_connector(config, handler, connector)
    }

    /// Create a client over an explicit connector. This is the seam the
    /// test suite uses to drive the state machine with synthetic signals.
    pub fn with_connector(
        config: StreamClientConfig,
        handler: Arc<dyn StreamHandler>,
        connector: Arc<dyn Connector>,
    ) -> StreamResult<Self> {
        let endpoint = config.validate()?;
        let session_id = Uuid::new_v4().to_string();

        let (commands, command_rx) = mpsc::channel(32);
        let state = Arc::new(RwLock::new(ConnectionState::Idle));
        let buffer = Arc::new(RwLock::new(EventBuffer::new(
            config.max_events,
            config.profile.buffer_order(),
        )));
        let health = Arc::new(RwLock::new(HealthReporter::new()));
        let disposed = Arc::new(AtomicBool::new(false));

        let supervisor = Supervisor {
            router: MessageRouter::new(
                config.profile,
                config.high_priority_kinds.clone(),
                config.dedup_window,
            ),
            heartbeat: HeartbeatMonitor::new(config.heartbeat),
            config,
            endpoint,
            connector,
            handler,
            commands: command_rx,
            state: Arc::clone(&state),
            buffer: Arc::clone(&buffer),
            health: Arc::clone(&health),
            disposed: Arc::clone(&disposed),
            attempt: 0,
            ever_connected: false,
            session_id: session_id.clone(),
        };
        let driver = tokio::spawn(supervisor.run());

        Ok(Self {
            commands,
            state,
            buffer,
            health,
            disposed,
            driver,
            session_id,
        })
    }

    /// Idempotently establish a connection. A disabled client ignores the
    /// request and stays disconnected.
    pub async fn connect(&self) -> StreamResult<()> {
        self.disposed.store(false, Ordering::SeqCst);
        self.command(Command::Connect).await
    }

    /// Tear down the connection and cancel all pending timers. Returns
    /// once teardown is complete; no callback fires afterwards and no
    /// reconnect is scheduled until [`StreamClient::connect`] or
    /// [`StreamClient::reconnect`] is called again.
    pub async fn disconnect(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Disconnect(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Manual retry: clears a terminal error, resets the attempt counter
    /// and accumulated stats, then connects.
    pub async fn reconnect(&self) -> StreamResult<()> {
        self.disposed.store(false, Ordering::SeqCst);
        self.command(Command::Reconnect).await
    }

    /// Queue a JSON payload on the outbound lane (bidirectional channels
    /// only). Delivery failures surface through `on_error`.
    pub async fn send(&self, payload: &serde_json::Value) -> StreamResult<()> {
        self.command(Command::Send(payload.to_string())).await
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// An immutable copy of the buffered messages, in buffer order.
    pub async fn snapshot(&self) -> Vec<StreamMessage> {
        self.buffer.read().await.snapshot()
    }

    /// Connection health snapshot for UI display.
    pub async fn report(&self) -> HealthReport {
        let state = self.state().await;
        self.health.read().await.report(state)
    }

    /// Unique id for this client instance, tagged on its log output.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn command(&self, command: Command) -> StreamResult<()> {
        self.commands.send(command).await.map_err(|_| {
            StreamError::ConnectionFailed("stream client driver has stopped".into())
        })
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.driver.abort();
    }
}

/// Pick the transport implied by the channel profile.
fn default_connector(config: &StreamClientConfig) -> StreamResult<Arc<dyn Connector>> {
    match config.profile {
        #[cfg(feature = "sse")]
        crate::config::ChannelProfile::Feed => Ok(Arc::new(crate::sse::SseConnector::new())),
        #[cfg(feature = "websocket")]
        crate::config::ChannelProfile::Progress => {
            Ok(Arc::new(crate::websocket::WebSocketConnector::new()))
        }
        #[cfg(not(all(feature = "sse", feature = "websocket")))]
        profile => Err(StreamError::Configuration(format!(
            "no transport compiled in for the {profile:?} profile"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Connection, TransportKind};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;
    use url::Url;

    /// Connector that counts attempts and hands out idle push connections.
    #[derive(Debug, Default)]
    struct CountingConnector {
        attempts: AtomicU32,
        held: std::sync::Mutex<Vec<tokio::sync::mpsc::Sender<crate::transport::TransportSignal>>>,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn connect(&self, _endpoint: &Url) -> StreamResult<Connection> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let (signal_tx, connection) = Connection::push(8);
            // Hold the sender so the connection stays open for the test.
            self.held.lock().unwrap().push(signal_tx);
            Ok(connection)
        }

        fn kind(&self) -> TransportKind {
            TransportKind::Push
        }
    }

    fn test_config() -> StreamClientConfig {
        StreamClientConfig::feed("https://plotdeck.local/api/feed")
    }

    #[test]
    fn test_invalid_config_is_rejected_up_front() {
        let config = StreamClientConfig::feed("definitely not a url");
        let result = StreamClient::with_connector(
            config,
            Arc::new(NoopHandler),
            Arc::new(CountingConnector::default()),
        );
        assert!(matches!(result, Err(StreamError::Configuration(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_client_never_connects() {
        let connector = Arc::new(CountingConnector::default());
        let client = StreamClient::with_connector(
            test_config().with_enabled(false),
            Arc::new(NoopHandler),
            Arc::clone(&connector) as Arc<dyn Connector>,
        )
        .unwrap();

        client.connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(client.state().await, ConnectionState::Disconnected);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_idempotent() {
        let connector = Arc::new(CountingConnector::default());
        let client = StreamClient::with_connector(
            test_config(),
            Arc::new(NoopHandler),
            Arc::clone(&connector) as Arc<dyn Connector>,
        )
        .unwrap();

        client.connect().await.unwrap();
        client.connect().await.unwrap();
        client.connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(client.state().await, ConnectionState::Connected);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_state_is_idle() {
        let client = StreamClient::with_connector(
            test_config(),
            Arc::new(NoopHandler),
            Arc::new(CountingConnector::default()),
        )
        .unwrap();

        assert_eq!(client.state().await, ConnectionState::Idle);
        assert!(client.snapshot().await.is_empty());
        assert!(!client.session_id().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_completes_and_lands_disconnected() {
        let client = StreamClient::with_connector(
            test_config(),
            Arc::new(NoopHandler),
            Arc::new(CountingConnector::default()),
        )
        .unwrap();

        client.connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(client.state().await, ConnectionState::Connected);

        client.disconnect().await;
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }
}
