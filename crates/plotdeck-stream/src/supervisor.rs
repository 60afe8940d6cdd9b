//! Connection supervision: the connect/reconnect state machine.
//!
//! One driver task per client owns the active [`Connection`] and every
//! piece of mutable session state. All transport signals, timer firings,
//! and caller commands funnel through a single `select!` loop, so buffer,
//! stats, and state writes never race and need no locking discipline
//! beyond the shared snapshot handles.
//!
//! Teardown discipline: each reconnect attempt produces a fresh
//! [`Connection`]; closing it aborts the transport's I/O task and drops its
//! signal channel, so a superseded connection cannot deliver late signals.
//! A `disposed` flag is additionally checked before every handler callback,
//! which keeps callers silent from the moment `disconnect()` is invoked.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::buffer::EventBuffer;
use crate::client::StreamHandler;
use crate::config::StreamClientConfig;
use crate::error::StreamError;
use crate::health::HealthReporter;
use crate::heartbeat::HeartbeatMonitor;
use crate::message::ControlKind;
use crate::router::{MessageRouter, RouteOutcome};
use crate::transport::{Connection, Connector, TransportSignal};

/// Connection lifecycle states. Exactly one supervisor owns this value per
/// client instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Never connected.
    #[default]
    Idle,
    /// First connection attempt in flight.
    Connecting,
    /// Live connection established.
    Connected,
    /// Connection lost; automatic retry pending or in flight.
    Reconnecting,
    /// Caller-initiated disconnect; nothing scheduled.
    Disconnected,
    /// Retry budget exhausted; waiting for an explicit `reconnect()`.
    TerminalError,
}

/// Caller commands processed by the driver loop.
#[derive(Debug)]
pub(crate) enum Command {
    /// Establish a connection if none is active.
    Connect,
    /// Tear everything down and acknowledge once no timer is pending.
    Disconnect(oneshot::Sender<()>),
    /// Manual retry: reset the attempt counter and connect afresh.
    Reconnect,
    /// Queue raw wire text on the outbound lane.
    Send(String),
}

/// What the driver does next after handling one phase.
enum Phase {
    /// Wait for a caller command (idle/disconnected/terminal).
    Standby,
    /// Run one connection attempt.
    Dial,
    /// Wait out a retry delay, then dial again.
    Backoff(Duration),
    /// Pump a live connection.
    Live(Connection),
    /// Client handle dropped; stop the driver.
    Shutdown,
}

/// Events a live connection can produce in one loop turn.
enum LiveEvent {
    Signal(Option<TransportSignal>),
    PingDue,
    LivenessExpired,
    Command(Option<Command>),
}

/// The driver owning one client's connection lifecycle.
pub(crate) struct Supervisor {
    pub(crate) config: StreamClientConfig,
    pub(crate) endpoint: Url,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) handler: Arc<dyn StreamHandler>,
    pub(crate) commands: mpsc::Receiver<Command>,
    pub(crate) state: Arc<RwLock<ConnectionState>>,
    pub(crate) buffer: Arc<RwLock<EventBuffer>>,
    pub(crate) health: Arc<RwLock<HealthReporter>>,
    pub(crate) disposed: Arc<AtomicBool>,
    pub(crate) router: MessageRouter,
    pub(crate) heartbeat: HeartbeatMonitor,
    pub(crate) attempt: u32,
    pub(crate) ever_connected: bool,
    pub(crate) session_id: String,
}

impl Supervisor {
    /// Run the driver until the client handle is dropped.
    pub(crate) async fn run(mut self) {
        let mut phase = Phase::Standby;
        loop {
            phase = match phase {
                Phase::Standby => self.standby().await,
                Phase::Dial => self.dial().await,
                Phase::Backoff(delay) => self.backoff(delay).await,
                Phase::Live(connection) => self.live(connection).await,
                Phase::Shutdown => break,
            };
        }
        debug!(session_id = %self.session_id, "stream client driver stopped");
    }

    /// Invoke a handler callback unless the client has been disposed.
    fn invoke(&self, callback: impl FnOnce(&dyn StreamHandler)) {
        if !self.disposed.load(Ordering::SeqCst) {
            callback(self.handler.as_ref());
        }
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }

    async fn standby(&mut self) -> Phase {
        match self.commands.recv().await {
            None => Phase::Shutdown,
            Some(Command::Connect) => self.begin_connect(false).await,
            Some(Command::Reconnect) => self.begin_connect(true).await,
            Some(Command::Disconnect(ack)) => {
                self.attempt = 0;
                self.set_state(ConnectionState::Disconnected).await;
                self.health.write().await.reset();
                let _ = ack.send(());
                Phase::Standby
            }
            Some(Command::Send(_)) => {
                let error = StreamError::SendFailed("not connected".into());
                warn!(session_id = %self.session_id, %error, "dropping outbound message");
                self.invoke(|h| h.on_error(&error));
                Phase::Standby
            }
        }
    }

    /// Enter the dial path; manual retries clear the attempt counter,
    /// terminal error, and accumulated stats.
    async fn begin_connect(&mut self, manual_retry: bool) -> Phase {
        if !self.config.enabled {
            debug!(session_id = %self.session_id, "client disabled; ignoring connect");
            self.set_state(ConnectionState::Disconnected).await;
            return Phase::Standby;
        }
        if manual_retry {
            self.attempt = 0;
            self.health.write().await.reset();
        }
        self.set_state(ConnectionState::Connecting).await;
        Phase::Dial
    }

    /// Run one connection attempt against the configured endpoint.
    async fn dial(&mut self) -> Phase {
        info!(
            session_id = %self.session_id,
            endpoint = %self.endpoint,
            attempt = self.attempt,
            "connecting"
        );

        let result = match tokio::time::timeout(
            self.config.connect_timeout,
            self.connector.connect(&self.endpoint),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StreamError::ConnectionFailed(format!(
                "connect timed out after {:?}",
                self.config.connect_timeout
            ))),
        };

        match result {
            Ok(connection) => {
                let reconnect = self.ever_connected;
                self.ever_connected = true;
                self.attempt = 0;
                self.health.write().await.record_connected(reconnect);
                if self.config.profile.is_bidirectional() {
                    self.heartbeat.on_connected(Instant::now());
                }
                self.set_state(ConnectionState::Connected).await;
                info!(session_id = %self.session_id, "connected");
                self.invoke(|h| h.on_connect());
                Phase::Live(connection)
            }
            Err(error) => {
                warn!(
                    session_id = %self.session_id,
                    attempt = self.attempt,
                    %error,
                    "connection attempt failed"
                );
                self.health.write().await.record_error();
                self.invoke(|h| h.on_error(&error));
                self.schedule_retry().await
            }
        }
    }

    /// Schedule the next retry, or park in the terminal error state once
    /// the budget is spent.
    async fn schedule_retry(&mut self) -> Phase {
        if self.config.retry.is_exhausted(self.attempt) {
            let error = StreamError::RetryExhausted {
                attempts: self.attempt + 1,
            };
            error!(session_id = %self.session_id, %error, "giving up");
            self.set_state(ConnectionState::TerminalError).await;
            self.invoke(|h| h.on_error(&error));
            return Phase::Standby;
        }

        let delay = self.config.retry.delay(self.attempt);
        self.attempt += 1;
        self.health.write().await.record_retry(self.attempt);
        self.set_state(ConnectionState::Reconnecting).await;
        debug!(
            session_id = %self.session_id,
            attempt = self.attempt,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
        Phase::Backoff(delay)
    }

    /// Wait out the retry delay; a caller disconnect cancels the timer.
    async fn backoff(&mut self, delay: Duration) -> Phase {
        let retry_at = tokio::time::sleep(delay);
        tokio::pin!(retry_at);
        loop {
            tokio::select! {
                () = &mut retry_at => return Phase::Dial,
                command = self.commands.recv() => match command {
                    None => return Phase::Shutdown,
                    Some(Command::Disconnect(ack)) => {
                        // Dropping the sleep future is the timer cancellation.
                        self.attempt = 0;
                        self.set_state(ConnectionState::Disconnected).await;
                        self.health.write().await.reset();
                        let _ = ack.send(());
                        return Phase::Standby;
                    }
                    Some(Command::Reconnect) => return self.begin_connect(true).await,
                    Some(Command::Connect) => {} // already reconnecting
                    Some(Command::Send(_)) => {
                        let error = StreamError::SendFailed("not connected".into());
                        self.invoke(|h| h.on_error(&error));
                    }
                },
            }
        }
    }

    /// Pump one live connection until it dies or the caller intervenes.
    async fn live(&mut self, mut connection: Connection) -> Phase {
        let socket = self.config.profile.is_bidirectional() && connection.is_bidirectional();
        let heartbeat_interval = self.heartbeat.config().interval;
        let mut ping_timer = tokio::time::interval_at(
            Instant::now() + heartbeat_interval,
            heartbeat_interval,
        );

        loop {
            let liveness_deadline = self.heartbeat.deadline();
            let event = tokio::select! {
                signal = connection.recv() => LiveEvent::Signal(signal),
                _ = ping_timer.tick(), if socket => LiveEvent::PingDue,
                () = tokio::time::sleep_until(liveness_deadline), if socket => {
                    LiveEvent::LivenessExpired
                }
                command = self.commands.recv() => LiveEvent::Command(command),
            };

            match event {
                LiveEvent::Signal(Some(TransportSignal::Message(raw))) => {
                    self.handle_inbound(&connection, &raw, socket).await;
                }
                LiveEvent::Signal(Some(TransportSignal::Error(error))) => {
                    warn!(session_id = %self.session_id, %error, "transport error");
                    self.health.write().await.record_error();
                    self.invoke(|h| h.on_error(&error));
                    connection.close();
                    let reason = error.to_string();
                    self.invoke(|h| h.on_disconnect(Some(&reason)));
                    return self.schedule_retry().await;
                }
                LiveEvent::Signal(Some(TransportSignal::Closed { reason })) => {
                    info!(session_id = %self.session_id, ?reason, "connection closed");
                    connection.close();
                    self.invoke(|h| h.on_disconnect(reason.as_deref()));
                    return self.schedule_retry().await;
                }
                LiveEvent::Signal(None) => {
                    // Signal channel gone without a close frame.
                    connection.close();
                    self.invoke(|h| h.on_disconnect(None));
                    return self.schedule_retry().await;
                }
                LiveEvent::PingDue => {
                    let ping = self.heartbeat.next_ping(Instant::now());
                    if let Err(error) = connection.try_send(ping) {
                        warn!(session_id = %self.session_id, %error, "heartbeat ping failed");
                    }
                }
                LiveEvent::LivenessExpired => {
                    let error = StreamError::HeartbeatTimeout {
                        silent_for: self.heartbeat.silent_for(Instant::now()),
                        timeout: self.heartbeat.config().timeout,
                    };
                    warn!(session_id = %self.session_id, %error, "forcing reconnect");
                    self.health.write().await.record_error();
                    self.invoke(|h| h.on_error(&error));
                    connection.close();
                    self.invoke(|h| h.on_disconnect(Some("liveness timeout")));
                    return self.schedule_retry().await;
                }
                LiveEvent::Command(None) => {
                    connection.close();
                    return Phase::Shutdown;
                }
                LiveEvent::Command(Some(Command::Disconnect(ack))) => {
                    connection.close();
                    info!(session_id = %self.session_id, "disconnected by caller");
                    self.attempt = 0;
                    self.set_state(ConnectionState::Disconnected).await;
                    self.health.write().await.reset();
                    let _ = ack.send(());
                    return Phase::Standby;
                }
                LiveEvent::Command(Some(Command::Reconnect)) => {
                    connection.close();
                    return self.begin_connect(true).await;
                }
                LiveEvent::Command(Some(Command::Connect)) => {
                    // connect() is idempotent while a connection is active.
                }
                LiveEvent::Command(Some(Command::Send(text))) => {
                    match connection.try_send(text) {
                        Ok(()) => self.health.write().await.record_message_sent(),
                        Err(error) => {
                            warn!(session_id = %self.session_id, %error, "send failed");
                            self.invoke(|h| h.on_error(&error));
                        }
                    }
                }
            }
        }
    }

    /// Route one inbound payload and apply the outcome.
    async fn handle_inbound(&mut self, connection: &Connection, raw: &str, socket: bool) {
        if socket {
            self.heartbeat.on_traffic(Instant::now());
        }

        match self.router.route(raw) {
            RouteOutcome::Delivered {
                message,
                high_priority,
            } => {
                self.health.write().await.record_message_received();
                // High-priority kinds reach their callback before buffer
                // bookkeeping so synchronous UI surfaces are not delayed.
                if high_priority {
                    self.invoke(|h| h.on_high_priority_message(&message));
                }
                self.buffer.write().await.insert(message.clone());
                self.invoke(|h| h.on_message(&message));
            }
            RouteOutcome::Control(frame) => match frame.kind {
                ControlKind::Ping => {
                    if connection.is_bidirectional() {
                        let pong = serde_json::json!({
                            "type": "pong",
                            "timestamp": frame.timestamp,
                        })
                        .to_string();
                        if let Err(error) = connection.try_send(pong) {
                            warn!(session_id = %self.session_id, %error, "pong failed");
                        }
                    }
                }
                ControlKind::Pong => {
                    if socket && let Some(sample) = self.heartbeat.on_pong(Instant::now()) {
                        self.health.write().await.record_sample(&sample);
                    }
                }
                ControlKind::Heartbeat => {
                    // Server keep-alive: already counted as traffic above.
                }
            },
            RouteOutcome::Duplicate => {}
            RouteOutcome::Rejected(_) => {
                // Protocol errors stay local; the router already warned and
                // connection health is untouched.
            }
        }
    }
}
