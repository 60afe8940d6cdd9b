//! Bidirectional WebSocket transport for the generation-progress channel.
//!
//! One [`Connector::connect`] call performs one WebSocket handshake. A
//! single I/O task owns both halves of the stream: it forwards outbound
//! wire text (application messages and heartbeat pings) and maps inbound
//! frames onto transport signals. Liveness runs at the application layer
//! with JSON `ping`/`pong` frames; WebSocket protocol pings from the peer
//! are answered here and never surface to the supervisor.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use crate::error::{StreamError, StreamResult};
use crate::transport::{
    Connection, Connector, SIGNAL_CHANNEL_CAPACITY, TransportKind, TransportSignal,
};

/// WebSocket connector for bidirectional socket endpoints.
#[derive(Debug, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &Url) -> StreamResult<Connection> {
        let (stream, _response) = connect_async(endpoint.as_str()).await.map_err(|e| {
            StreamError::ConnectionFailed(format!("WebSocket connection failed: {e}"))
        })?;

        let (signal_tx, outbound_rx, connection) = Connection::duplex(SIGNAL_CHANNEL_CAPACITY);
        let mut outbound_rx = outbound_rx;
        let (mut sink, mut source) = stream.split();

        let io_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = outbound_rx.recv() => match outbound {
                        Some(text) => {
                            if let Err(e) = sink.send(Message::Text(text.into())).await {
                                let error = StreamError::ConnectionLost(format!(
                                    "WebSocket send failed: {e}"
                                ));
                                let _ = signal_tx.send(TransportSignal::Error(error)).await;
                                return;
                            }
                        }
                        None => {
                            // Supervisor tore the connection down: say goodbye.
                            let _ = sink.send(Message::Close(None)).await;
                            return;
                        }
                    },
                    frame = source.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            if signal_tx
                                .send(TransportSignal::Message(text.to_string()))
                                .await
                                .is_err()
                            {
                                // Superseded by a newer connection.
                                return;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            debug!("answering protocol-level ping");
                            let _ = sink.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(close))) => {
                            let reason = close.map(|frame| frame.reason.to_string());
                            let _ = signal_tx.send(TransportSignal::Closed { reason }).await;
                            return;
                        }
                        Some(Ok(Message::Binary(_))) => {
                            warn!("ignoring binary frame on JSON channel");
                        }
                        Some(Ok(_)) => {} // pong / raw frames
                        Some(Err(e)) => {
                            let error =
                                StreamError::ConnectionLost(format!("WebSocket read failed: {e}"));
                            let _ = signal_tx.send(TransportSignal::Error(error)).await;
                            return;
                        }
                        None => {
                            let _ = signal_tx
                                .send(TransportSignal::Closed { reason: None })
                                .await;
                            return;
                        }
                    },
                }
            }
        });

        Ok(connection.with_io_task(io_task))
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_is_bidirectional() {
        let connector = WebSocketConnector::new();
        assert_eq!(connector.kind(), TransportKind::Socket);
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_endpoint_fails_cleanly() {
        let connector = WebSocketConnector::new();
        // Port 9 (discard) is about as unreachable as it gets locally.
        let endpoint = Url::parse("ws://127.0.0.1:9/progress").unwrap();
        let result = connector.connect(&endpoint).await;
        assert!(matches!(result, Err(StreamError::ConnectionFailed(_))));
    }
}
