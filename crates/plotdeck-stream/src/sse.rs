//! Server-Sent Events push transport for the activity feed.
//!
//! Each [`Connector::connect`] call opens exactly one SSE stream; the
//! supervisor owns reconnection, so this adapter never retries on its own.
//! The last received event id survives across physical connections and is
//! replayed as `Last-Event-ID`, letting a well-behaved backend resume the
//! feed instead of replaying it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::error::{StreamError, StreamResult};
use crate::transport::{
    Connection, Connector, SIGNAL_CHANNEL_CAPACITY, TransportKind, TransportSignal,
};

/// SSE connector for one-way feed endpoints.
#[derive(Debug)]
pub struct SseConnector {
    http_client: reqwest::Client,
    auth_token: Option<String>,
    headers: HashMap<String, String>,
    last_event_id: Arc<RwLock<Option<String>>>,
}

impl SseConnector {
    /// Create a connector with default HTTP settings.
    pub fn new() -> Self {
        // The client carries a connect timeout only; a total request
        // timeout would kill the long-lived stream itself.
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("plotdeck-stream/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http_client,
            auth_token: None,
            headers: HashMap::new(),
            last_event_id: Arc::new(RwLock::new(None)),
        }
    }

    /// Attach a bearer token to every stream request.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Attach an additional header to every stream request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The event id that will be replayed on the next connect, if any.
    pub async fn last_event_id(&self) -> Option<String> {
        self.last_event_id.read().await.clone()
    }
}

impl Default for SseConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for SseConnector {
    async fn connect(&self, endpoint: &Url) -> StreamResult<Connection> {
        let mut request = self
            .http_client
            .get(endpoint.clone())
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache");

        if let Some(token) = &self.auth_token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(event_id) = self.last_event_id.read().await.clone() {
            request = request.header("Last-Event-ID", event_id);
        }
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StreamError::ConnectionFailed(format!("SSE request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(StreamError::ConnectionFailed(format!(
                "SSE endpoint returned {}",
                response.status()
            )));
        }

        let (signal_tx, connection) = Connection::push(SIGNAL_CHANNEL_CAPACITY);
        let last_event_id = Arc::clone(&self.last_event_id);

        let io_task = tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut pending = String::new();

            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let error =
                            StreamError::ConnectionLost(format!("SSE read failed: {e}"));
                        let _ = signal_tx.send(TransportSignal::Error(error)).await;
                        return;
                    }
                };
                pending.push_str(&String::from_utf8_lossy(&chunk));

                // Complete frames are separated by a blank line.
                while let Some(boundary) = pending.find("\n\n") {
                    let frame_text = pending[..boundary].to_string();
                    pending = pending[boundary + 2..].to_string();

                    let frame = parse_sse_frame(&frame_text);
                    if let Some(event_id) = frame.id {
                        *last_event_id.write().await = Some(event_id);
                    }
                    if let Some(data) = frame.data
                        && signal_tx.send(TransportSignal::Message(data)).await.is_err()
                    {
                        // Superseded by a newer connection; stop reading.
                        return;
                    }
                }
            }

            let _ = signal_tx
                .send(TransportSignal::Closed {
                    reason: Some("stream ended".into()),
                })
                .await;
        });

        Ok(connection.with_io_task(io_task))
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Push
    }
}

/// One parsed SSE frame.
#[derive(Debug, Default, PartialEq, Eq)]
struct SseFrame {
    event: Option<String>,
    data: Option<String>,
    id: Option<String>,
}

/// Parse the `field: value` lines of one SSE frame. Multi-line `data`
/// fields are joined with newlines; comment lines are ignored.
fn parse_sse_frame(frame_text: &str) -> SseFrame {
    let mut frame = SseFrame::default();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in frame_text.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let (field, value) = match line.find(':') {
            Some(colon) => (&line[..colon], line[colon + 1..].trim_start()),
            None => (line, ""),
        };

        match field {
            "event" => frame.event = Some(value.to_string()),
            "data" => data_lines.push(value),
            "id" => frame.id = Some(value.to_string()),
            "retry" => debug!("ignoring SSE retry hint: {value}"),
            _ => debug!("ignoring unknown SSE field: {field}"),
        }
    }

    if !data_lines.is_empty() {
        frame.data = Some(data_lines.join("\n"));
    }
    frame
}
