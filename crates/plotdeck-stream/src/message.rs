//! Message model and wire shapes for the dashboard's two push channels.
//!
//! The activity feed pushes one JSON object per logical event; the
//! generation-progress channel pushes progress updates and reserved
//! `ping`/`pong`/`heartbeat` control frames. Both are normalized into
//! [`StreamMessage`] before routing, so the buffer and dedup layers never
//! care which channel a message came from.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ChannelProfile;
use crate::error::{StreamError, StreamResult};

/// Severity attached to feed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Routine activity.
    #[default]
    Info,
    /// Something the writer should look at.
    Warning,
    /// Something that blocks the writing session.
    Critical,
}

impl Severity {
    fn from_wire(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("warning") => Self::Warning,
            Some("critical") => Self::Critical,
            _ => Self::Info,
        }
    }
}

/// A validated inbound message, immutable once parsed.
///
/// Identity is `id`; uniqueness is enforced within the router's dedup
/// window, not globally. `payload` retains the full wire object so
/// consumers can decode channel-specific fields via
/// [`StreamMessage::decode_feed`] / [`StreamMessage::decode_progress`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamMessage {
    /// Message identity (numeric wire ids are canonicalized to strings).
    pub id: String,
    /// Wire `type` of the message.
    pub kind: String,
    /// Display title; always present for feed events.
    pub title: Option<String>,
    /// Severity; defaults to [`Severity::Info`] when absent.
    pub severity: Severity,
    /// Optional ordering sequence for streaming-text consumption.
    pub sequence: Option<u64>,
    /// Wire timestamp (seconds since epoch, 0.0 when absent).
    pub timestamp: f64,
    /// The full wire object.
    pub payload: Value,
}

impl StreamMessage {
    /// Parse and validate a wire object for the given channel profile.
    ///
    /// Feed events must carry `id`, `type`, and a non-empty `title`.
    /// Progress updates may omit `id`; identity is then synthesized from
    /// `generation_id` and `timestamp` so dedup still has a handle.
    pub fn from_value(value: Value, profile: ChannelProfile) -> StreamResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| StreamError::Protocol("payload is not a JSON object".into()))?;

        let kind = match obj.get("type").and_then(Value::as_str) {
            Some(kind) if !kind.is_empty() => kind.to_string(),
            _ if profile == ChannelProfile::Progress => "progress".to_string(),
            _ => return Err(StreamError::Protocol("missing required field `type`".into())),
        };

        let id = match canonical_id(obj.get("id")) {
            Some(id) => id,
            None if profile == ChannelProfile::Progress => synthesize_progress_id(obj)?,
            None => return Err(StreamError::Protocol("missing required field `id`".into())),
        };

        let title = obj
            .get("title")
            .and_then(Value::as_str)
            .filter(|title| !title.is_empty())
            .map(str::to_string);
        if profile == ChannelProfile::Feed && title.is_none() {
            return Err(StreamError::Protocol(
                "missing required field `title`".into(),
            ));
        }

        let severity = Severity::from_wire(obj.get("severity"));
        let sequence = obj.get("sequence").and_then(Value::as_u64);
        let timestamp = obj.get("timestamp").and_then(Value::as_f64).unwrap_or(0.0);

        Ok(Self {
            id,
            kind,
            title,
            severity,
            sequence,
            timestamp,
            payload: value,
        })
    }

    /// Decode the payload as a typed feed event.
    pub fn decode_feed(&self) -> StreamResult<FeedEvent> {
        serde_json::from_value(self.payload.clone()).map_err(Into::into)
    }

    /// Decode the payload as a typed progress update.
    pub fn decode_progress(&self) -> StreamResult<ProgressUpdate> {
        serde_json::from_value(self.payload.clone()).map_err(Into::into)
    }
}

/// Canonicalize a wire `id` (string or number) into its string form.
fn canonical_id(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    }
}

/// Progress updates carry no wire `id`; identity is `generation_id` plus
/// the update timestamp (or sequence, when present) so successive updates
/// for one generation stay distinct.
fn synthesize_progress_id(obj: &serde_json::Map<String, Value>) -> StreamResult<String> {
    let generation_id = canonical_id(obj.get("generation_id")).ok_or_else(|| {
        StreamError::Protocol("missing required field `id` or `generation_id`".into())
    })?;

    if let Some(sequence) = obj.get("sequence").and_then(Value::as_u64) {
        return Ok(format!("{generation_id}#{sequence}"));
    }
    match obj.get("timestamp").and_then(Value::as_f64) {
        Some(timestamp) => Ok(format!("{generation_id}:{timestamp}")),
        None => Err(StreamError::Protocol(
            "progress update missing `timestamp` (or `sequence`) for identity".into(),
        )),
    }
}

/// Reserved control frame kinds used for liveness probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    /// A liveness probe; bidirectional peers answer with a pong.
    Ping,
    /// Answer to a previously sent ping.
    Pong,
    /// Server-initiated keep-alive with no reply expected.
    Heartbeat,
}

impl ControlKind {
    /// Map a wire `type` to a control kind, if it is one of the reserved
    /// liveness types.
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "ping" => Some(Self::Ping),
            "pong" => Some(Self::Pong),
            "heartbeat" => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

/// A parsed liveness control frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlFrame {
    /// Which reserved type the frame carried.
    pub kind: ControlKind,
    /// Wire timestamp, when the peer included one.
    pub timestamp: Option<f64>,
}

/// A classified inbound wire frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Liveness control traffic, consumed by the heartbeat monitor.
    Control(ControlFrame),
    /// An application message for routing and buffering.
    Message(Box<StreamMessage>),
}

/// Parse one raw wire frame for the given channel profile.
///
/// Fails closed: anything unparsable or incomplete is a
/// [`StreamError::Protocol`] and never reaches the buffer.
pub fn parse_frame(raw: &str, profile: ChannelProfile) -> StreamResult<InboundFrame> {
    let value: Value = serde_json::from_str(raw)?;

    if let Some(kind) = value.get("type").and_then(Value::as_str)
        && let Some(control) = ControlKind::from_kind(kind)
    {
        return Ok(InboundFrame::Control(ControlFrame {
            kind: control,
            timestamp: value.get("timestamp").and_then(Value::as_f64),
        }));
    }

    StreamMessage::from_value(value, profile).map(|message| InboundFrame::Message(Box::new(message)))
}

/// Typed view of a feed push.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedEvent {
    /// Event identity.
    pub id: String,
    /// Event type (e.g. `chapter_saved`, `decision_required`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Display title.
    pub title: String,
    /// Longer description for the feed card.
    #[serde(default)]
    pub description: String,
    /// Wire timestamp.
    #[serde(default)]
    pub timestamp: f64,
    /// Event severity.
    #[serde(default)]
    pub severity: Severity,
}

/// Typed view of a generation-progress update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// The generation run this update belongs to.
    pub generation_id: String,
    /// Completion in `[0, 1]`.
    #[serde(default)]
    pub progress: f64,
    /// Current pipeline stage name.
    #[serde(default)]
    pub stage: String,
    /// Free-form detail for the current stage.
    #[serde(default)]
    pub stage_detail: Option<String>,
    /// Estimated seconds remaining, when the backend can tell.
    #[serde(default)]
    pub estimated_time_remaining: Option<f64>,
    /// Agents currently working on the generation.
    #[serde(default)]
    pub active_agents: Vec<String>,
    /// Wire timestamp.
    #[serde(default)]
    pub timestamp: f64,
}
