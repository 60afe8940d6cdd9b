//! Stream client error types.

use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for stream client operations.
pub type StreamResult<T> = std::result::Result<T, StreamError>;

/// Represents errors that can occur while running a stream client.
///
/// The taxonomy mirrors how failures are recovered: [`StreamError::Protocol`]
/// is local to one message (the stream keeps running), connection-level
/// variants feed the reconnect path, and [`StreamError::RetryExhausted`]
/// is terminal until the caller invokes `reconnect()`.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum StreamError {
    /// Failed to establish a connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An established connection was lost.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Failed to send a message on the outbound lane.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// A payload was malformed or missing required fields.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No traffic was observed within the liveness window.
    #[error("No traffic for {silent_for:?} (liveness timeout {timeout:?})")]
    HeartbeatTimeout {
        /// How long the connection has been silent.
        silent_for: Duration,
        /// The configured liveness timeout that expired.
        timeout: Duration,
    },

    /// All automatic reconnection attempts have been used up.
    #[error("Gave up after {attempts} connection attempts; call reconnect() to resume")]
    RetryExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// The client was configured with invalid parameters.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An underlying I/O error occurred.
    #[error("IO error: {0}")]
    Io(String),
}

impl StreamError {
    /// Whether this error should trigger the supervised reconnect path.
    ///
    /// Protocol errors are recovered locally (the offending message is
    /// dropped); configuration and exhaustion errors require caller action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_)
                | Self::ConnectionLost(_)
                | Self::HeartbeatTimeout { .. }
                | Self::Io(_)
        )
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StreamError::ConnectionFailed("refused".into()).is_retryable());
        assert!(StreamError::ConnectionLost("reset".into()).is_retryable());
        assert!(
            StreamError::HeartbeatTimeout {
                silent_for: Duration::from_secs(61),
                timeout: Duration::from_secs(60),
            }
            .is_retryable()
        );

        assert!(!StreamError::Protocol("bad json".into()).is_retryable());
        assert!(!StreamError::RetryExhausted { attempts: 10 }.is_retryable());
        assert!(!StreamError::Configuration("no endpoint".into()).is_retryable());
    }

    #[test]
    fn test_json_error_maps_to_protocol() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let stream_err: StreamError = err.into();
        assert!(matches!(stream_err, StreamError::Protocol(_)));
    }
}
