//! Error types for podcast synthesis.

use thiserror::Error;

/// Result type alias for podcast synthesis operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for podcast synthesis.
#[derive(Error, Debug)]
pub enum Error {
    /// The dialogue script has no segments.
    #[error("podcasttts: script has no segments")]
    EmptyScript,

    /// Transport could not be opened, was lost, or timed out.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server answered a control frame with an unexpected event.
    #[error("handshake error: expected {expected}, got {got}")]
    Handshake { expected: String, got: String },

    /// The server sent an error frame or a failure event.
    #[error("server error (code={code}): {message}")]
    Server { code: u32, message: String },

    /// A synthesis round was closed with an error flag.
    #[error("round {round_id} failed: {message}")]
    RoundFailed { round_id: i32, message: String },

    /// Frames arrived in an order the protocol does not allow.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A frame or event payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The retry budget ran out before the session finished cleanly.
    #[error("synthesis incomplete after {attempts} attempts: {last_error}")]
    SynthesisIncomplete { attempts: u32, last_error: String },

    /// The build finished without a single byte of audio.
    #[error("no audio produced")]
    NoAudioProduced,

    /// The caller abandoned the build.
    #[error("synthesis cancelled")]
    Cancelled,

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if a fresh attempt may get past this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Connection(_)
                | Error::Handshake { .. }
                | Error::Server { .. }
                | Error::RoundFailed { .. }
                | Error::Protocol(_)
                | Error::Decode(_)
                | Error::WebSocket(_)
        )
    }

    /// Returns true if the error came from the transport layer.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::WebSocket(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_and_terminal_errors_are_not_retryable() {
        assert!(!Error::EmptyScript.is_retryable());
        assert!(!Error::NoAudioProduced.is_retryable());
        assert!(!Error::Cancelled.is_retryable());
        assert!(!Error::Config("x".into()).is_retryable());
    }

    #[test]
    fn stream_errors_are_retryable() {
        assert!(Error::Connection("reset".into()).is_retryable());
        assert!(Error::Server { code: 55000000, message: "busy".into() }.is_retryable());
        assert!(Error::RoundFailed { round_id: 2, message: "tts".into() }.is_retryable());
        assert!(Error::Decode("bad".into()).is_retryable());
    }

    #[test]
    fn connection_errors() {
        assert!(Error::Connection("timed out".into()).is_connection_error());
        assert!(!Error::Protocol("late audio".into()).is_connection_error());
    }
}
