//! Stream controller error types.
//!
//! Every failure is classified at the point where it happens (see
//! [`ErrorClass`]). The class decides whether the failure is routed into the
//! reconnection protocol, surfaced to the host once, or swallowed because the
//! user cancelled the operation. Internal details are logged but never
//! exposed through [`ScError::user_message`].

use std::time::Duration;
use thiserror::Error;

/// Error classification used to decide between auto-retry and surfacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing source, endpoint or relay URL. Surfaced once, never retried.
    Configuration,
    /// Timeout or lost connection. Routed through the reconnection protocol.
    Transient,
    /// Capture-token or device-permission denial. Surfaced, switch aborted.
    Permission,
    /// Engine failure unrelated to connectivity. Surfaced once, no retry.
    Fatal,
    /// Another start/stop/switch is mid-flight ("please wait").
    Busy,
    /// The user stopped the session. Not a failure; never surfaced.
    Cancelled,
}

impl ErrorClass {
    /// Returns the class as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Configuration => "configuration",
            ErrorClass::Transient => "transient",
            ErrorClass::Permission => "permission",
            ErrorClass::Fatal => "fatal",
            ErrorClass::Busy => "busy",
            ErrorClass::Cancelled => "cancelled",
        }
    }
}

/// Stream controller error type.
#[derive(Debug, Clone, Error)]
pub enum ScError {
    /// A previous start/stop is still in flight, or a slow close is running.
    #[error("Operation in progress, please wait")]
    Busy,

    /// `start()` was called while the session is already live.
    #[error("Session is already streaming")]
    AlreadyStreaming,

    /// Configuration error (missing source, endpoint, relay URL).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A bounded engine call did not finish in time.
    #[error("Timed out after {timeout:?} waiting for {operation}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The remote side closed the connection or the transport failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Capture token or device permission was denied.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Engine failure that reconnecting cannot fix.
    #[error("Engine failure: {0}")]
    EngineFatal(String),

    /// The relay feed could not be prepared or never became ready.
    #[error("Relay feed unavailable: {0}")]
    RelayUnavailable(String),

    /// The user stopped the session while the operation was running.
    #[error("Operation cancelled by user")]
    Cancelled,

    /// A bounded reconnect policy gave up.
    #[error("Reconnection abandoned after {0} attempts")]
    RetriesExhausted(u32),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScError {
    /// Returns the class that drives retry-versus-surface decisions.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            ScError::Busy | ScError::AlreadyStreaming => ErrorClass::Busy,
            ScError::Configuration(_) => ErrorClass::Configuration,
            ScError::Timeout { .. } | ScError::Connection(_) => ErrorClass::Transient,
            ScError::PermissionDenied(_) => ErrorClass::Permission,
            ScError::EngineFatal(_)
            | ScError::RelayUnavailable(_)
            | ScError::RetriesExhausted(_)
            | ScError::Internal(_) => ErrorClass::Fatal,
            ScError::Cancelled => ErrorClass::Cancelled,
        }
    }

    /// Whether the reconnection protocol may absorb this failure.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Returns a host-safe message (no endpoint or token details).
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            ScError::Busy => "Please wait, the previous operation is still running".to_string(),
            ScError::AlreadyStreaming => "Already streaming".to_string(),
            ScError::Configuration(msg) => format!("Stream is not configured: {msg}"),
            ScError::Timeout { .. } | ScError::Connection(_) => {
                "Could not reach the streaming server".to_string()
            }
            ScError::PermissionDenied(msg) => format!("Permission required: {msg}"),
            ScError::EngineFatal(_) | ScError::Internal(_) => {
                "The stream stopped because of an internal error".to_string()
            }
            ScError::RelayUnavailable(_) => {
                "The relay feed is unavailable, showing placeholder".to_string()
            }
            ScError::Cancelled => "Stopped".to_string(),
            ScError::RetriesExhausted(n) => format!("Could not reconnect after {n} attempts"),
        }
    }
}

/// Errors reported by a [`MediaEngine`](crate::collaborators::MediaEngine).
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine itself gave up waiting on the transport.
    #[error("engine operation timed out")]
    Timeout,

    /// The remote closed the connection.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Socket / protocol level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The requested source could not be attached.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// Unrecoverable engine failure (encoder crash, invalid state).
    #[error("fatal engine error: {0}")]
    Fatal(String),
}

impl From<EngineError> for ScError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Timeout => ScError::Connection("engine timeout".to_string()),
            EngineError::ConnectionClosed(msg) | EngineError::Transport(msg) => {
                ScError::Connection(msg)
            }
            EngineError::SourceUnavailable(msg) => ScError::Configuration(msg),
            EngineError::Fatal(msg) => ScError::EngineFatal(msg),
        }
    }
}

/// Errors reported by a [`RelayPlayer`](crate::collaborators::RelayPlayer).
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// The playback session could not be created.
    #[error("prepare failed: {0}")]
    PrepareFailed(String),

    /// The playback session ended before becoming ready.
    #[error("playback ended before ready")]
    EndedBeforeReady,

    /// The playback session did not become ready within the bound.
    #[error("not ready within {0:?}")]
    NotReady(Duration),
}

impl From<RelayError> for ScError {
    fn from(err: RelayError) -> Self {
        ScError::RelayUnavailable(err.to_string())
    }
}
