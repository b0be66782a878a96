//! Session phase model.

use std::fmt;

/// The single current phase of the session.
///
/// `Connecting { is_retry: true }` is what the host calls "reconnecting".
/// Keeping the retry bit inside the connecting variant makes a
/// "streaming but reconnecting" state impossible to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Starting,
    Connecting {
        is_retry: bool,
    },
    Streaming,
    Error,
}

impl Phase {
    /// Flat projection exposed to hosts.
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        match self {
            Phase::Idle => SessionStatus::Idle,
            Phase::Starting => SessionStatus::Starting,
            Phase::Connecting { .. } => SessionStatus::Connecting,
            Phase::Streaming => SessionStatus::Streaming,
            Phase::Error => SessionStatus::Error,
        }
    }

    #[must_use]
    pub const fn is_reconnecting(&self) -> bool {
        matches!(self, Phase::Connecting { is_retry: true })
    }

    /// A first connection or a retry is in flight.
    #[must_use]
    pub const fn is_connecting(&self) -> bool {
        matches!(self, Phase::Starting | Phase::Connecting { .. })
    }

    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Phase::Idle | Phase::Error)
    }

    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Starting => "starting",
            Phase::Connecting { is_retry: false } => "connecting",
            Phase::Connecting { is_retry: true } => "reconnecting",
            Phase::Streaming => "streaming",
            Phase::Error => "error",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally observable session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Starting,
    Connecting,
    Streaming,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnecting_projects_to_connecting() {
        let phase = Phase::Connecting { is_retry: true };
        assert!(phase.is_reconnecting());
        assert!(phase.is_connecting());
        assert_eq!(phase.status(), SessionStatus::Connecting);
        assert_eq!(
            Phase::Connecting { is_retry: false }.status(),
            SessionStatus::Connecting
        );
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(Phase::default(), Phase::Idle);
        assert_eq!(Phase::Connecting { is_retry: true }.to_string(), "reconnecting");
        assert_eq!(Phase::Streaming.as_str(), "streaming");
        assert!(Phase::Error.is_idle());
        assert!(!Phase::Streaming.is_connecting());
    }
}
