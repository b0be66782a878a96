//! Playback-state classification for the relay ingest feed.

use crate::collaborators::PlaybackState;

use std::time::Duration;
use tokio::time::Instant;

/// Timer granularity; the first instant strictly past the threshold.
const TICK: Duration = Duration::from_millis(1);

/// Why the relay feed is considered disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Playback reached its end.
    Ended,
    /// Playback went idle after having started.
    Idle,
    /// Buffering lasted past the threshold.
    Buffering,
}

impl DisconnectReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Ended => "ended",
            DisconnectReason::Idle => "idle",
            DisconnectReason::Buffering => "buffering",
        }
    }
}

/// Current health of the relay feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    /// Rebuffering; becomes a disconnect at `deadline` unless playback resumes.
    Buffering { deadline: Instant },
    Disconnected(DisconnectReason),
}

/// Turns playback-state transitions into a healthy/disconnected signal.
///
/// A short rebuffer is tolerated. Buffering that lasts longer than
/// `threshold`, playback ending, or going idle after having started are
/// disconnects.
#[derive(Debug)]
pub struct IngestClassifier {
    threshold: Duration,
    started: bool,
    buffering_since: Option<Instant>,
}

impl IngestClassifier {
    #[must_use]
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            started: false,
            buffering_since: None,
        }
    }

    /// Record a playback state observed at `now`.
    pub fn observe(&mut self, state: PlaybackState, now: Instant) -> Verdict {
        match state {
            PlaybackState::Ended => {
                self.buffering_since = None;
                Verdict::Disconnected(DisconnectReason::Ended)
            }
            PlaybackState::Idle if self.started => {
                self.buffering_since = None;
                Verdict::Disconnected(DisconnectReason::Idle)
            }
            PlaybackState::Idle | PlaybackState::Preparing => {
                self.buffering_since = None;
                Verdict::Healthy
            }
            PlaybackState::Ready | PlaybackState::Playing => {
                self.started = true;
                self.buffering_since = None;
                Verdict::Healthy
            }
            PlaybackState::Buffering => {
                let since = *self.buffering_since.get_or_insert(now);
                self.verdict_for_buffering(since, now)
            }
        }
    }

    /// Re-evaluate at `now` without a new state.
    #[must_use]
    pub fn poll(&self, now: Instant) -> Verdict {
        match self.buffering_since {
            Some(since) => self.verdict_for_buffering(since, now),
            None => Verdict::Healthy,
        }
    }

    fn verdict_for_buffering(&self, since: Instant, now: Instant) -> Verdict {
        if now.saturating_duration_since(since) > self.threshold {
            Verdict::Disconnected(DisconnectReason::Buffering)
        } else {
            Verdict::Buffering {
                deadline: since + self.threshold + TICK,
            }
        }
    }
}
