//! Relay Player seam.

use crate::errors::RelayError;

use async_trait::async_trait;
use common::secret::SecretString;
use tokio::sync::watch;

/// Opaque handle to a prepared relay playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackHandle(u64);

impl PlaybackHandle {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.0
    }
}

/// Playback state reported by the relay player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Preparing,
    Ready,
    Playing,
    Buffering,
    Ended,
}

impl PlaybackState {
    /// Whether frames can be pulled from the session.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, PlaybackState::Ready | PlaybackState::Playing)
    }
}

/// Relay Player operations consumed by the controller.
#[async_trait]
pub trait RelayPlayer: Send + Sync {
    /// Create a playback session for the relay feed.
    async fn prepare(&self, url: &SecretString) -> Result<PlaybackHandle, RelayError>;

    /// Observe playback state transitions for a session.
    fn playback_states(&self, handle: &PlaybackHandle) -> watch::Receiver<PlaybackState>;

    /// Tear down a playback session.
    async fn release(&self, handle: PlaybackHandle);
}
