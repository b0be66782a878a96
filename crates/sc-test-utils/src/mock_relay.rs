//! Relay Player driven by the test.
//!
//! Every prepared playback session gets its own state channel. New sessions
//! start in the configured initial state (`Ready` by default); the test moves
//! them along with [`MockRelayPlayer::set_state`].

use async_trait::async_trait;
use common::secret::SecretString;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use stream_controller::collaborators::{PlaybackHandle, PlaybackState, RelayPlayer};
use stream_controller::errors::RelayError;
use tokio::sync::watch;

#[derive(Debug)]
struct RelayInner {
    next_id: u64,
    initial_state: PlaybackState,
    prepare_failures: VecDeque<RelayError>,
    sessions: HashMap<u64, watch::Sender<PlaybackState>>,
    prepared: Vec<PlaybackHandle>,
    released: Vec<PlaybackHandle>,
}

/// Mock Relay Player.
#[derive(Debug)]
pub struct MockRelayPlayer {
    inner: Mutex<RelayInner>,
}

impl Default for MockRelayPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRelayPlayer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RelayInner {
                next_id: 1,
                initial_state: PlaybackState::Ready,
                prepare_failures: VecDeque::new(),
                sessions: HashMap::new(),
                prepared: Vec::new(),
                released: Vec::new(),
            }),
        }
    }

    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// State new playback sessions start in.
    pub fn set_initial_state(&self, state: PlaybackState) {
        self.inner.lock().unwrap().initial_state = state;
    }

    /// Fail the next `n` prepares.
    pub fn fail_next_prepares(&self, n: usize) {
        let mut inner = self.inner.lock().unwrap();
        for _ in 0..n {
            inner
                .prepare_failures
                .push_back(RelayError::PrepareFailed("feed offline".to_string()));
        }
    }

    /// Move a playback session to `state`.
    pub fn set_state(&self, handle: PlaybackHandle, state: PlaybackState) {
        let inner = self.inner.lock().unwrap();
        let sender = inner
            .sessions
            .get(&handle.id())
            .expect("unknown playback handle");
        sender.send_replace(state);
    }

    /// The most recently prepared session.
    #[must_use]
    pub fn latest(&self) -> Option<PlaybackHandle> {
        self.inner.lock().unwrap().prepared.last().copied()
    }

    #[must_use]
    pub fn prepared(&self) -> Vec<PlaybackHandle> {
        self.inner.lock().unwrap().prepared.clone()
    }

    #[must_use]
    pub fn released(&self) -> Vec<PlaybackHandle> {
        self.inner.lock().unwrap().released.clone()
    }
}

#[async_trait]
impl RelayPlayer for MockRelayPlayer {
    async fn prepare(&self, _url: &SecretString) -> Result<PlaybackHandle, RelayError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(err) = inner.prepare_failures.pop_front() {
            return Err(err);
        }
        let handle = PlaybackHandle::new(inner.next_id);
        inner.next_id += 1;
        let (tx, _) = watch::channel(inner.initial_state);
        inner.sessions.insert(handle.id(), tx);
        inner.prepared.push(handle);
        Ok(handle)
    }

    fn playback_states(&self, handle: &PlaybackHandle) -> watch::Receiver<PlaybackState> {
        let mut inner = self.inner.lock().unwrap();
        let initial = inner.initial_state;
        inner
            .sessions
            .entry(handle.id())
            .or_insert_with(|| watch::channel(initial).0)
            .subscribe()
    }

    async fn release(&self, handle: PlaybackHandle) {
        self.inner.lock().unwrap().released.push(handle);
    }
}
