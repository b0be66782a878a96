//! Relay feed attachment.
//!
//! 1. Prepare a playback session and wait (bounded) until it can produce frames.
//! 2. On failure fall back to the placeholder video.
//! 3. On success attach the feed as video with the microphone as audio, then
//!    start the ingest health monitor and the screen-audio upgrade window.

use crate::collaborators::{AudioSource, PlaybackHandle, PlaybackState, VideoSource, VideoSourceKind};
use crate::errors::{RelayError, ScError};
use crate::observability::metrics;
use crate::session::controller::SessionController;
use crate::session::SessionEvent;

use common::secret::SecretString;
use std::sync::atomic::Ordering;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Wait for the playback session to become ready.
async fn wait_until_ready(states: &mut watch::Receiver<PlaybackState>) -> Result<(), RelayError> {
    loop {
        let state = *states.borrow_and_update();
        if state.is_ready() {
            return Ok(());
        }
        if state == PlaybackState::Ended {
            return Err(RelayError::EndedBeforeReady);
        }
        if states.changed().await.is_err() {
            return Err(RelayError::PrepareFailed(
                "playback state stream closed".to_string(),
            ));
        }
    }
}

impl SessionController {
    /// Attach the relay feed at `url` as the video source.
    ///
    /// With `report_failures` unset (the background reattach loop) a failure
    /// is announced as a message instead of a user-facing error.
    pub(crate) async fn attach_relay(
        &self,
        url: SecretString,
        token: CancellationToken,
        report_failures: bool,
    ) -> Result<(), ScError> {
        let relay = &self.inner.relay;
        let started = Instant::now();
        if self.inner.flags.is_cleanup_in_progress() {
            debug!(target: "sc.sources", "Relay attach deferred until cleanup finishes");
            return Err(ScError::Busy);
        }

        let prepared = tokio::select! {
            () = token.cancelled() => return Err(ScError::Cancelled),
            prepared = relay.prepare(&url) => prepared,
        };
        let handle = match prepared {
            Ok(handle) => handle,
            Err(e) => {
                return self
                    .fall_back_to_placeholder(None, e.into(), report_failures)
                    .await;
            }
        };
        debug!(target: "sc.sources", handle = handle.id(), "Relay playback prepared");

        let mut states = relay.playback_states(&handle);
        let limit = self.inner.config.relay_ready_timeout;
        let ready = tokio::select! {
            () = token.cancelled() => {
                relay.release(handle).await;
                return Err(ScError::Cancelled);
            }
            ready = tokio::time::timeout(limit, wait_until_ready(&mut states)) => {
                ready.unwrap_or(Err(RelayError::NotReady(limit)))
            }
        };
        if let Err(e) = ready {
            return self
                .fall_back_to_placeholder(Some(handle), e.into(), report_failures)
                .await;
        }
        metrics::record_relay_ready(started.elapsed());

        let mut state = tokio::select! {
            () = token.cancelled() => {
                relay.release(handle).await;
                return Err(ScError::Cancelled);
            }
            state = self.inner.state.lock() => state,
        };
        if token.is_cancelled() {
            drop(state);
            relay.release(handle).await;
            return Err(ScError::Cancelled);
        }
        if self.inner.flags.is_cleanup_in_progress() {
            drop(state);
            relay.release(handle).await;
            debug!(target: "sc.sources", "Relay attach deferred until cleanup finishes");
            return Err(ScError::Busy);
        }

        // Video first; audio never blocks on permission state.
        if let Err(e) = self
            .swap_sources(&mut state, VideoSource::Relay(handle), AudioSource::Microphone)
            .await
        {
            drop(state);
            return self
                .fall_back_to_placeholder(Some(handle), e.into(), report_failures)
                .await;
        }
        let previous = state.relay_playback.replace(handle);
        drop(state);
        if let Some(previous) = previous.filter(|p| *p != handle) {
            relay.release(previous).await;
        }

        self.inner
            .ingest_fallback_in_flight
            .store(false, Ordering::SeqCst);
        info!(target: "sc.sources", handle = handle.id(), "Relay feed attached");

        self.spawn_health_monitor(handle);
        self.spawn_audio_upgrade();
        Ok(())
    }

    /// Show the placeholder after a failed relay attach and report `err`.
    async fn fall_back_to_placeholder(
        &self,
        handle: Option<PlaybackHandle>,
        err: ScError,
        report_failures: bool,
    ) -> Result<(), ScError> {
        warn!(target: "sc.sources", error = %err, "Relay feed unavailable, showing placeholder");
        if let Some(handle) = handle {
            self.inner.relay.release(handle).await;
        }

        {
            let mut state = self.lock_when_clean().await;
            self.release_relay_playback(&mut state).await;
            if let Err(e) = self
                .swap_sources(&mut state, VideoSource::Placeholder, AudioSource::Microphone)
                .await
            {
                warn!(target: "sc.sources", error = %e, "Failed to attach placeholder");
            }
        }

        if report_failures {
            self.surface(err.clone());
        } else {
            self.publish(SessionEvent::Message(
                "Relay feed still unavailable".to_string(),
            ));
        }
        Err(err)
    }

    /// Try to upgrade relay audio to screen capture for a bounded window.
    pub(crate) fn spawn_audio_upgrade(&self) {
        let this = self.clone();
        self.inner
            .tasks
            .audio_upgrade
            .spawn(move |token| async move {
                let window = this.inner.config.audio_upgrade_window;
                tokio::select! {
                    () = token.cancelled() => {}
                    upgraded = tokio::time::timeout(window, this.run_audio_upgrade(&token)) => {
                        if upgraded.is_err() {
                            debug!(target: "sc.sources", "No capture token within upgrade window, keeping microphone");
                        }
                    }
                }
            });
    }

    async fn run_audio_upgrade(&self, token: &CancellationToken) {
        let poll = self.inner.config.audio_upgrade_poll;
        loop {
            if let Some(capture) = self.inner.lease.valid_token() {
                let _state = self.lock_when_clean().await;
                if token.is_cancelled() {
                    return;
                }
                let video = self.inner.engine.video_source().map(|v| v.kind());
                if !matches!(
                    video,
                    Some(VideoSourceKind::Relay | VideoSourceKind::Placeholder)
                ) {
                    return;
                }
                match self
                    .inner
                    .engine
                    .set_audio_source(AudioSource::ScreenAudioCapture(capture))
                    .await
                {
                    Ok(()) => info!(target: "sc.sources", "Relay audio upgraded to screen capture"),
                    Err(e) => warn!(target: "sc.sources", error = %e, "Screen audio upgrade failed"),
                }
                return;
            }
            tokio::time::sleep(poll).await;
        }
    }
}
