//! Ingest health monitor and relay fallback.
//!
//! A relay ingest hiccup is not an outbound connection failure: the fallback
//! here swaps the video to the placeholder and retries the relay on its own
//! loop, without touching the session phase or the reconnect timer.

use super::classifier::{DisconnectReason, IngestClassifier, Verdict};
use crate::collaborators::{AudioSource, PlaybackHandle, PlaybackState, VideoSource, VideoSourceKind};
use crate::errors::ScError;
use crate::observability::metrics;
use crate::session::controller::SessionController;
use crate::session::SessionEvent;

use common::secret::SecretString;
use std::sync::atomic::Ordering;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl SessionController {
    /// Watch the relay playback session behind `handle`.
    pub(crate) fn spawn_health_monitor(&self, handle: PlaybackHandle) {
        let states = self.inner.relay.playback_states(&handle);
        let this = self.clone();
        self.inner
            .tasks
            .health_monitor
            .spawn(move |token| async move {
                this.monitor_ingest(handle, states, token).await;
            });
    }

    async fn monitor_ingest(
        &self,
        handle: PlaybackHandle,
        mut states: watch::Receiver<PlaybackState>,
        token: CancellationToken,
    ) {
        let mut classifier = IngestClassifier::new(self.inner.config.buffering_threshold);
        let mut verdict = classifier.observe(*states.borrow_and_update(), Instant::now());
        debug!(target: "sc.health", handle = handle.id(), "Ingest health monitor running");

        let reason = loop {
            let deadline = match verdict {
                Verdict::Disconnected(reason) => break reason,
                Verdict::Buffering { deadline } => Some(deadline),
                Verdict::Healthy => None,
            };
            verdict = tokio::select! {
                () = token.cancelled() => return,
                changed = async {
                    states.changed().await.map(|()| *states.borrow_and_update())
                } => match changed {
                    Ok(state) => classifier.observe(state, Instant::now()),
                    Err(_) => {
                        debug!(target: "sc.health", handle = handle.id(), "Playback state stream closed");
                        return;
                    }
                },
                () = sleep_until_opt(deadline) => classifier.poll(Instant::now()),
            };
        };

        if token.is_cancelled() {
            return;
        }
        self.handle_ingest_disconnect(reason).await;
    }

    /// React to a relay feed disconnect.
    ///
    /// Returns `false` if the signal was ignored: a fallback is already in
    /// flight, or the relay is no longer the video source.
    #[instrument(skip_all, fields(session_id = %self.inner.session_id, reason = reason.as_str()))]
    pub async fn handle_ingest_disconnect(&self, reason: DisconnectReason) -> bool {
        if self
            .inner
            .ingest_fallback_in_flight
            .swap(true, Ordering::SeqCst)
        {
            debug!(target: "sc.health", "Ingest fallback already in flight, ignoring signal");
            return false;
        }
        let video = self.inner.engine.video_source().map(|v| v.kind());
        if video != Some(VideoSourceKind::Relay) {
            self.inner
                .ingest_fallback_in_flight
                .store(false, Ordering::SeqCst);
            debug!(target: "sc.health", "Relay is not the video source, ignoring signal");
            return false;
        }

        warn!(target: "sc.health", "Relay feed lost, falling back to placeholder");
        metrics::record_ingest_disconnect(reason.as_str());
        self.inner.tasks.audio_upgrade.cancel();

        {
            let mut state = self.lock_when_clean().await;
            if let Err(e) = self
                .swap_sources(&mut state, VideoSource::Placeholder, AudioSource::Microphone)
                .await
            {
                warn!(target: "sc.health", error = %e, "Failed to attach placeholder");
            }
            self.release_relay_playback(&mut state).await;
        }

        self.publish(SessionEvent::Message(
            "Relay feed lost, retrying".to_string(),
        ));
        self.spawn_relay_reattach();
        true
    }

    /// Start (or restart) the relay reattach loop.
    pub(crate) fn spawn_relay_reattach(&self) {
        let Some(url) = self.inner.config.relay_url.clone() else {
            self.inner
                .ingest_fallback_in_flight
                .store(false, Ordering::SeqCst);
            warn!(target: "sc.health", "No relay feed URL, not reattaching");
            return;
        };

        self.inner
            .ingest_fallback_in_flight
            .store(true, Ordering::SeqCst);
        let this = self.clone();
        self.inner
            .tasks
            .relay_retry
            .spawn(move |token| async move {
                this.run_relay_reattach(url, token).await;
            });
    }

    async fn run_relay_reattach(&self, url: SecretString, token: CancellationToken) {
        let delay = self.inner.config.relay_retry_delay;
        let mut attempt: u32 = 0;
        loop {
            tokio::select! {
                () = token.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
            debug!(target: "sc.health", attempt, "Relay reattach attempt");

            match self.attach_relay(url.clone(), token.clone(), false).await {
                Ok(()) => {
                    info!(target: "sc.health", attempt, "Relay feed reattached");
                    self.publish(SessionEvent::Message("Relay feed restored".to_string()));
                    return;
                }
                Err(ScError::Cancelled) => return,
                Err(e) => {
                    debug!(target: "sc.health", attempt, error = %e, "Relay reattach failed");
                }
            }
        }
    }
}
