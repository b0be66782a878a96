//! Source-switch protocol.
//!
//! Switching is refused while a connection attempt is in flight or a slow
//! close is running. Relay and external-device switches hand the slow part
//! (playback preparation, permission handshake) to the `switch` task slot;
//! switching back to the camera first cancels every background source task
//! and gives the previous source time to release the hardware.

use super::{preferred_audio, SwitchOutcome};
use crate::collaborators::{
    AudioSource, PromptHandle, VideoSource, VideoSourceKind,
};
use crate::errors::{EngineError, ScError};
use crate::observability::metrics;
use crate::session::controller::{SessionController, SessionState};
use crate::session::Phase;

use std::sync::atomic::Ordering;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

impl SessionController {
    /// Switch the upstream video source.
    ///
    /// # Arguments
    ///
    /// * `target` - The source to switch to
    /// * `prompt` - Permission UI. Required for `ExternalDevice`; for `Relay`
    ///   it is used to acquire a capture token when streaming without one.
    ///
    /// # Errors
    ///
    /// - `ScError::Busy` while connecting, reconnecting or cleaning up
    /// - `ScError::PermissionDenied` if a required permission was refused
    /// - `ScError::Configuration` if no relay URL is configured
    /// - `ScError::RelayUnavailable` if the relay feed never became ready
    ///   (video falls back to the placeholder)
    #[instrument(skip_all, fields(session_id = %self.inner.session_id, source = target.as_str()))]
    pub async fn switch_video_source(
        &self,
        target: VideoSourceKind,
        prompt: Option<PromptHandle>,
    ) -> Result<SwitchOutcome, ScError> {
        if self.inner.flags.is_cleanup_in_progress() || self.phase().is_connecting() {
            debug!(target: "sc.sources", phase = %self.phase(), "Switch rejected while connecting or cleaning up");
            return Err(ScError::Busy);
        }

        let result = match target {
            VideoSourceKind::Relay => self.switch_to_relay(prompt).await,
            VideoSourceKind::ExternalDevice => self.switch_to_external_device(prompt),
            VideoSourceKind::Capture => self.switch_to_capture().await,
            VideoSourceKind::Placeholder => self.switch_to_placeholder().await,
        };

        let status = match &result {
            Ok(SwitchOutcome::Switched | SwitchOutcome::Unchanged) => "success",
            Ok(SwitchOutcome::Pending) => "pending",
            Err(ScError::PermissionDenied(_)) => "denied",
            Err(_) => "failed",
        };
        metrics::record_source_switch(target.as_str(), status);
        result
    }

    async fn switch_to_relay(&self, prompt: Option<PromptHandle>) -> Result<SwitchOutcome, ScError> {
        let Some(url) = self.inner.config.relay_url.clone() else {
            return Err(ScError::Configuration(
                "no relay feed URL configured".to_string(),
            ));
        };

        if let Some(VideoSource::Capture {
            device_id: Some(device),
        }) = self.inner.engine.video_source()
        {
            self.inner.state.lock().await.last_capture_device = Some(device);
        }

        // Never prompt while idle; only a live stream needs the token now.
        if self.phase() == Phase::Streaming && !self.inner.lease.has_valid_token() {
            if let Some(prompt) = prompt.as_ref() {
                if self.inner.lease.acquire(prompt).await.is_none() {
                    warn!(target: "sc.sources", "Screen audio capture refused, keeping current source");
                    return Err(ScError::PermissionDenied(
                        "screen audio capture was not granted".to_string(),
                    ));
                }
            }
        }

        self.cancel_relay_fallback();
        let (tx, rx) = oneshot::channel();
        let this = self.clone();
        self.inner.tasks.switch.spawn(move |token| async move {
            let result = this.attach_relay(url, token, true).await;
            let _ = tx.send(result);
        });

        match rx.await {
            Ok(Ok(())) => Ok(SwitchOutcome::Switched),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ScError::Cancelled),
        }
    }

    fn switch_to_external_device(
        &self,
        prompt: Option<PromptHandle>,
    ) -> Result<SwitchOutcome, ScError> {
        let Some(prompt) = prompt else {
            return Err(ScError::PermissionDenied(
                "external device access needs a permission prompt".to_string(),
            ));
        };

        let this = self.clone();
        self.inner.tasks.switch.spawn(move |token| async move {
            this.attach_external_device(prompt, token).await;
        });
        debug!(target: "sc.sources", "External device switch pending permission");
        Ok(SwitchOutcome::Pending)
    }

    async fn attach_external_device(&self, prompt: PromptHandle, token: CancellationToken) {
        let granted = tokio::select! {
            () = token.cancelled() => return,
            granted = prompt.confirm_device_access() => granted,
        };
        if !granted {
            warn!(target: "sc.sources", "External device access refused");
            metrics::record_source_switch(VideoSourceKind::ExternalDevice.as_str(), "denied");
            self.surface(ScError::PermissionDenied(
                "external device access was denied".to_string(),
            ));
            return;
        }

        let mut state = tokio::select! {
            () = token.cancelled() => return,
            state = self.lock_when_clean() => state,
        };
        if token.is_cancelled() {
            return;
        }

        self.cancel_relay_fallback();
        self.inner.tasks.audio_upgrade.cancel();
        self.inner.tasks.health_monitor.cancel();
        self.release_relay_playback(&mut state).await;

        let result = self
            .swap_sources(&mut state, VideoSource::ExternalDevice, AudioSource::Microphone)
            .await;
        match result {
            Ok(()) => info!(target: "sc.sources", "External device attached"),
            Err(e) => {
                warn!(target: "sc.sources", error = %e, "External device attach failed");
                drop(state);
                self.surface(e.into());
            }
        }
    }

    async fn switch_to_capture(&self) -> Result<SwitchOutcome, ScError> {
        let current = self.inner.engine.video_source().map(|v| v.kind());
        self.inner.tasks.cancel_source_work();
        self.inner
            .ingest_fallback_in_flight
            .store(false, Ordering::SeqCst);

        if current == Some(VideoSourceKind::Capture) {
            return Ok(SwitchOutcome::Unchanged);
        }
        if matches!(
            current,
            Some(VideoSourceKind::Relay | VideoSourceKind::ExternalDevice)
        ) {
            tokio::time::sleep(self.inner.config.settle_delay).await;
        }

        let mut state = self.lock_when_clean().await;
        let device_id = state.last_capture_device.clone();
        self.swap_sources(
            &mut state,
            VideoSource::Capture { device_id },
            AudioSource::Microphone,
        )
        .await?;
        self.release_relay_playback(&mut state).await;
        info!(target: "sc.sources", "Switched back to camera");
        Ok(SwitchOutcome::Switched)
    }

    async fn switch_to_placeholder(&self) -> Result<SwitchOutcome, ScError> {
        self.inner.tasks.cancel_source_work();
        self.inner
            .ingest_fallback_in_flight
            .store(false, Ordering::SeqCst);

        let mut state = self.lock_when_clean().await;
        let audio = preferred_audio(
            VideoSourceKind::Placeholder,
            self.inner.lease.valid_token(),
        );
        self.swap_sources(&mut state, VideoSource::Placeholder, audio)
            .await?;
        self.release_relay_playback(&mut state).await;
        info!(target: "sc.sources", "Switched to placeholder");
        Ok(SwitchOutcome::Switched)
    }

    /// Set video then audio, re-binding the bitrate regulator around the swap.
    pub(crate) async fn swap_sources(
        &self,
        state: &mut SessionState,
        video: VideoSource,
        audio: AudioSource,
    ) -> Result<(), EngineError> {
        let engine = &self.inner.engine;
        let rebind = state.regulator_attached && self.phase() == Phase::Streaming;
        if rebind {
            engine.detach_bitrate_regulator();
            state.regulator_attached = false;
        }

        let result = async {
            engine.set_video_source(video).await?;
            engine.set_audio_source(audio).await
        }
        .await;

        if rebind {
            tokio::time::sleep(self.inner.config.regulator_settle_delay).await;
            self.attach_regulator(state);
        }
        result
    }

    pub(crate) async fn release_relay_playback(&self, state: &mut SessionState) {
        if let Some(handle) = state.relay_playback.take() {
            debug!(target: "sc.sources", handle = handle.id(), "Releasing relay playback session");
            self.inner.relay.release(handle).await;
        }
    }

    /// Stop the ingest fallback loop; a new source decision replaces it.
    pub(crate) fn cancel_relay_fallback(&self) {
        self.inner.tasks.relay_retry.cancel();
        self.inner
            .ingest_fallback_in_flight
            .store(false, Ordering::SeqCst);
    }
}
