//! Reconnection protocol.
//!
//! Entered when a live or connecting session loses its connection and the
//! user has not stopped. Entry tears the connection down, and every retry
//! runs the same connect sequence as `start()` with user-facing errors
//! suppressed. Retries repeat with a fixed delay until success, user stop,
//! a fatal engine error, or the optional attempt limit.

use super::controller::{SessionController, SessionState, POLL_INTERVAL};
use super::events::SessionEvent;
use super::phase::Phase;
use crate::collaborators::{AudioSource, AudioSourceKind};
use crate::errors::ScError;
use crate::observability::metrics;

use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

impl SessionController {
    /// Enter reconnection. Caller holds the session lock.
    pub(crate) async fn enter_reconnect(&self, state: &mut SessionState, reason: &str) {
        if self.inner.flags.is_user_stopped() {
            debug!(target: "sc.session", reason, "User stopped, not reconnecting");
            return;
        }
        if self.phase().is_reconnecting() {
            debug!(target: "sc.session", reason, "Reconnection already active");
            return;
        }

        self.set_phase(Phase::Connecting { is_retry: true });
        warn!(target: "sc.session", reason, "Connection lost, reconnecting");
        self.publish(SessionEvent::Message(format!(
            "Connection lost, reconnecting in {}s",
            self.inner.policy.delay.as_secs()
        )));

        self.teardown_connection(state).await;
        if self.inner.flags.is_user_stopped() {
            debug!(target: "sc.session", "User stopped during teardown, no retry scheduled");
            return;
        }
        self.schedule_retry();
    }

    /// Release everything bound to the current engine connection.
    pub(crate) async fn teardown_connection(&self, state: &mut SessionState) {
        let tasks = &self.inner.tasks;
        if tasks.relay_retry.is_running() {
            state.relay_reattach_owed = true;
        }
        tasks.cancel_retry_and_upgrade();

        let engine = &self.inner.engine;
        let config = &self.inner.config;

        // The close below invalidates the capture token, so screen audio
        // must come off first.
        if engine.audio_source() == Some(AudioSourceKind::ScreenAudioCapture) {
            self.inner.lease.owe_restore();
            match engine.set_audio_source(AudioSource::Microphone).await {
                Ok(()) => debug!(target: "sc.session", "Screen audio downgraded to microphone"),
                Err(e) => warn!(target: "sc.session", error = %e, "Failed to downgrade screen audio"),
            }
        }

        if engine.is_streaming()
            && tokio::time::timeout(config.stop_stream_timeout, engine.stop_stream())
                .await
                .is_err()
        {
            warn!(target: "sc.session", "stop_stream timed out during teardown");
        }

        if std::mem::take(&mut state.regulator_attached) {
            engine.detach_bitrate_regulator();
        }

        if std::mem::take(&mut state.endpoint_open) {
            match tokio::time::timeout(config.fast_close_timeout, engine.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(target: "sc.session", error = %e, "Close during teardown failed"),
                Err(_) => warn!(target: "sc.session", "Close during teardown timed out"),
            }
        }
        self.inner.lease.invalidate_on_close();

        let drained = async {
            while engine.is_streaming() {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        if tokio::time::timeout(config.not_streaming_wait, drained)
            .await
            .is_err()
        {
            warn!(target: "sc.session", "Engine still reports streaming after teardown");
        }
    }

    /// Schedule the next attempt after the fixed policy delay.
    pub(crate) fn schedule_retry(&self) {
        let delay = self.inner.policy.delay;
        let this = self.clone();
        self.inner
            .timer
            .schedule(delay, move |token| async move { this.retry_attempt(token).await });
        debug!(
            target: "sc.session",
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnect scheduled"
        );
    }

    #[instrument(skip_all, fields(session_id = %self.inner.session_id))]
    async fn retry_attempt(&self, token: CancellationToken) {
        if token.is_cancelled() || self.inner.flags.is_user_stopped() {
            return;
        }
        let mut state = self.inner.state.lock().await;
        if token.is_cancelled()
            || self.inner.flags.is_user_stopped()
            || !self.phase().is_reconnecting()
        {
            debug!(target: "sc.session", "Reconnect attempt abandoned before running");
            return;
        }

        let attempt = self.inner.retry_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_reconnect_attempt();
        info!(target: "sc.session", attempt, "Reconnect attempt");
        self.publish(SessionEvent::Message(format!(
            "Reconnecting (attempt {attempt})"
        )));

        let err = match self.connect(&mut state, true).await {
            Ok(_) => return,
            Err(err) => err,
        };

        if matches!(err, ScError::Cancelled) || self.inner.flags.is_user_stopped() {
            debug!(target: "sc.session", "Reconnect attempt aborted by user stop");
            return;
        }

        metrics::record_reconnect_outcome("failure");
        self.surface(err.clone());

        if matches!(err, ScError::EngineFatal(_)) {
            state.fatal_reported = true;
            self.abandon_reconnect(&mut state, err).await;
            return;
        }
        if !self.inner.policy.allows_another(attempt) {
            self.abandon_reconnect(&mut state, ScError::RetriesExhausted(attempt))
                .await;
            return;
        }

        warn!(target: "sc.session", attempt, error = %err, "Reconnect attempt failed, rescheduling");
        self.teardown_connection(&mut state).await;
        if self.inner.flags.is_user_stopped() {
            return;
        }
        self.publish(SessionEvent::Message(format!(
            "Reconnect failed, retrying in {}s",
            self.inner.policy.delay.as_secs()
        )));
        self.schedule_retry();
    }

    /// Leave reconnection for good and surface `err` once.
    async fn abandon_reconnect(&self, state: &mut SessionState, err: ScError) {
        error!(target: "sc.session", error = %err, "Giving up on reconnection");
        metrics::record_reconnect_outcome("abandoned");

        self.teardown_connection(state).await;
        self.inner.lease.release();
        self.inner.retry_attempts.store(0, Ordering::SeqCst);
        state.connect_started = None;

        // Leaving the reconnect phase lifts error suppression.
        self.set_phase(Phase::Error);
        self.surface(err);
        self.enter_idle();
    }
}
