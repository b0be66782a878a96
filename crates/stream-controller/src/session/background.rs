//! Background scheduler: engine event pump and orientation watcher.
//!
//! Both tasks are owned by the controller's root `CancellationToken` and are
//! started and stopped explicitly by the host.

use super::controller::SessionController;
use super::events::{format_bitrate, SessionEvent};
use super::phase::Phase;
use crate::collaborators::{EngineEvent, Rotation};
use crate::errors::ScError;

use std::sync::PoisonError;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// How long `shutdown()` waits for each background task.
const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

impl SessionController {
    /// Start the background scheduler. Idempotent.
    pub fn start_background(&self) {
        let mut handles = self
            .inner
            .background
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !handles.is_empty() {
            warn!(target: "sc.session", "Background scheduler already running");
            return;
        }

        let events = self.inner.engine.subscribe();
        let this = self.clone();
        let shutdown = self.inner.shutdown.clone();
        handles.push(tokio::spawn(async move {
            this.run_event_pump(events, shutdown).await;
        }));

        let orientation = self
            .inner
            .orientation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(orientation) = orientation {
            let this = self.clone();
            let shutdown = self.inner.shutdown.clone();
            handles.push(tokio::spawn(async move {
                this.run_orientation_watcher(orientation, shutdown).await;
            }));
        }

        info!(target: "sc.session", session_id = %self.inner.session_id, "Background scheduler started");
    }

    /// Stop the session and the background scheduler.
    ///
    /// Cancels every background task and waits (bounded) for the scheduler
    /// tasks to exit.
    #[instrument(skip_all, fields(session_id = %self.inner.session_id))]
    pub async fn shutdown(&self) {
        self.stop().await;
        self.inner.timer.cancel();
        self.inner.shutdown.cancel();

        let handles = std::mem::take(
            &mut *self
                .inner
                .background
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, handle)
                .await
                .is_err()
            {
                warn!(target: "sc.session", "Background task did not exit in time");
            }
        }
        info!(target: "sc.session", "Controller shut down");
    }

    async fn run_event_pump(
        &self,
        mut events: broadcast::Receiver<EngineEvent>,
        shutdown: CancellationToken,
    ) {
        debug!(target: "sc.session", "Engine event pump running");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => self.handle_engine_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "sc.session", skipped, "Engine event stream lagged");
                    }
                    Err(RecvError::Closed) => {
                        debug!(target: "sc.session", "Engine event stream closed");
                        break;
                    }
                },
            }
        }
    }

    async fn handle_engine_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::StreamingChanged(true) => self.on_engine_streaming().await,
            EngineEvent::StreamingChanged(false) => {
                self.on_connection_lost("engine stopped streaming", true)
                    .await;
            }
            EngineEvent::ConnectionLost(reason) => self.on_connection_lost(&reason, false).await,
            EngineEvent::Fatal(message) => self.on_engine_fatal(message).await,
            EngineEvent::Bitrate(bps) => self.publish(SessionEvent::Bitrate(format_bitrate(bps))),
        }
    }

    async fn on_engine_streaming(&self) {
        let mut state = self.inner.state.lock().await;
        if self.inner.flags.is_user_stopped() {
            return;
        }
        if matches!(self.phase(), Phase::Connecting { .. }) {
            self.mark_streaming(&mut state).await;
        }
    }

    /// `from_streaming_flag` marks a plain "not streaming" signal, which only
    /// means a loss while live and only if the engine agrees.
    async fn on_connection_lost(&self, reason: &str, from_streaming_flag: bool) {
        let mut state = self.inner.state.lock().await;
        if self.inner.flags.is_user_stopped() {
            return;
        }
        let phase = self.phase();
        if from_streaming_flag && (phase != Phase::Streaming || self.inner.engine.is_streaming()) {
            return;
        }

        match phase {
            Phase::Streaming | Phase::Connecting { is_retry: false } => {
                if self.inner.config.auto_reconnect {
                    self.enter_reconnect(&mut state, reason).await;
                } else {
                    error!(target: "sc.session", reason, "Connection lost, auto-reconnect disabled");
                    if self.inner.engine.is_streaming() {
                        self.inner.engine.stop_stream().await;
                    }
                    self.close_fast(&mut state).await;
                    self.inner.lease.release();
                    self.set_phase(Phase::Error);
                    self.surface(ScError::Connection(reason.to_string()));
                    self.enter_idle();
                }
            }
            Phase::Connecting { is_retry: true } => {
                if self.inner.timer.is_pending() {
                    debug!(target: "sc.session", reason, "Connection loss during outage, retry already scheduled");
                } else if state.endpoint_open {
                    // A retry opened the endpoint and lost it before streaming.
                    warn!(target: "sc.session", reason, "Retry lost its connection, rescheduling");
                    self.teardown_connection(&mut state).await;
                    if !self.inner.flags.is_user_stopped() {
                        self.schedule_retry();
                    }
                }
            }
            Phase::Idle | Phase::Starting | Phase::Error => {}
        }
    }

    async fn on_engine_fatal(&self, message: String) {
        let mut state = self.inner.state.lock().await;
        if self.inner.flags.is_user_stopped() && self.phase().is_idle() {
            debug!(target: "sc.session", "Ignoring engine fatal error after stop");
            return;
        }
        if std::mem::replace(&mut state.fatal_reported, true) {
            debug!(target: "sc.session", "Engine fatal error already reported");
            return;
        }

        error!(target: "sc.session", error = %message, "Engine fatal error");
        self.inner.timer.cancel();

        let was_live = !self.phase().is_idle();
        if was_live {
            if self.inner.engine.is_streaming() {
                if tokio::time::timeout(
                    self.inner.config.stop_stream_timeout,
                    self.inner.engine.stop_stream(),
                )
                .await
                .is_err()
                {
                    warn!(target: "sc.session", "stop_stream timed out after fatal error");
                }
            }
            self.close_fast(&mut state).await;
            self.inner.lease.release();
            self.set_phase(Phase::Error);
        }
        self.surface(ScError::EngineFatal(message));
        if was_live {
            self.enter_idle();
        }
    }

    async fn run_orientation_watcher(
        &self,
        mut orientation: watch::Receiver<Rotation>,
        shutdown: CancellationToken,
    ) {
        let initial = *orientation.borrow_and_update();
        self.set_device_rotation(initial);

        loop {
            let next = tokio::select! {
                () = shutdown.cancelled() => break,
                changed = async {
                    orientation.changed().await.map(|()| *orientation.borrow_and_update())
                } => changed,
            };
            match next {
                Ok(rotation) => self.set_device_rotation(rotation),
                Err(_) => {
                    debug!(target: "sc.session", "Orientation source closed");
                    break;
                }
            }
        }
    }
}
