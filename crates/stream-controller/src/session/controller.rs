//! `SessionController` - owner of the single outbound stream session.
//!
//! The controller serializes every engine mutation through one async mutex
//! over [`SessionState`]:
//!
//! - `start()` uses `try_lock` and rejects with [`ScError::Busy`] instead of
//!   queueing behind a running operation
//! - `stop()` signals cancellation *before* waiting for the mutex, so an
//!   in-flight start or retry aborts at its next suspension point
//! - background work (event pump, retries) uses `lock().await`
//!
//! The slow close after a live stream runs outside the mutex; the
//! `cleanup_in_progress` flag keeps `start()` out until it finishes, and
//! source swaps go through `lock_when_clean()` so they wait for it too.

use super::events::SessionEvent;
use super::flags::{FlagSnapshot, SessionFlags};
use super::phase::{Phase, SessionStatus};
use super::policy::ReconnectPolicy;
use super::rotation::RotationState;
use super::timer::ReconnectTimer;
use crate::collaborators::{
    AudioSource, CaptureToken, Collaborators, EndpointSource, MediaEngine, PlaybackHandle, RelayPlayer,
    Rotation, StatusSink, VideoSource, VideoSourceKind,
};
use crate::config::Config;
use crate::errors::{EngineError, ScError};
use crate::observability::metrics;
use crate::permissions::CaptureTokenLease;
use crate::sources::SourceTasks;

use common::types::{DeviceId, SessionId};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Interval for polling engine readiness conditions.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Capacity of the host event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// How `start()` finished when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The engine reports streaming.
    Streaming,
    /// Open and start succeeded; the engine has not reported streaming yet.
    AwaitingEngine,
    /// The attempt failed transiently and the reconnection protocol took over.
    Reconnecting,
    /// The user stopped the session while it was starting.
    Cancelled,
}

/// Mutable session state. Only touched while holding the session mutex.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    /// `open` was attempted since the last close.
    pub(crate) endpoint_open: bool,
    pub(crate) regulator_attached: bool,
    pub(crate) relay_playback: Option<PlaybackHandle>,
    /// Camera in use before switching away, restored when switching back.
    pub(crate) last_capture_device: Option<DeviceId>,
    /// A relay reattach loop was interrupted by a reconnect.
    pub(crate) relay_reattach_owed: bool,
    pub(crate) connect_started: Option<Instant>,
    pub(crate) fatal_reported: bool,
}

pub(crate) struct Inner {
    pub(crate) session_id: SessionId,
    pub(crate) config: Config,
    pub(crate) policy: ReconnectPolicy,
    pub(crate) engine: Arc<dyn MediaEngine>,
    pub(crate) relay: Arc<dyn RelayPlayer>,
    pub(crate) endpoints: Arc<dyn EndpointSource>,
    pub(crate) sink: Option<Arc<dyn StatusSink>>,
    pub(crate) lease: CaptureTokenLease,
    pub(crate) flags: SessionFlags,
    pub(crate) phase_tx: watch::Sender<Phase>,
    pub(crate) events_tx: broadcast::Sender<SessionEvent>,
    pub(crate) state: Mutex<SessionState>,
    pub(crate) rotation: StdMutex<RotationState>,
    pub(crate) timer: ReconnectTimer,
    pub(crate) tasks: SourceTasks,
    pub(crate) ingest_fallback_in_flight: AtomicBool,
    pub(crate) muted: AtomicBool,
    pub(crate) retry_attempts: AtomicU32,
    /// Root token for the background scheduler and all task slots.
    pub(crate) shutdown: CancellationToken,
    pub(crate) orientation: StdMutex<Option<watch::Receiver<Rotation>>>,
    pub(crate) background: StdMutex<Vec<JoinHandle<()>>>,
}

/// Handle to the stream session controller.
///
/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct SessionController {
    pub(crate) inner: Arc<Inner>,
}

impl SessionController {
    /// Create a controller for one stream session.
    ///
    /// Nothing runs until [`start_background`](Self::start_background) is
    /// called; engine events emitted before that are not observed.
    #[must_use]
    pub fn new(collaborators: Collaborators, config: Config) -> Self {
        let Collaborators {
            engine,
            relay,
            broker,
            endpoints,
            sink,
            orientation,
        } = collaborators;

        let (phase_tx, _) = watch::channel(Phase::Idle);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();
        let session_id = SessionId::new();

        info!(
            target: "sc.session",
            session_id = %session_id,
            auto_reconnect = config.auto_reconnect,
            reconnect_delay_ms = u64::try_from(config.reconnect_delay.as_millis()).unwrap_or(u64::MAX),
            "Stream session controller created"
        );

        Self {
            inner: Arc::new(Inner {
                session_id,
                policy: ReconnectPolicy::from_config(&config),
                config,
                engine,
                relay,
                endpoints,
                sink,
                lease: CaptureTokenLease::new(broker),
                flags: SessionFlags::new(),
                phase_tx,
                events_tx,
                state: Mutex::new(SessionState::default()),
                rotation: StdMutex::new(RotationState::default()),
                timer: ReconnectTimer::new(),
                tasks: SourceTasks::new(&shutdown),
                ingest_fallback_in_flight: AtomicBool::new(false),
                muted: AtomicBool::new(false),
                retry_attempts: AtomicU32::new(0),
                shutdown,
                orientation: StdMutex::new(orientation),
                background: StdMutex::new(Vec::new()),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Observables
    // ------------------------------------------------------------------

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.inner.session_id
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.inner.phase_tx.borrow()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.phase().status()
    }

    /// Lock-free view of the controller flags.
    #[must_use]
    pub fn flags(&self) -> FlagSnapshot {
        self.inner.flags.snapshot()
    }

    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.inner.phase_tx.subscribe()
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events_tx.subscribe()
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.inner.muted.load(Ordering::SeqCst)
    }

    /// Whether a reconnect attempt is waiting on the timer.
    #[must_use]
    pub fn is_reconnect_scheduled(&self) -> bool {
        self.inner.timer.is_pending()
    }

    /// Reconnect attempts made in the current outage.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.retry_attempts.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Start / stop
    // ------------------------------------------------------------------

    /// Start streaming.
    ///
    /// Missing sources are auto-initialized to the camera and microphone.
    /// A transient failure hands over to the reconnection protocol when
    /// auto-reconnect is enabled, and `Ok(StartOutcome::Reconnecting)` is
    /// returned.
    ///
    /// # Errors
    ///
    /// - `ScError::Busy` if a cleanup or another start/stop is in flight
    /// - `ScError::AlreadyStreaming` if the session is live
    /// - `ScError::Configuration` if no sources or endpoint are available
    /// - any non-retried failure of the engine
    #[instrument(skip_all, fields(session_id = %self.inner.session_id))]
    pub async fn start(&self) -> Result<StartOutcome, ScError> {
        if self.inner.flags.is_cleanup_in_progress() {
            debug!(target: "sc.session", "Start rejected, previous session is still closing");
            return Err(ScError::Busy);
        }
        let Ok(mut state) = self.inner.state.try_lock() else {
            debug!(target: "sc.session", "Start rejected, another operation holds the session");
            return Err(ScError::Busy);
        };
        if self.inner.flags.is_cleanup_in_progress() {
            return Err(ScError::Busy);
        }

        match self.phase() {
            Phase::Idle | Phase::Error => {}
            Phase::Streaming => return Err(ScError::AlreadyStreaming),
            Phase::Starting | Phase::Connecting { .. } => return Err(ScError::Busy),
        }

        info!(target: "sc.session", "Starting stream session");
        self.inner.flags.clear_stop();
        self.inner.retry_attempts.store(0, Ordering::SeqCst);
        state.fatal_reported = false;
        self.set_phase(Phase::Starting);

        match self.connect(&mut state, false).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => self.fail_connect(&mut state, err).await,
        }
    }

    /// Stop streaming.
    ///
    /// Cancels any scheduled reconnect before it can fire, releases the
    /// capture token and returns the session to `Idle`. After a live stream
    /// the engine close continues in the background; `start()` is rejected
    /// with `Busy` until it finishes.
    #[instrument(skip_all, fields(session_id = %self.inner.session_id))]
    pub async fn stop(&self) {
        self.inner.flags.request_stop();
        self.inner.timer.cancel();
        self.inner.tasks.switch.cancel();
        self.inner.tasks.audio_upgrade.cancel();

        let mut state = self.inner.state.lock().await;
        // A reconnect that held the lock may have scheduled a retry or a
        // screen-audio restore after the cancels above.
        self.inner.timer.cancel();
        self.inner.tasks.audio_upgrade.cancel();
        let phase = self.phase();
        info!(target: "sc.session", phase = %phase, "Stopping stream session");

        match phase {
            Phase::Streaming => self.begin_slow_close(&mut state),
            Phase::Starting | Phase::Connecting { .. } => self.close_fast(&mut state).await,
            Phase::Idle | Phase::Error => {}
        }

        self.inner.lease.release();
        self.inner.retry_attempts.store(0, Ordering::SeqCst);
        state.connect_started = None;
        let resume_relay = std::mem::take(&mut state.relay_reattach_owed);
        drop(state);

        self.enter_idle();
        if resume_relay {
            self.spawn_relay_reattach();
        }
    }

    /// Run the open/start sequence. Shared by `start()` and every retry.
    pub(crate) async fn connect(
        &self,
        state: &mut SessionState,
        is_retry: bool,
    ) -> Result<StartOutcome, ScError> {
        let stop = self.inner.flags.stop_token();
        let config = &self.inner.config;
        let engine = &self.inner.engine;

        self.ensure_sources(state, &stop).await?;
        self.checkpoint()?;

        if !is_retry {
            self.lock_output_rotation();
        }
        self.set_phase(Phase::Connecting { is_retry });

        let endpoint = self.inner.endpoints.current().await?;
        self.checkpoint()?;

        state.connect_started = Some(Instant::now());
        state.endpoint_open = true;
        self.bounded("open", config.open_timeout, &stop, engine.open(&endpoint))
            .await?;
        debug!(target: "sc.session", is_retry, "Endpoint opened");
        self.checkpoint()?;

        self.wait_for_encoders(&stop).await?;
        self.checkpoint()?;

        self.bounded(
            "start_stream",
            config.start_timeout,
            &stop,
            engine.start_stream(),
        )
        .await?;
        if endpoint.supports_bitrate_regulation() {
            self.attach_regulator(state);
        }
        self.checkpoint()?;

        if engine.is_streaming() {
            self.mark_streaming(state).await;
            Ok(StartOutcome::Streaming)
        } else {
            debug!(target: "sc.session", "Stream started, waiting for engine to report streaming");
            Ok(StartOutcome::AwaitingEngine)
        }
    }

    /// Decide between retry and surfacing for a failed first attempt.
    async fn fail_connect(
        &self,
        state: &mut SessionState,
        err: ScError,
    ) -> Result<StartOutcome, ScError> {
        if matches!(err, ScError::Cancelled) || self.inner.flags.is_user_stopped() {
            debug!(target: "sc.session", error = %err, "Start aborted by user stop");
            return Ok(StartOutcome::Cancelled);
        }

        if err.is_retryable() && self.inner.config.auto_reconnect {
            warn!(target: "sc.session", error = %err, "Connection attempt failed, reconnecting");
            metrics::record_error(err.class().as_str(), false);
            self.enter_reconnect(state, &err.to_string()).await;
            return Ok(StartOutcome::Reconnecting);
        }

        error!(
            target: "sc.session",
            error = %err,
            class = err.class().as_str(),
            "Start failed"
        );
        self.close_fast(state).await;
        self.set_phase(Phase::Error);
        self.surface(err.clone());
        self.enter_idle();
        Err(err)
    }

    /// Transition into `Streaming`. Caller holds the session lock.
    pub(crate) async fn mark_streaming(&self, state: &mut SessionState) {
        if self.inner.flags.is_user_stopped() {
            return;
        }
        let was_retry = self.phase().is_reconnecting();
        self.set_phase(Phase::Streaming);

        if let Some(started) = state.connect_started.take() {
            metrics::record_connect_duration(was_retry, started.elapsed());
        }
        self.inner
            .engine
            .set_muted(self.inner.muted.load(Ordering::SeqCst));

        if !was_retry {
            info!(target: "sc.session", "Streaming");
            return;
        }

        let attempts = self.inner.retry_attempts.swap(0, Ordering::SeqCst);
        metrics::record_reconnect_outcome("success");
        if let Some(dropped) = self.rotation().pending.discard_outage() {
            debug!(
                target: "sc.session",
                rotation = dropped.degrees(),
                "Dropping rotation queued during outage"
            );
        }
        if self.inner.lease.is_restore_owed() {
            self.spawn_audio_restore();
        }
        if std::mem::take(&mut state.relay_reattach_owed) {
            self.spawn_relay_reattach();
        }

        info!(target: "sc.session", attempts, "Reconnected");
        self.publish(SessionEvent::Message("Reconnected".to_string()));
    }

    /// Give screen audio back after a reconnect, at most once per downgrade.
    ///
    /// Runs in the `audio_upgrade` slot without the session lock: the
    /// re-acquire may wait on the user, so it is bounded by the upgrade
    /// window and dropped on stop.
    fn spawn_audio_restore(&self) {
        if !self.screen_audio_allowed() {
            self.inner.lease.take_restore_owed();
            debug!(target: "sc.session", "Video source changed during outage, keeping microphone");
            return;
        }
        let this = self.clone();
        let stop = self.inner.flags.stop_token();
        self.inner
            .tasks
            .audio_upgrade
            .spawn(move |token| async move {
                let window = this.inner.config.audio_upgrade_window;
                let token_result = tokio::select! {
                    () = token.cancelled() => return,
                    () = stop.cancelled() => return,
                    acquired = tokio::time::timeout(window, this.inner.lease.reacquire()) => acquired,
                };
                let Ok(acquired) = token_result else {
                    warn!(target: "sc.session", "No answer to capture prompt after reconnect, staying on microphone");
                    return;
                };
                let Some(capture) = acquired else {
                    warn!(target: "sc.session", "Capture token unavailable after reconnect, staying on microphone");
                    return;
                };
                this.restore_screen_audio(capture, &token).await;
            });
    }

    async fn restore_screen_audio(&self, capture: CaptureToken, token: &CancellationToken) {
        let _state = tokio::select! {
            () = token.cancelled() => return,
            state = self.lock_when_clean() => state,
        };
        if token.is_cancelled() || self.inner.flags.is_user_stopped() {
            return;
        }
        if !self.inner.lease.take_restore_owed() {
            return;
        }
        if !self.screen_audio_allowed() {
            debug!(target: "sc.session", "Video source changed while prompting, keeping microphone");
            return;
        }

        match self
            .inner
            .engine
            .set_audio_source(AudioSource::ScreenAudioCapture(capture))
            .await
        {
            Ok(()) => info!(target: "sc.session", "Screen audio restored after reconnect"),
            Err(e) => {
                warn!(target: "sc.session", error = %e, "Failed to restore screen audio");
            }
        }
    }

    /// Screen audio only accompanies the relay feed or the placeholder.
    fn screen_audio_allowed(&self) -> bool {
        matches!(
            self.inner.engine.video_source().map(|v| v.kind()),
            Some(VideoSourceKind::Relay | VideoSourceKind::Placeholder)
        )
    }

    /// Close an engine that never reached (or already left) streaming.
    pub(crate) async fn close_fast(&self, state: &mut SessionState) {
        let engine = &self.inner.engine;
        if std::mem::take(&mut state.regulator_attached) {
            engine.detach_bitrate_regulator();
        }
        if std::mem::take(&mut state.endpoint_open) {
            match tokio::time::timeout(self.inner.config.fast_close_timeout, engine.close()).await
            {
                Ok(Ok(())) => debug!(target: "sc.session", "Endpoint closed"),
                Ok(Err(e)) => warn!(target: "sc.session", error = %e, "Endpoint close failed"),
                Err(_) => warn!(target: "sc.session", "Endpoint close timed out"),
            }
        }
        self.inner.lease.invalidate_on_close();
    }

    /// Lock the session once no slow close is running.
    ///
    /// Everything that changes engine sources outside `start()`/`stop()`
    /// goes through here. The wait is bounded by `slow_close_timeout`.
    pub(crate) async fn lock_when_clean(&self) -> tokio::sync::MutexGuard<'_, SessionState> {
        let mut logged = false;
        loop {
            let state = self.inner.state.lock().await;
            if !self.inner.flags.is_cleanup_in_progress() {
                return state;
            }
            drop(state);
            if !std::mem::replace(&mut logged, true) {
                debug!(target: "sc.session", "Waiting for cleanup before touching the engine");
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Hand the close of a live stream to a background task.
    fn begin_slow_close(&self, state: &mut SessionState) {
        self.inner.flags.set_cleanup_in_progress(true);
        let regulator = std::mem::take(&mut state.regulator_attached);
        state.endpoint_open = false;

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let engine = &inner.engine;
            let close = async {
                if tokio::time::timeout(inner.config.stop_stream_timeout, engine.stop_stream())
                    .await
                    .is_err()
                {
                    warn!(target: "sc.session", "stop_stream timed out during cleanup");
                }
                if regulator {
                    engine.detach_bitrate_regulator();
                }
                if let Err(e) = engine.close().await {
                    warn!(target: "sc.session", error = %e, "Endpoint close failed during cleanup");
                }
            };
            if tokio::time::timeout(inner.config.slow_close_timeout, close)
                .await
                .is_err()
            {
                warn!(target: "sc.session", "Cleanup timed out");
            }
            inner.flags.set_cleanup_in_progress(false);
            debug!(target: "sc.session", "Cleanup finished");
        });
    }

    // ------------------------------------------------------------------
    // Connect helpers
    // ------------------------------------------------------------------

    fn checkpoint(&self) -> Result<(), ScError> {
        if self.inner.flags.is_user_stopped() {
            Err(ScError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run an engine call bounded by `limit` and abortable by `stop`.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        limit: Duration,
        stop: &CancellationToken,
        call: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, ScError> {
        tokio::select! {
            biased;
            () = stop.cancelled() => Err(ScError::Cancelled),
            result = tokio::time::timeout(limit, call) => match result {
                Ok(outcome) => outcome.map_err(ScError::from),
                Err(_) => Err(ScError::Timeout { operation, timeout: limit }),
            },
        }
    }

    /// Make sure the engine has both a video and an audio source.
    async fn ensure_sources(
        &self,
        state: &mut SessionState,
        stop: &CancellationToken,
    ) -> Result<(), ScError> {
        let engine = &self.inner.engine;
        let has_sources = || engine.video_source().is_some() && engine.audio_source().is_some();
        if has_sources() {
            return Ok(());
        }

        info!(target: "sc.session", "Sources missing, initializing camera and microphone");
        if engine.video_source().is_none() {
            engine
                .set_video_source(VideoSource::Capture {
                    device_id: state.last_capture_device.clone(),
                })
                .await
                .map_err(|e| ScError::Configuration(format!("video source: {e}")))?;
        }
        if engine.audio_source().is_none() {
            engine
                .set_audio_source(AudioSource::Microphone)
                .await
                .map_err(|e| ScError::Configuration(format!("audio source: {e}")))?;
        }

        let limit = self.inner.config.source_init_timeout;
        let wait = async {
            while !has_sources() {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        tokio::select! {
            biased;
            () = stop.cancelled() => Err(ScError::Cancelled),
            result = tokio::time::timeout(limit, wait) => result.map_err(|_| {
                ScError::Configuration("no video or audio source became available".to_string())
            }),
        }
    }

    async fn wait_for_encoders(&self, stop: &CancellationToken) -> Result<(), ScError> {
        let engine = &self.inner.engine;
        let limit = self.inner.config.encoder_ready_timeout;
        let wait = async {
            while !engine.encoders_ready() {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        tokio::select! {
            biased;
            () = stop.cancelled() => Err(ScError::Cancelled),
            result = tokio::time::timeout(limit, wait) => result.map_err(|_| ScError::Timeout {
                operation: "encoders",
                timeout: limit,
            }),
        }
    }

    pub(crate) fn attach_regulator(&self, state: &mut SessionState) {
        match self.inner.engine.attach_bitrate_regulator() {
            Ok(()) => {
                state.regulator_attached = true;
                debug!(target: "sc.session", "Bitrate regulator attached");
            }
            Err(e) => warn!(target: "sc.session", error = %e, "Bitrate regulator unavailable"),
        }
    }

    // ------------------------------------------------------------------
    // Rotation and mute
    // ------------------------------------------------------------------

    pub(crate) fn rotation(&self) -> MutexGuard<'_, RotationState> {
        self.inner
            .rotation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Report a device rotation.
    ///
    /// Applied immediately while idle. While a session is live the encoder
    /// orientation stays locked and the rotation is applied when the session
    /// returns to idle. Rotations reported during a reconnect are dropped if
    /// the reconnect succeeds.
    pub fn set_device_rotation(&self, rotation: Rotation) {
        let mut rot = self.rotation();
        rot.device = rotation;
        let phase = self.phase();
        match phase {
            Phase::Idle | Phase::Error => {
                rot.pending.clear();
                drop(rot);
                self.inner.engine.set_output_rotation(rotation);
                debug!(target: "sc.session", rotation = rotation.degrees(), "Rotation applied");
            }
            Phase::Connecting { is_retry: true } => {
                rot.pending.queue(rotation, true);
                debug!(target: "sc.session", rotation = rotation.degrees(), "Rotation during reconnect deferred");
            }
            Phase::Starting | Phase::Connecting { is_retry: false } | Phase::Streaming => {
                rot.pending.queue(rotation, false);
                debug!(target: "sc.session", rotation = rotation.degrees(), "Rotation deferred until idle");
            }
        }
    }

    /// Lock the encoder orientation to the current device rotation.
    fn lock_output_rotation(&self) {
        let mut rot = self.rotation();
        rot.pending.clear();
        let device = rot.device;
        drop(rot);

        self.inner.engine.set_output_rotation(device);
        debug!(target: "sc.session", rotation = device.degrees(), "Output rotation locked");
    }

    /// Mute or unmute the outbound audio. Re-applied after every reconnect.
    pub fn set_muted(&self, muted: bool) {
        self.inner.muted.store(muted, Ordering::SeqCst);
        self.inner.engine.set_muted(muted);
        info!(target: "sc.session", muted, "Mute changed");
        self.publish(SessionEvent::Muted(muted));
    }

    // ------------------------------------------------------------------
    // Phase and event plumbing
    // ------------------------------------------------------------------

    pub(crate) fn set_phase(&self, phase: Phase) {
        let previous = self.inner.phase_tx.send_replace(phase);
        if previous == phase {
            return;
        }
        info!(target: "sc.session", from = %previous, to = %phase, "Phase transition");
        metrics::record_phase_transition(phase.as_str());
        metrics::set_streaming(phase == Phase::Streaming);
        if previous.status() != phase.status() {
            self.publish(SessionEvent::Status(phase.status()));
        }
    }

    /// Return to `Idle` and apply the rotation deferred while live.
    pub(crate) fn enter_idle(&self) {
        self.set_phase(Phase::Idle);
        let deferred = self.rotation().pending.take();
        if let Some(rotation) = deferred {
            self.inner.engine.set_output_rotation(rotation);
            info!(target: "sc.session", rotation = rotation.degrees(), "Applied deferred rotation");
        }
    }

    pub(crate) fn publish(&self, event: SessionEvent) {
        if let Some(sink) = &self.inner.sink {
            sink.deliver(&event);
        }
        // No subscribers is fine.
        let _ = self.inner.events_tx.send(event);
    }

    /// Show an error to the host unless a reconnect is suppressing errors.
    pub(crate) fn surface(&self, err: ScError) {
        if ReconnectPolicy::suppresses_errors(self.phase()) {
            debug!(target: "sc.session", error = %err, "Error suppressed while reconnecting");
            metrics::record_error(err.class().as_str(), false);
            return;
        }
        metrics::record_error(err.class().as_str(), true);
        self.publish(SessionEvent::Error(err));
    }
}
