//! Scriptable Media Engine.
//!
//! Lifecycle calls (`open`, `start_stream`, `stop_stream`, `close`) are
//! tracked for overlap so tests can assert the controller never runs two of
//! them at once. Failures and delays are scripted per call.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = MockEngine::new();
//! engine.fail_next_opens(2, EngineError::Timeout);
//! engine.set_start_delay(Duration::from_millis(500));
//!
//! // ... drive the controller ...
//!
//! assert_eq!(engine.count(EngineCall::Open), 3);
//! assert_eq!(engine.max_concurrent_lifecycle_calls(), 1);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stream_controller::collaborators::{
    AudioSource, AudioSourceKind, Endpoint, EngineEvent, MediaEngine, Rotation, VideoSource,
    VideoSourceKind,
};
use stream_controller::errors::EngineError;
use tokio::sync::broadcast;

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Open,
    StartStream,
    StopStream,
    Close,
    SetVideo(VideoSourceKind),
    SetAudio(AudioSourceKind),
    Rotation(Rotation),
    Muted(bool),
    AttachRegulator,
    DetachRegulator,
}

#[derive(Debug)]
struct EngineInner {
    video: Option<VideoSource>,
    audio: Option<AudioSourceKind>,
    open_failures: VecDeque<EngineError>,
    start_failures: VecDeque<EngineError>,
    start_always_fails: Option<EngineError>,
    open_delay: Duration,
    start_delay: Duration,
    stop_delay: Duration,
    close_delay: Duration,
    encoders_ready: bool,
    /// `start_stream` reports streaming right away.
    streams_on_start: bool,
    /// `set_*_source` calls are recorded but never take effect.
    sources_never_appear: bool,
    calls: Vec<EngineCall>,
}

impl Default for EngineInner {
    fn default() -> Self {
        Self {
            video: None,
            audio: None,
            open_failures: VecDeque::new(),
            start_failures: VecDeque::new(),
            start_always_fails: None,
            open_delay: Duration::ZERO,
            start_delay: Duration::ZERO,
            stop_delay: Duration::ZERO,
            close_delay: Duration::ZERO,
            encoders_ready: true,
            streams_on_start: true,
            sources_never_appear: false,
            calls: Vec::new(),
        }
    }
}

/// Mock Media Engine.
#[derive(Debug)]
pub struct MockEngine {
    inner: Mutex<EngineInner>,
    events: broadcast::Sender<EngineEvent>,
    streaming: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Counts a lifecycle call as in flight until dropped.
struct InFlight<'a>(&'a MockEngine);

impl<'a> InFlight<'a> {
    fn enter(engine: &'a MockEngine) -> Self {
        let now = engine.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        engine.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(engine)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Mutex::new(EngineInner::default()),
            events,
            streaming: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // ------------------------------------------------------------------
    // Scripting
    // ------------------------------------------------------------------

    /// Fail the next `n` calls to `open` with `err`.
    pub fn fail_next_opens(&self, n: usize, err: EngineError) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .open_failures
            .extend(std::iter::repeat(err).take(n));
    }

    /// Fail the next `n` calls to `start_stream` with `err`.
    pub fn fail_next_starts(&self, n: usize, err: EngineError) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .start_failures
            .extend(std::iter::repeat(err).take(n));
    }

    /// Fail every `start_stream` with `err` until cleared with `None`.
    pub fn set_start_always_fails(&self, err: Option<EngineError>) {
        self.inner.lock().unwrap().start_always_fails = err;
    }

    pub fn set_open_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().open_delay = delay;
    }

    pub fn set_start_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().start_delay = delay;
    }

    pub fn set_stop_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().stop_delay = delay;
    }

    pub fn set_close_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().close_delay = delay;
    }

    pub fn set_encoders_ready(&self, ready: bool) {
        self.inner.lock().unwrap().encoders_ready = ready;
    }

    /// When `false`, `start_stream` succeeds without reporting streaming;
    /// use [`report_streaming`](Self::report_streaming) to flip it later.
    pub fn set_streams_on_start(&self, streams: bool) {
        self.inner.lock().unwrap().streams_on_start = streams;
    }

    pub fn set_sources_never_appear(&self, never: bool) {
        self.inner.lock().unwrap().sources_never_appear = never;
    }

    /// Pre-select sources as if the host had configured them.
    pub fn preset_sources(&self, video: VideoSource, audio: AudioSourceKind) {
        let mut inner = self.inner.lock().unwrap();
        inner.video = Some(video);
        inner.audio = Some(audio);
    }

    // ------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    /// Report that streaming started, as a delayed engine callback would.
    pub fn report_streaming(&self) {
        self.streaming.store(true, Ordering::SeqCst);
        self.emit(EngineEvent::StreamingChanged(true));
    }

    /// Simulate a transport loss while live.
    pub fn drop_connection(&self, reason: &str) {
        self.streaming.store(false, Ordering::SeqCst);
        self.emit(EngineEvent::ConnectionLost(reason.to_string()));
    }

    /// Simulate the engine silently stopping (only the streaming flag flips).
    pub fn stop_reporting_streaming(&self) {
        self.streaming.store(false, Ordering::SeqCst);
        self.emit(EngineEvent::StreamingChanged(false));
    }

    // ------------------------------------------------------------------
    // Assertions
    // ------------------------------------------------------------------

    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    #[must_use]
    pub fn count(&self, call: EngineCall) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == call)
            .count()
    }

    /// Number of `SetAudio(ScreenAudioCapture)` calls.
    #[must_use]
    pub fn screen_audio_sets(&self) -> usize {
        self.count(EngineCall::SetAudio(AudioSourceKind::ScreenAudioCapture))
    }

    #[must_use]
    pub fn rotations(&self) -> Vec<Rotation> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Rotation(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    /// Highest number of lifecycle calls observed running at the same time.
    #[must_use]
    pub fn max_concurrent_lifecycle_calls(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    fn record(&self, call: EngineCall) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    async fn open(&self, _endpoint: &Endpoint) -> Result<(), EngineError> {
        let _guard = InFlight::enter(self);
        let (delay, failure) = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(EngineCall::Open);
            (inner.open_delay, inner.open_failures.pop_front())
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        failure.map_or(Ok(()), Err)
    }

    async fn start_stream(&self) -> Result<(), EngineError> {
        let _guard = InFlight::enter(self);
        let (delay, failure, streams) = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(EngineCall::StartStream);
            let failure = inner
                .start_failures
                .pop_front()
                .or_else(|| inner.start_always_fails.clone());
            (inner.start_delay, failure, inner.streams_on_start)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = failure {
            return Err(err);
        }
        if streams {
            self.report_streaming();
        }
        Ok(())
    }

    async fn stop_stream(&self) {
        let _guard = InFlight::enter(self);
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(EngineCall::StopStream);
            inner.stop_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.streaming.swap(false, Ordering::SeqCst) {
            self.emit(EngineEvent::StreamingChanged(false));
        }
    }

    async fn close(&self) -> Result<(), EngineError> {
        let _guard = InFlight::enter(self);
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(EngineCall::Close);
            inner.close_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.streaming.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn set_video_source(&self, source: VideoSource) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(EngineCall::SetVideo(source.kind()));
        if !inner.sources_never_appear {
            inner.video = Some(source);
        }
        Ok(())
    }

    async fn set_audio_source(&self, source: AudioSource) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(EngineCall::SetAudio(source.kind()));
        if !inner.sources_never_appear {
            inner.audio = Some(source.kind());
        }
        Ok(())
    }

    fn video_source(&self) -> Option<VideoSource> {
        self.inner.lock().unwrap().video.clone()
    }

    fn audio_source(&self) -> Option<AudioSourceKind> {
        self.inner.lock().unwrap().audio
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    fn encoders_ready(&self) -> bool {
        self.inner.lock().unwrap().encoders_ready
    }

    fn set_output_rotation(&self, rotation: Rotation) {
        self.record(EngineCall::Rotation(rotation));
    }

    fn set_muted(&self, muted: bool) {
        self.record(EngineCall::Muted(muted));
    }

    fn attach_bitrate_regulator(&self) -> Result<(), EngineError> {
        self.record(EngineCall::AttachRegulator);
        Ok(())
    }

    fn detach_bitrate_regulator(&self) {
        self.record(EngineCall::DetachRegulator);
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}
