//! Test fixtures: endpoint source, recording sink, config and harness.

use async_trait::async_trait;
use common::secret::SecretString;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stream_controller::collaborators::{
    Collaborators, Endpoint, EndpointSource, IngestProtocol, Rotation, StatusSink,
};
use stream_controller::config::Config;
use stream_controller::errors::ScError;
use stream_controller::session::{SessionController, SessionEvent, SessionStatus};
use tokio::sync::watch;

use crate::mock_engine::MockEngine;
use crate::mock_permissions::MockTokenBroker;
use crate::mock_relay::MockRelayPlayer;

/// Relay URL used by [`test_config`].
pub const TEST_RELAY_URL: &str = "srt://relay.test:9000?streamid=feed";

/// Endpoint source returning a fixed endpoint, or a configuration error when
/// none is set.
#[derive(Debug)]
pub struct StaticEndpointSource {
    endpoint: Mutex<Option<Endpoint>>,
}

impl StaticEndpointSource {
    #[must_use]
    pub fn rtmp() -> Arc<Self> {
        Self::with(Some(Endpoint::new(
            "rtmp://ingest.test/live/sk_test",
            IngestProtocol::Rtmp,
        )))
    }

    #[must_use]
    pub fn srt() -> Arc<Self> {
        Self::with(Some(Endpoint::new(
            "srt://ingest.test:9000?streamid=live/sk_test",
            IngestProtocol::Srt,
        )))
    }

    #[must_use]
    pub fn with(endpoint: Option<Endpoint>) -> Arc<Self> {
        Arc::new(Self {
            endpoint: Mutex::new(endpoint),
        })
    }

    pub fn set(&self, endpoint: Option<Endpoint>) {
        *self.endpoint.lock().unwrap() = endpoint;
    }
}

#[async_trait]
impl EndpointSource for StaticEndpointSource {
    async fn current(&self) -> Result<Endpoint, ScError> {
        self.endpoint
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ScError::Configuration("no ingest endpoint configured".to_string()))
    }
}

/// Status sink that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingSink {
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    #[must_use]
    pub fn errors(&self) -> Vec<ScError> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Error(err) => Some(err),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Message(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn statuses(&self) -> Vec<SessionStatus> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl StatusSink for RecordingSink {
    fn deliver(&self, event: &SessionEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Default config with a relay URL and the production timings.
#[must_use]
pub fn test_config() -> Config {
    Config {
        relay_url: Some(SecretString::from(TEST_RELAY_URL)),
        ..Config::default()
    }
}

/// A controller wired to mocks.
pub struct TestHarness {
    pub controller: SessionController,
    pub engine: Arc<MockEngine>,
    pub relay: Arc<MockRelayPlayer>,
    pub broker: Arc<MockTokenBroker>,
    pub endpoints: Arc<StaticEndpointSource>,
    pub sink: Arc<RecordingSink>,
    pub orientation: watch::Sender<Rotation>,
}

impl TestHarness {
    #[must_use]
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::default()
    }

    /// Let spawned tasks and timers run for `duration` of (paused) time.
    pub async fn advance(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Builder for [`TestHarness`].
#[derive(Default)]
pub struct TestHarnessBuilder {
    config: Option<Config>,
    engine: Option<Arc<MockEngine>>,
    endpoints: Option<Arc<StaticEndpointSource>>,
    without_background: bool,
}

impl TestHarnessBuilder {
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn engine(mut self, engine: Arc<MockEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    #[must_use]
    pub fn endpoints(mut self, endpoints: Arc<StaticEndpointSource>) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    /// Do not start the background scheduler.
    #[must_use]
    pub fn without_background(mut self) -> Self {
        self.without_background = true;
        self
    }

    /// Build the harness. Must be called inside a tokio runtime.
    #[must_use]
    pub fn build(self) -> TestHarness {
        let engine = self.engine.unwrap_or_else(MockEngine::shared);
        let relay = MockRelayPlayer::shared();
        let broker = MockTokenBroker::shared();
        let endpoints = self.endpoints.unwrap_or_else(StaticEndpointSource::rtmp);
        let sink = RecordingSink::shared();
        let (orientation, orientation_rx) = watch::channel(Rotation::Deg0);

        let controller = SessionController::new(
            Collaborators {
                engine: engine.clone(),
                relay: relay.clone(),
                broker: broker.clone(),
                endpoints: endpoints.clone(),
                sink: Some(sink.clone()),
                orientation: Some(orientation_rx),
            },
            self.config.unwrap_or_else(test_config),
        );
        if !self.without_background {
            controller.start_background();
        }

        TestHarness {
            controller,
            engine,
            relay,
            broker,
            endpoints,
            sink,
            orientation,
        }
    }
}
