//! Media Engine seam.
//!
//! The engine owns encoding, framing and transport. The controller only
//! drives its lifecycle and chooses its sources.

use super::endpoint::Endpoint;
use super::permission::CaptureToken;
use super::relay::PlaybackHandle;
use crate::errors::EngineError;

use async_trait::async_trait;
use common::types::DeviceId;
use tokio::sync::broadcast;

/// The four upstream video source kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoSourceKind {
    Capture,
    Relay,
    ExternalDevice,
    Placeholder,
}

impl VideoSourceKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            VideoSourceKind::Capture => "capture",
            VideoSourceKind::Relay => "relay",
            VideoSourceKind::ExternalDevice => "external_device",
            VideoSourceKind::Placeholder => "placeholder",
        }
    }
}

/// A concrete video source handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    /// Local camera. `None` lets the engine choose its default device.
    Capture { device_id: Option<DeviceId> },
    /// A prepared relay playback session.
    Relay(PlaybackHandle),
    /// USB / HDMI capture hardware.
    ExternalDevice,
    /// Static placeholder frame.
    Placeholder,
}

impl VideoSource {
    #[must_use]
    pub fn kind(&self) -> VideoSourceKind {
        match self {
            VideoSource::Capture { .. } => VideoSourceKind::Capture,
            VideoSource::Relay(_) => VideoSourceKind::Relay,
            VideoSource::ExternalDevice => VideoSourceKind::ExternalDevice,
            VideoSource::Placeholder => VideoSourceKind::Placeholder,
        }
    }
}

/// The two audio source kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioSourceKind {
    Microphone,
    ScreenAudioCapture,
}

/// A concrete audio source handed to the engine.
///
/// Screen audio capture is only possible with a capture token that is valid
/// for the current engine connection.
#[derive(Debug, Clone)]
pub enum AudioSource {
    Microphone,
    ScreenAudioCapture(CaptureToken),
}

impl AudioSource {
    #[must_use]
    pub fn kind(&self) -> AudioSourceKind {
        match self {
            AudioSource::Microphone => AudioSourceKind::Microphone,
            AudioSource::ScreenAudioCapture(_) => AudioSourceKind::ScreenAudioCapture,
        }
    }
}

/// Output orientation applied to the encoded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    #[must_use]
    pub const fn degrees(&self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

/// Signals emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The engine started (`true`) or stopped (`false`) pushing media.
    StreamingChanged(bool),
    /// The transport to the ingest endpoint was lost.
    ConnectionLost(String),
    /// Unrecoverable failure unrelated to connectivity.
    Fatal(String),
    /// Current outbound bitrate in bits per second.
    Bitrate(u64),
}

/// Media Engine operations consumed by the controller.
///
/// Implementations are expected to be internally synchronized; the
/// controller still guarantees that `open`, `start_stream`, `stop_stream`
/// and `close` are never called concurrently.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Open a connection to the ingest endpoint.
    async fn open(&self, endpoint: &Endpoint) -> Result<(), EngineError>;

    /// Start pushing media over the open connection.
    async fn start_stream(&self) -> Result<(), EngineError>;

    /// Stop pushing media. Never fails; a no-op if not streaming.
    async fn stop_stream(&self);

    /// Close the connection. Invalidates any capture token in use.
    async fn close(&self) -> Result<(), EngineError>;

    async fn set_video_source(&self, source: VideoSource) -> Result<(), EngineError>;

    async fn set_audio_source(&self, source: AudioSource) -> Result<(), EngineError>;

    fn video_source(&self) -> Option<VideoSource>;

    fn audio_source(&self) -> Option<AudioSourceKind>;

    fn is_streaming(&self) -> bool;

    /// Whether audio and video encoders are initialized for the current sources.
    fn encoders_ready(&self) -> bool;

    fn set_output_rotation(&self, rotation: Rotation);

    fn set_muted(&self, muted: bool);

    /// Bind an adaptive bitrate regulator to the current encoder (SRT only).
    ///
    /// # Errors
    ///
    /// Returns an error if no encoder is available to bind to.
    fn attach_bitrate_regulator(&self) -> Result<(), EngineError>;

    fn detach_bitrate_regulator(&self);

    /// Subscribe to engine signals.
    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_source_kind() {
        assert_eq!(
            VideoSource::Capture { device_id: None }.kind(),
            VideoSourceKind::Capture
        );
        assert_eq!(
            VideoSource::Relay(PlaybackHandle::new(7)).kind(),
            VideoSourceKind::Relay
        );
        assert_eq!(VideoSource::Placeholder.kind().as_str(), "placeholder");
        assert_eq!(
            VideoSourceKind::ExternalDevice.as_str(),
            "external_device"
        );
    }

    #[test]
    fn test_audio_source_kind() {
        assert_eq!(AudioSource::Microphone.kind(), AudioSourceKind::Microphone);
        assert_eq!(
            AudioSource::ScreenAudioCapture(CaptureToken::new("t")).kind(),
            AudioSourceKind::ScreenAudioCapture
        );
    }

    #[test]
    fn test_rotation_degrees() {
        assert_eq!(Rotation::default(), Rotation::Deg0);
        assert_eq!(Rotation::Deg270.degrees(), 270);
    }
}
