//! Interfaces of the external collaborators the controller drives.
//!
//! The controller owns no encoding, transport, playback or UI code. Everything
//! it touches outside its own state goes through one of these traits, and the
//! host wires in concrete implementations through [`Collaborators`].

pub mod endpoint;
pub mod engine;
pub mod permission;
pub mod relay;

pub use endpoint::{Endpoint, EndpointSource, IngestProtocol};
pub use engine::{
    AudioSource, AudioSourceKind, EngineEvent, MediaEngine, Rotation, VideoSource,
    VideoSourceKind,
};
pub use permission::{CaptureToken, PermissionPrompt, PromptHandle, TokenBroker};
pub use relay::{PlaybackHandle, PlaybackState, RelayPlayer};

use crate::session::SessionEvent;

use std::sync::Arc;
use tokio::sync::watch;

/// Write-only notification surface of the host (status line, toasts).
pub trait StatusSink: Send + Sync {
    fn deliver(&self, event: &SessionEvent);
}

/// Everything a [`SessionController`](crate::session::SessionController) needs
/// from its host.
#[derive(Clone)]
pub struct Collaborators {
    pub engine: Arc<dyn MediaEngine>,
    pub relay: Arc<dyn RelayPlayer>,
    pub broker: Arc<dyn TokenBroker>,
    pub endpoints: Arc<dyn EndpointSource>,
    pub sink: Option<Arc<dyn StatusSink>>,
    /// Device orientation updates, consumed by the background scheduler.
    pub orientation: Option<watch::Receiver<Rotation>>,
}
