//! Stream Controller Library
//!
//! This library owns the lifecycle of a single live outbound media stream:
//!
//! - Connecting to a remote ingest endpoint (RTMP or SRT) and keeping it alive
//! - Detecting connection loss and reconnecting with a fixed delay
//! - Switching the upstream video source (camera, relay feed, external
//!   capture device, placeholder) without corrupting in-flight state
//! - Tracking the single-connection capture token used for screen audio
//! - Monitoring the relay ingest feed and falling back when it stalls
//!
//! Encoding, framing, transport, playback and UI live behind the
//! [`collaborators`] traits.
//!
//! # Architecture
//!
//! ```text
//! SessionController (one per outbound stream)
//! ├── session mutex ── start / stop / retries / source swaps
//! ├── ReconnectTimer ── single cancelable retry handle
//! ├── SourceTasks ── one supervised slot per background task kind
//! │   ├── switch          (relay attach, device handshake)
//! │   ├── audio_upgrade   (screen audio upgrade window)
//! │   ├── relay_retry     (relay reattach loop)
//! │   └── health_monitor  (ingest health monitor)
//! └── background scheduler ── engine event pump, orientation watcher
//! ```
//!
//! # Key Design Decisions
//!
//! - **`start()` never queues**: it fails fast with `Busy` while another
//!   operation holds the session or a slow close is still running
//! - **Stop wins**: the user-stopped flag is checked at every suspension point
//!   of the start and reconnect paths, and cancellation is not an error
//! - **Errors are quiet while reconnecting**: only a fatal engine error or
//!   giving up surfaces to the host
//! - **Tokens die with the connection**: every close invalidates the capture
//!   token, and screen audio is restored at most once after a reconnect
//!
//! # Modules
//!
//! - [`collaborators`] - Media Engine, Relay Player, token broker and host seams
//! - [`config`] - Controller configuration from environment
//! - [`errors`] - Error types with their retry classification
//! - [`health`] - Relay ingest health monitor
//! - [`observability`] - Prometheus metrics
//! - [`permissions`] - Capture token lease
//! - [`session`] - The session state machine
//! - [`sources`] - Source switch protocol

pub mod collaborators;
pub mod config;
pub mod errors;
pub mod health;
pub mod observability;
pub mod permissions;
pub mod session;
pub mod sources;

pub use config::Config;
pub use errors::{ErrorClass, ScError};
pub use session::{Phase, SessionController, SessionEvent, SessionStatus, StartOutcome};
pub use sources::SwitchOutcome;
