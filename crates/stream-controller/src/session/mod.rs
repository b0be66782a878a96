//! Stream session state machine.
//!
//! # Components
//!
//! - [`controller`] - `SessionController`, start/stop and the connect sequence
//! - [`reconnect`] - reconnection protocol (teardown, fixed-delay retries)
//! - [`background`] - engine event pump and orientation watcher
//! - [`phase`] - session phases and the host-facing status
//! - [`flags`] - lock-free stop and cleanup flags
//! - [`timer`] - the single cancelable reconnect timer
//! - [`policy`] - reconnect delay, attempt limit and error suppression
//! - [`rotation`] - deferred output rotation
//! - [`events`] - notifications published to the host
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start()──► Starting ──► Connecting ──► Streaming
//!  ▲                                 │              │
//!  │                      transient failure   connection lost
//!  │                                 ▼              │
//!  └──stop() / give up ◄── Connecting(retry) ◄──────┘
//! ```

pub mod background;
pub mod controller;
pub mod events;
pub mod flags;
pub mod phase;
pub mod policy;
pub mod reconnect;
pub mod rotation;
pub mod timer;

pub use controller::{SessionController, StartOutcome};
pub use events::{format_bitrate, SessionEvent};
pub use flags::FlagSnapshot;
pub use phase::{Phase, SessionStatus};
pub use policy::ReconnectPolicy;
pub use timer::ReconnectTimer;
