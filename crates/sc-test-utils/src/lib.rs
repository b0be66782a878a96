//! # SC Test Utilities
//!
//! Shared test utilities for the stream session controller.
//!
//! This crate provides mock collaborators and fixtures for exercising the
//! controller without a real media engine, relay player or permission UI.
//!
//! ## Modules
//!
//! - `mock_engine` - Scriptable Media Engine with a call log and an
//!   overlap detector for lifecycle calls
//! - `mock_relay` - Relay Player whose playback states are driven by the test
//! - `mock_permissions` - Token broker and permission prompt
//! - `fixtures` - Endpoint source, recording sink, test config and harness
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sc_test_utils::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let harness = TestHarness::builder().build();
//!     harness.controller.start_background();
//!
//!     harness.controller.start().await.unwrap();
//!     assert_eq!(harness.controller.phase(), Phase::Streaming);
//!
//!     // Drop the connection and let the reconnect timer fire
//!     harness.engine.drop_connection("network down");
//!     tokio::time::sleep(Duration::from_secs(6)).await;
//! }
//! ```

pub mod fixtures;
pub mod mock_engine;
pub mod mock_permissions;
pub mod mock_relay;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_engine::*;
pub use mock_permissions::*;
pub use mock_relay::*;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a test-friendly tracing subscriber. Safe to call from every test.
///
/// Honors `RUST_LOG`; defaults to debug output for the controller targets.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sc=debug,stream_controller=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
