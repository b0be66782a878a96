//! Ingest health monitoring for the relay feed source.
//!
//! - [`classifier`] - pure playback-state classification
//! - [`monitor`] - the supervised monitor task and the relay fallback

pub mod classifier;
pub mod monitor;

pub use classifier::{DisconnectReason, IngestClassifier, Verdict};
