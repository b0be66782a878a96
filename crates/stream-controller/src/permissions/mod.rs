//! Capture permission handling.

pub mod lease;

pub use lease::CaptureTokenLease;
