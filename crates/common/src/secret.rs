//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Use these types
//! for every value that grants access to a stream or a capture surface:
//! ingest URLs with embedded stream keys, relay feed URLs, and capture
//! permission tokens.
//!
//! # Compile-Time Safety
//!
//! `SecretBox<T>` and `SecretString` implement `Debug` with redaction, so a
//! struct that derives `Debug` while holding a secret still logs safely via
//! `{:?}` or `tracing` fields.
//!
//! # Memory Safety
//!
//! Secrets are zeroized when dropped.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct IngestTarget {
//!     name: String,
//!     url: SecretString,  // Debug shows "[REDACTED]"
//! }
//!
//! let target = IngestTarget {
//!     name: "primary".to_string(),
//!     url: SecretString::from("srt://ingest.example.com:9000?streamid=live/abc123"),
//! };
//!
//! println!("{:?}", target);
//!
//! // Reading the value is always an explicit call.
//! let url: &str = target.url.expose_secret();
//! ```
//!
//! # Usage Guidelines
//!
//! Use `SecretString` for:
//! - Ingest endpoint URLs (they carry stream keys)
//! - Relay feed URLs
//! - Capture permission tokens
//!
//! Use `SecretBox<T>` for binary credentials handed out by platform brokers.

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("live_8843_key");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("live_8843_key"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("rtmp://ingest/app/key");
        assert_eq!(secret.expose_secret(), "rtmp://ingest/app/key");
    }

    #[test]
    fn test_struct_with_secret_is_safe() {
        #[allow(dead_code)]
        #[derive(Debug)]
        struct Endpoint {
            label: String,
            url: SecretString,
        }

        let endpoint = Endpoint {
            label: "backup".to_string(),
            url: SecretString::from("srt://host:9000?streamid=secret-key"),
        };

        let debug_str = format!("{endpoint:?}");

        assert!(debug_str.contains("backup"));
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("secret-key"));
    }

    #[test]
    fn test_deserialize() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct RelaySettings {
            name: String,
            url: SecretString,
        }

        let json = r#"{"name": "drone", "url": "rtmp://relay.local/live/feed-key"}"#;
        let settings: RelaySettings = serde_json::from_str(json).expect("deserialize");

        assert_eq!(
            settings.url.expose_secret(),
            "rtmp://relay.local/live/feed-key"
        );

        let debug = format!("{settings:?}");
        assert!(!debug.contains("feed-key"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_clone_works() {
        let secret = SecretString::from("cloneable");
        let cloned = secret.clone();
        assert_eq!(cloned.expose_secret(), "cloneable");
    }
}
