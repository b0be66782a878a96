//! Capture token broker and permission prompt seams.

use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;

/// Credential required to capture system audio.
///
/// Valid for exactly one engine connection. The value is never logged.
#[derive(Debug, Clone)]
pub struct CaptureToken(SecretString);

impl CaptureToken {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Raw token value, for handing to the engine.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// Host-provided UI for permission handshakes.
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    /// Ask the user to allow screen audio capture.
    async fn request_capture_consent(&self) -> bool;

    /// Ask the user to allow access to an external capture device.
    async fn confirm_device_access(&self) -> bool;
}

/// Cloneable handle to a [`PermissionPrompt`].
#[derive(Clone)]
pub struct PromptHandle(Arc<dyn PermissionPrompt>);

impl PromptHandle {
    #[must_use]
    pub fn new(prompt: Arc<dyn PermissionPrompt>) -> Self {
        Self(prompt)
    }

    pub async fn request_capture_consent(&self) -> bool {
        self.0.request_capture_consent().await
    }

    pub async fn confirm_device_access(&self) -> bool {
        self.0.confirm_device_access().await
    }
}

impl fmt::Debug for PromptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptHandle").finish_non_exhaustive()
    }
}

/// Platform broker that hands out capture tokens.
#[async_trait]
pub trait TokenBroker: Send + Sync {
    /// Run the consent flow through `prompt` and return a token if granted.
    async fn acquire(&self, prompt: &PromptHandle) -> Option<CaptureToken>;

    /// The token currently held by the broker, if any.
    fn current(&self) -> Option<CaptureToken>;

    /// Drop the held token.
    fn release(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_token_debug_is_redacted() {
        let token = CaptureToken::new("projection-grant-991");
        let debug = format!("{token:?}");
        assert!(!debug.contains("projection-grant-991"));
        assert_eq!(token.expose(), "projection-grant-991");
    }
}
