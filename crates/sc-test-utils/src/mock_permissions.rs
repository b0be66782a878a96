//! Token broker and permission prompt mocks.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use stream_controller::collaborators::{CaptureToken, PermissionPrompt, PromptHandle, TokenBroker};

/// Permission prompt with fixed answers.
#[derive(Debug)]
pub struct MockPrompt {
    grant_capture: AtomicBool,
    grant_device: AtomicBool,
    capture_requests: AtomicUsize,
    device_requests: AtomicUsize,
    /// Capture requests past this count never get an answer.
    answered_capture_limit: AtomicUsize,
}

impl MockPrompt {
    #[must_use]
    pub fn new(grant_capture: bool, grant_device: bool) -> Self {
        Self {
            grant_capture: AtomicBool::new(grant_capture),
            grant_device: AtomicBool::new(grant_device),
            capture_requests: AtomicUsize::new(0),
            device_requests: AtomicUsize::new(0),
            answered_capture_limit: AtomicUsize::new(usize::MAX),
        }
    }

    /// A prompt that approves everything.
    #[must_use]
    pub fn granting() -> Arc<Self> {
        Arc::new(Self::new(true, true))
    }

    /// A prompt that refuses everything.
    #[must_use]
    pub fn denying() -> Arc<Self> {
        Arc::new(Self::new(false, false))
    }

    /// Wrap a shared prompt for the controller API.
    #[must_use]
    pub fn handle(self: &Arc<Self>) -> PromptHandle {
        PromptHandle::new(Arc::clone(self) as Arc<dyn PermissionPrompt>)
    }

    pub fn set_grant_capture(&self, grant: bool) {
        self.grant_capture.store(grant, Ordering::SeqCst);
    }

    /// Leave every capture request after the first `n` unanswered, like a
    /// dialog the user never dismisses.
    pub fn stop_answering_after(&self, n: usize) {
        self.answered_capture_limit.store(n, Ordering::SeqCst);
    }

    #[must_use]
    pub fn capture_requests(&self) -> usize {
        self.capture_requests.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn device_requests(&self) -> usize {
        self.device_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionPrompt for MockPrompt {
    async fn request_capture_consent(&self) -> bool {
        let request = self.capture_requests.fetch_add(1, Ordering::SeqCst) + 1;
        if request > self.answered_capture_limit.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.grant_capture.load(Ordering::SeqCst)
    }

    async fn confirm_device_access(&self) -> bool {
        self.device_requests.fetch_add(1, Ordering::SeqCst);
        self.grant_device.load(Ordering::SeqCst)
    }
}

/// Token broker that issues a fresh token for every granted consent.
#[derive(Debug, Default)]
pub struct MockTokenBroker {
    current: Mutex<Option<CaptureToken>>,
    issued: AtomicUsize,
    releases: AtomicUsize,
}

impl MockTokenBroker {
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Simulate a token granted outside the controller (e.g. by the host UI).
    pub fn grant_out_of_band(&self) -> CaptureToken {
        let token = self.issue();
        *self.current.lock().unwrap() = Some(token.clone());
        token
    }

    #[must_use]
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn holds_token(&self) -> bool {
        self.current.lock().unwrap().is_some()
    }

    fn issue(&self) -> CaptureToken {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        CaptureToken::new(format!("capture-token-{n}"))
    }
}

#[async_trait]
impl TokenBroker for MockTokenBroker {
    async fn acquire(&self, prompt: &PromptHandle) -> Option<CaptureToken> {
        if !prompt.request_capture_consent().await {
            return None;
        }
        let token = self.issue();
        *self.current.lock().unwrap() = Some(token.clone());
        Some(token)
    }

    fn current(&self) -> Option<CaptureToken> {
        self.current.lock().unwrap().clone()
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.current.lock().unwrap().take();
    }
}
