//! `CaptureTokenLease` - connection-scoped view of the capture token.
//!
//! The platform broker knows nothing about engine connections. The lease
//! adds that: every held token is stamped with the connection epoch it was
//! obtained in, and every engine close bumps the epoch, so a token can never
//! be carried across a close/reopen boundary.

use crate::collaborators::{CaptureToken, PromptHandle, TokenBroker};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

#[derive(Default)]
struct LeaseState {
    epoch: u64,
    held: Option<(CaptureToken, u64)>,
    prompt: Option<PromptHandle>,
}

/// Connection-scoped capture token holder.
pub struct CaptureTokenLease {
    broker: Arc<dyn TokenBroker>,
    state: Mutex<LeaseState>,
    restore_owed: AtomicBool,
}

impl CaptureTokenLease {
    #[must_use]
    pub fn new(broker: Arc<dyn TokenBroker>) -> Self {
        Self {
            broker,
            state: Mutex::new(LeaseState::default()),
            restore_owed: AtomicBool::new(false),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LeaseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current connection epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.state().epoch
    }

    /// A token usable on the current connection, if one exists.
    ///
    /// A token granted out-of-band (the broker holds one we did not ask
    /// for) is adopted into the current epoch.
    #[must_use]
    pub fn valid_token(&self) -> Option<CaptureToken> {
        let mut state = self.state();
        let epoch = state.epoch;
        if let Some((token, held_epoch)) = &state.held {
            if *held_epoch == epoch {
                return Some(token.clone());
            }
        }
        let adopted = self.broker.current()?;
        state.held = Some((adopted.clone(), epoch));
        Some(adopted)
    }

    #[must_use]
    pub fn has_valid_token(&self) -> bool {
        self.valid_token().is_some()
    }

    /// Acquire a token through `prompt`, reusing a valid one if held.
    ///
    /// The prompt is remembered so a reconnect can re-acquire without the
    /// caller supplying it again.
    pub async fn acquire(&self, prompt: &PromptHandle) -> Option<CaptureToken> {
        self.state().prompt = Some(prompt.clone());

        if let Some(token) = self.valid_token() {
            return Some(token);
        }

        let epoch = self.epoch();
        let token = self.broker.acquire(prompt).await?;

        let mut state = self.state();
        if state.epoch != epoch {
            // The connection closed while the consent flow ran.
            debug!(target: "sc.permissions", "Capture token granted for a closed connection, discarding");
            drop(state);
            self.broker.release();
            return None;
        }
        state.held = Some((token.clone(), epoch));
        info!(target: "sc.permissions", epoch, "Capture token acquired");
        Some(token)
    }

    /// Re-acquire after a reconnect, using the remembered prompt if any.
    pub async fn reacquire(&self) -> Option<CaptureToken> {
        let prompt = self.state().prompt.clone();
        match prompt {
            Some(prompt) => self.acquire(&prompt).await,
            None => self.valid_token(),
        }
    }

    /// Mark the held token dead because the engine connection closed.
    pub fn invalidate_on_close(&self) {
        let mut state = self.state();
        state.epoch += 1;
        let had_token = state.held.take().is_some();
        drop(state);

        self.broker.release();
        if had_token {
            debug!(target: "sc.permissions", "Capture token invalidated by engine close");
        }
    }

    /// Record that screen audio was downgraded and must be restored once.
    pub fn owe_restore(&self) {
        self.restore_owed.store(true, Ordering::SeqCst);
    }

    /// Take the owed restore. Returns `true` at most once per downgrade.
    pub fn take_restore_owed(&self) -> bool {
        self.restore_owed.swap(false, Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_restore_owed(&self) -> bool {
        self.restore_owed.load(Ordering::SeqCst)
    }

    /// Drop everything: token, remembered prompt and any owed restore.
    pub fn release(&self) {
        let mut state = self.state();
        state.epoch += 1;
        state.held = None;
        state.prompt = None;
        drop(state);

        self.restore_owed.store(false, Ordering::SeqCst);
        self.broker.release();
    }
}
