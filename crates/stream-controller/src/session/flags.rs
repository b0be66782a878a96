//! Lock-free controller flags.
//!
//! These are read without the session mutex. `user_stopped` and the stop
//! token are written by `stop()` before it takes the mutex; everything else
//! is written only by the mutex holder or the slow-close task it spawned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Point-in-time copy of the flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagSnapshot {
    pub user_stopped: bool,
    pub cleanup_in_progress: bool,
}

#[derive(Debug)]
pub struct SessionFlags {
    user_stopped: AtomicBool,
    cleanup_in_progress: AtomicBool,
    stop_token: Mutex<CancellationToken>,
}

impl Default for SessionFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionFlags {
    #[must_use]
    pub fn new() -> Self {
        Self {
            user_stopped: AtomicBool::new(false),
            cleanup_in_progress: AtomicBool::new(false),
            stop_token: Mutex::new(CancellationToken::new()),
        }
    }

    /// Signal user stop: set the flag and cancel the current attempt token.
    pub fn request_stop(&self) {
        self.user_stopped.store(true, Ordering::SeqCst);
        self.stop_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// Clear the user-stopped flag and arm a fresh attempt token.
    pub fn clear_stop(&self) {
        self.user_stopped.store(false, Ordering::SeqCst);
        let mut token = self
            .stop_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
    }

    /// Token cancelled by the next `request_stop`.
    #[must_use]
    pub fn stop_token(&self) -> CancellationToken {
        self.stop_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn is_user_stopped(&self) -> bool {
        self.user_stopped.load(Ordering::SeqCst)
    }

    pub fn set_cleanup_in_progress(&self, in_progress: bool) {
        self.cleanup_in_progress.store(in_progress, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cleanup_in_progress(&self) -> bool {
        self.cleanup_in_progress.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn snapshot(&self) -> FlagSnapshot {
        FlagSnapshot {
            user_stopped: self.is_user_stopped(),
            cleanup_in_progress: self.is_cleanup_in_progress(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_stop_cancels_current_token() {
        let flags = SessionFlags::new();
        let token = flags.stop_token();

        flags.request_stop();

        assert!(token.is_cancelled());
        assert!(flags.is_user_stopped());
    }

    #[test]
    fn test_clear_stop_arms_fresh_token() {
        let flags = SessionFlags::new();
        let old = flags.stop_token();
        flags.request_stop();

        flags.clear_stop();

        assert!(!flags.is_user_stopped());
        assert!(old.is_cancelled());
        assert!(!flags.stop_token().is_cancelled());
    }

    #[test]
    fn test_snapshot() {
        let flags = SessionFlags::new();
        flags.set_cleanup_in_progress(true);
        assert_eq!(
            flags.snapshot(),
            FlagSnapshot {
                user_stopped: false,
                cleanup_in_progress: true
            }
        );
    }
}
