//! Single-shot, cancelable reconnect timer.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct Scheduled {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

/// At most one pending callback at a time.
///
/// Scheduling replaces the pending callback. The callback receives the
/// timer token, so a `cancel()` issued after it fired is still observable
/// by the work it is doing.
#[derive(Default)]
pub struct ReconnectTimer {
    current: Mutex<Option<Scheduled>>,
}

impl ReconnectTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `callback` after `delay`, replacing any pending callback.
    pub fn schedule<F, Fut>(&self, delay: Duration, callback: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let fired = Arc::new(AtomicBool::new(false));

        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Scheduled {
                token: token.clone(),
                fired: Arc::clone(&fired),
            });
        if let Some(previous) = previous {
            previous.token.cancel();
        }

        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    debug!(target: "sc.session", "Reconnect timer cancelled before firing");
                }
                () = tokio::time::sleep(delay) => {
                    if token.is_cancelled() {
                        return;
                    }
                    fired.store(true, Ordering::SeqCst);
                    callback(token).await;
                }
            }
        });
    }

    /// Cancel the pending callback, and signal one that is already running.
    pub fn cancel(&self) {
        if let Some(scheduled) = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            scheduled.token.cancel();
        }
    }

    /// A callback is scheduled and has not fired yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|s| !s.token.is_cancelled() && !s.fired.load(Ordering::SeqCst))
    }
}
