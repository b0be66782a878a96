//! Single-slot supervised background tasks.
//!
//! Each kind of background source work (relay attach, audio upgrade, relay
//! reattach loop, ingest health monitor) lives in its own slot. Spawning into
//! a slot cancels whatever ran there before, so two instances of the same
//! kind never run concurrently.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// A supervised slot holding at most one task.
pub struct TaskSlot {
    name: &'static str,
    parent: CancellationToken,
    running: Mutex<Option<Running>>,
}

impl TaskSlot {
    /// Create a slot whose tasks are also cancelled when `parent` is.
    #[must_use]
    pub fn new(name: &'static str, parent: CancellationToken) -> Self {
        Self {
            name,
            parent,
            running: Mutex::new(None),
        }
    }

    /// Spawn `task`, cancelling the previous occupant of the slot.
    ///
    /// The task must watch its token and return promptly once cancelled.
    pub fn spawn<F, Fut>(&self, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.parent.child_token();
        let handle = tokio::spawn(task(token.clone()));

        let previous = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Running { token, handle });
        if let Some(previous) = previous {
            if !previous.handle.is_finished() {
                debug!(target: "sc.sources", slot = self.name, "Superseding running task");
            }
            previous.token.cancel();
        }
    }

    /// Cancel the current occupant, if any.
    pub fn cancel(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            if !running.handle.is_finished() {
                debug!(target: "sc.sources", slot = self.name, "Cancelling task");
            }
            running.token.cancel();
        }
    }

    /// Whether a task is currently running in the slot.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished() && !r.token.is_cancelled())
    }
}

/// The background slots owned by one controller.
pub struct SourceTasks {
    /// Pending relay attach or external-device handshake.
    pub switch: TaskSlot,
    /// Relay audio upgrade window.
    pub audio_upgrade: TaskSlot,
    /// Relay reattach loop after an ingest disconnect.
    pub relay_retry: TaskSlot,
    /// Ingest health monitor for the attached relay feed.
    pub health_monitor: TaskSlot,
}

impl SourceTasks {
    #[must_use]
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            switch: TaskSlot::new("switch", parent.clone()),
            audio_upgrade: TaskSlot::new("audio_upgrade", parent.clone()),
            relay_retry: TaskSlot::new("relay_retry", parent.clone()),
            health_monitor: TaskSlot::new("health_monitor", parent.clone()),
        }
    }

    /// Cancel the relay retry and audio upgrade work.
    pub fn cancel_retry_and_upgrade(&self) {
        self.relay_retry.cancel();
        self.audio_upgrade.cancel();
    }

    /// Cancel everything tied to a relay or external-device source.
    pub fn cancel_source_work(&self) {
        self.switch.cancel();
        self.audio_upgrade.cancel();
        self.relay_retry.cancel();
        self.health_monitor.cancel();
    }
}
