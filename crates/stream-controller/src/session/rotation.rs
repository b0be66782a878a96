//! Output rotation bookkeeping.
//!
//! The encoder orientation is locked when a session starts. Device rotations
//! arriving after that are queued and applied when the session returns to
//! idle. Rotations that arrive during a reconnect outage are kept apart so a
//! successful reconnect can drop them without losing an earlier queued one.

use crate::collaborators::Rotation;

/// Queued rotation waiting for the session to go idle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingRotation {
    settled: Option<Rotation>,
    outage: Option<Rotation>,
}

impl PendingRotation {
    pub fn queue(&mut self, rotation: Rotation, during_outage: bool) {
        if during_outage {
            self.outage = Some(rotation);
        } else {
            self.settled = Some(rotation);
            self.outage = None;
        }
    }

    /// Forget rotations queued while reconnecting.
    pub fn discard_outage(&mut self) -> Option<Rotation> {
        self.outage.take()
    }

    /// Take the rotation to apply at idle, clearing the queue.
    pub fn take(&mut self) -> Option<Rotation> {
        let latest = self.outage.take().or(self.settled);
        self.settled = None;
        latest
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.settled.is_none() && self.outage.is_none()
    }
}

/// Rotation state shared between the session and the orientation watcher.
#[derive(Debug, Default)]
pub struct RotationState {
    /// Latest rotation reported by the device.
    pub device: Rotation,
    pub pending: PendingRotation,
}
