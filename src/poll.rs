//! Completion harvester scheduling.
//!
//! Each channel has a [`PollHandle`]: a scheduled flag set by the
//! hardware-completion signal and cleared when a harvest pass finishes
//! under budget. While scheduled the channel's completion interrupt stays
//! masked, so a busy channel is drained by polling alone.
//!
//! The harvest pass itself lives on the transport
//! ([`Transport::poll`](crate::Transport::poll)), which owns the backend.

use core::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "async")]
use crate::sync::AtomicWaker;

/// Per-channel harvester scheduling state
pub struct PollHandle {
    scheduled: AtomicBool,
    enabled: AtomicBool,
    #[cfg(feature = "async")]
    waker: AtomicWaker,
}

impl PollHandle {
    /// Create a disabled, unscheduled handle
    pub const fn new() -> Self {
        Self {
            scheduled: AtomicBool::new(false),
            enabled: AtomicBool::new(false),
            #[cfg(feature = "async")]
            waker: AtomicWaker::new(),
        }
    }

    /// Request a harvest pass
    ///
    /// Returns true if this call scheduled the harvester; false if it was
    /// already scheduled or is disabled.
    pub fn schedule(&self) -> bool {
        if !self.enabled.load(Ordering::Acquire) {
            return false;
        }
        if self.scheduled.swap(true, Ordering::AcqRel) {
            return false;
        }
        #[cfg(feature = "async")]
        self.waker.wake();
        true
    }

    /// Finish a harvest pass that ran under budget
    ///
    /// Returns true if the handle is still enabled, meaning the completion
    /// interrupt should be re-armed.
    pub fn complete(&self) -> bool {
        self.scheduled.store(false, Ordering::Release);
        self.enabled.load(Ordering::Acquire)
    }

    /// Whether a harvest pass is requested
    pub fn is_scheduled(&self) -> bool {
        self.scheduled.load(Ordering::Acquire)
    }

    /// Whether scheduling is allowed
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Allow scheduling
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    /// Refuse further scheduling and drop any pending request
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        self.scheduled.store(false, Ordering::Release);
    }

    /// Register a waker for the next schedule
    #[cfg(feature = "async")]
    pub fn register(&self, waker: &core::task::Waker) {
        self.waker.register(waker);
    }
}

impl Default for PollHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PollHandle")
            .field("scheduled", &self.is_scheduled())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_handle_never_schedules() {
        let poll = PollHandle::new();
        assert!(!poll.schedule());
        assert!(!poll.is_scheduled());
    }

    #[test]
    fn schedule_is_edge_triggered() {
        let poll = PollHandle::new();
        poll.enable();
        assert!(poll.schedule());
        assert!(!poll.schedule());
        assert!(poll.is_scheduled());
        assert!(poll.complete());
        assert!(poll.schedule());
    }

    #[test]
    fn disable_drops_pending_request() {
        let poll = PollHandle::new();
        poll.enable();
        poll.schedule();
        poll.disable();
        assert!(!poll.is_scheduled());
        assert!(!poll.complete());
    }
}
