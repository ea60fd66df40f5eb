//! Outward event hooks.
//!
//! The transport reports transaction completion and release, transmit queue
//! accounting and channel errors to its owner through [`TransportEvents`].
//! Hooks run on the completion path with no transport lock held, so they
//! may allocate and commit new transactions (receive buffer replenishing is
//! the usual case).

use crate::driver::error::DmaError;
use crate::trans::TransView;

/// Receiver of transport events
///
/// Every method has an empty default, so implementors override only what
/// they consume.
pub trait TransportEvents: Sync {
    /// A transaction finished (successfully or cancelled) and is about to
    /// be released by the harvester
    fn trans_complete(&self, trans: &TransView) {
        let _ = trans;
    }

    /// The last reference to a transaction was dropped and its resources
    /// returned; buffers attached to it may be unmapped
    fn trans_release(&self, trans: &TransView) {
        let _ = trans;
    }

    /// Transmit work was handed to hardware since the last report
    fn tx_queued(&self, channel_id: u8, trans_count: u32, byte_count: u32) {
        let _ = (channel_id, trans_count, byte_count);
    }

    /// Transmit work completed since the last report
    fn tx_completed(&self, channel_id: u8, trans_count: u32, byte_count: u32) {
        let _ = (channel_id, trans_count, byte_count);
    }

    /// Hardware reported an error; the channel is unusable until reset
    fn channel_error(&self, channel_id: u8, error: DmaError) {
        let _ = (channel_id, error);
    }
}

/// Event sink that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvents;

impl TransportEvents for NoEvents {}
