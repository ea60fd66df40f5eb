//! Backend capability interface.
//!
//! The transport drives hardware through one [`Backend`] implementation:
//!
//! - [`ring::RingBackend`] - descriptor-ring engine. The host writes
//!   16-byte transfer ring elements, rings a doorbell, and reads completion
//!   events from an event ring.
//! - [`engine::EngineBackend`] - generic scatter-gather transfer engine.
//!   Each element becomes an engine descriptor; completion is queried per
//!   descriptor cookie.
//!
//! Every backend keeps its own per-channel state in
//! [`Backend::Channel`]. The transport stores it inside the channel lock and
//! passes it back on each call, so backend methods never take locks of
//! their own.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::driver::config::{BackendKind, EndpointConfig};
use crate::driver::error::{ConfigError, DmaResult, Result};
use crate::trans::{CmdInfo, ScatterEntry};

pub mod engine;
pub mod ring;

/// A committed transaction as handed to a backend
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    /// Transaction slot within the channel
    pub slot: u16,
    /// Filled scatter entries, in order
    pub entries: &'a [ScatterEntry],
    /// Command info per entry (command channel only)
    pub info: Option<&'a [CmdInfo]>,
}

impl Submission<'_> {
    /// Opcode word of an entry, if it is an immediate command
    #[must_use]
    pub fn opcode(&self, index: usize) -> Option<u16> {
        let info = self.info?.get(index)?;
        (info.opcode != crate::cmd::Opcode::None).then(|| info.wire_opcode())
    }
}

/// A transaction hardware has finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HwCompletion {
    /// Transaction slot
    pub slot: u16,
    /// Bytes actually transferred, when the hardware reports it
    pub len: Option<u32>,
}

/// Capability surface of a hardware backend
pub trait Backend: Sync {
    /// Backend-private per-channel state
    type Channel: Send;

    /// Backend family
    fn kind(&self) -> BackendKind;

    /// Most channels this backend implements
    fn channel_limit(&self) -> usize;

    /// Create the private state for one configured endpoint
    fn channel_init(&self, endpoint: &EndpointConfig) -> Result<Self::Channel>;

    /// Most TREs that may be outstanding on the channel at once
    fn channel_tre_max(&self, channel: &Self::Channel) -> u32;

    /// Most TREs one transaction may use
    fn channel_trans_tre_max(&self, channel: &Self::Channel) -> u32;

    /// Bring the channel's hardware up (transport setup)
    fn setup(&self, channel: &mut Self::Channel) -> Result<()>;

    /// Undo [`setup`](Backend::setup)
    fn teardown(&self, channel: &mut Self::Channel);

    /// Release the channel's hardware resources before the transport is dropped
    fn exit(&self, channel: &mut Self::Channel) {
        let _ = channel;
    }

    /// Start the channel
    fn start(&self, channel: &mut Self::Channel) -> Result<()>;

    /// Stop the channel
    fn stop(&self, channel: &mut Self::Channel) -> Result<()>;

    /// Reset the channel; outstanding hardware work is discarded
    ///
    /// `doorbell` enables the doorbell engine after the reset where the
    /// hardware has one.
    fn reset(&self, channel: &mut Self::Channel, doorbell: bool) -> Result<()>;

    /// Quiesce the channel, stopping it if `stop` is set
    fn suspend(&self, channel: &mut Self::Channel, stop: bool) -> Result<()>;

    /// Resume the channel, starting it if `start` is set
    fn resume(&self, channel: &mut Self::Channel, start: bool) -> Result<()>;

    /// Hand a committed transaction to hardware
    ///
    /// `doorbell` asks for hardware to be notified now. Returns whether it
    /// was.
    fn submit(
        &self,
        channel: &mut Self::Channel,
        submission: &Submission<'_>,
        doorbell: bool,
    ) -> Result<bool>;

    /// Collect transactions hardware has finished
    ///
    /// `pending` lists committed transactions oldest first. Completions are
    /// appended to `out` in order. A hardware error stops the scan; whatever
    /// was collected before it is still valid.
    fn harvest(
        &self,
        channel: &mut Self::Channel,
        pending: &VecDeque<u16>,
        out: &mut Vec<HwCompletion>,
    ) -> DmaResult<()>;

    /// Mask or unmask the channel's completion interrupt
    fn irq_enable(&self, channel: &mut Self::Channel, enable: bool) {
        let _ = (channel, enable);
    }

    /// Queue a single one-byte read outside any transaction
    fn read_byte(&self, channel: &mut Self::Channel, addr: u64) -> Result<()> {
        let _ = (channel, addr);
        Err(ConfigError::Unsupported.into())
    }
}
