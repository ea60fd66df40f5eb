//! Transactions.
//!
//! A transaction is one hardware submission of one or more transfer
//! elements. It is owned by the caller through a move-only [`Trans`] handle
//! from allocation until commit; after commit it is owned by the channel and
//! referenced by at most one waiter.
//!
//! ```text
//!   trans_alloc ──► Allocated ──commit──► Pending ──harvest──► Complete
//!                      │                                          │
//!                      └──drop / empty commit──► Freed ◄── Polled ◄┘
//! ```
//!
//! Records live in a fixed slab indexed by slot. The per-slot reference
//! count and completion signal live outside the channel lock so a waiter
//! can observe completion without taking it.

use alloc::vec::Vec;
use core::mem::ManuallyDrop;
use core::sync::atomic::{AtomicU32, Ordering};

use embedded_hal::delay::DelayNs;

use crate::backend::Backend;
use crate::channel::Channel;
use crate::cmd::Opcode;
use crate::driver::error::{DmaError, DmaResult, Result};
use crate::events::TransportEvents;
use crate::pool::PoolSpan;
use crate::sync::Completion;
use crate::transport::Transport;

// =============================================================================
// Public Types
// =============================================================================

/// DMA direction of a transaction or command element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransDirection {
    /// No data movement (commands that only carry their payload)
    #[default]
    None,
    /// Host memory to accelerator
    ToDevice,
    /// Accelerator to host memory
    FromDevice,
}

/// A buffer already mapped for DMA by its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaBuf {
    /// Hardware address
    pub addr: u64,
    /// Length in bytes
    pub len: u32,
}

impl DmaBuf {
    /// Describe a mapped buffer
    #[must_use]
    pub const fn new(addr: u64, len: u32) -> Self {
        Self { addr, len }
    }
}

/// One entry of a transaction's scatter list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScatterEntry {
    /// Hardware address
    pub addr: u64,
    /// Length in bytes
    pub len: u32,
}

/// Per-element command information (command channel only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CmdInfo {
    /// Immediate-command opcode; [`Opcode::None`] for plain transfers
    pub opcode: Opcode,
    /// Data direction of the element
    pub direction: TransDirection,
    /// Extra bits carried in the opcode word (register-write clear option)
    pub(crate) opcode_flags: u16,
    /// Command payload element backing this entry, if any
    pub(crate) payload: Option<u32>,
}

impl CmdInfo {
    /// Command info for an element with no backing payload
    #[must_use]
    pub const fn new(opcode: Opcode, direction: TransDirection) -> Self {
        Self {
            opcode,
            direction,
            opcode_flags: 0,
            payload: None,
        }
    }

    /// Opcode word as placed on the wire
    #[must_use]
    pub const fn wire_opcode(&self) -> u16 {
        self.opcode as u16 | self.opcode_flags
    }
}

/// Queue a transaction currently sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransState {
    /// Allocated, being filled by its owner
    #[default]
    Allocated,
    /// Committed to hardware
    Pending,
    /// Hardware finished (or it was cancelled)
    Complete,
    /// Taken by the harvester for finalization
    Polled,
}

/// Snapshot of a transaction handed to event hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransView {
    /// Owning channel
    pub channel_id: u8,
    /// Slot within the channel
    pub slot: u16,
    /// Data direction
    pub direction: TransDirection,
    /// Committed length, or received length on receive channels
    pub len: u32,
    /// Scatter entries filled
    pub used: u32,
    /// Completed by a channel reset rather than by hardware
    pub cancelled: bool,
    /// Caller token set with [`Trans::set_data`]
    pub data: u64,
}

// =============================================================================
// Records
// =============================================================================

/// Channel-owned part of a transaction
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TransRecord {
    pub(crate) state: TransState,
    pub(crate) tre_count: u32,
    pub(crate) used: u32,
    pub(crate) len: u32,
    pub(crate) direction: TransDirection,
    pub(crate) cancelled: bool,
    pub(crate) data: u64,
    /// Scatter list span in the channel's scatter pool
    pub(crate) sg: PoolSpan,
    /// Command info span (command channel only)
    pub(crate) info: Option<PoolSpan>,
    /// Channel byte counter before this transaction (transmit only)
    pub(crate) byte_count: u64,
    /// Channel transaction counter before this transaction (transmit only)
    pub(crate) trans_count: u64,
}

impl TransRecord {
    pub(crate) fn view(&self, channel_id: u8, slot: u16) -> TransView {
        TransView {
            channel_id,
            slot,
            direction: self.direction,
            len: self.len,
            used: self.used,
            cancelled: self.cancelled,
            data: self.data,
        }
    }
}

/// Fixed slab of transaction records
///
/// Sized to the channel's TRE budget: every live transaction holds at least
/// one TRE, so a reserved budget always finds a free slot.
#[derive(Debug)]
pub(crate) struct TransTable {
    records: Vec<TransRecord>,
    free: Vec<u16>,
}

impl TransTable {
    pub(crate) fn new(slots: u16) -> Self {
        let mut records = Vec::new();
        records.resize(usize::from(slots), TransRecord::default());
        Self {
            records,
            // Popped from the back, so slot 0 is handed out first
            free: (0..slots).rev().collect(),
        }
    }

    pub(crate) fn insert(&mut self, record: TransRecord) -> DmaResult<u16> {
        let slot = self.free.pop().ok_or(DmaError::NoTresAvailable)?;
        self.records[usize::from(slot)] = record;
        Ok(slot)
    }

    pub(crate) fn remove(&mut self, slot: u16) -> TransRecord {
        debug_assert!(!self.free.contains(&slot), "transaction slot freed twice");
        self.free.push(slot);
        self.records[usize::from(slot)]
    }

    pub(crate) fn get(&self, slot: u16) -> &TransRecord {
        &self.records[usize::from(slot)]
    }

    pub(crate) fn get_mut(&mut self, slot: u16) -> &mut TransRecord {
        &mut self.records[usize::from(slot)]
    }

    pub(crate) fn live(&self) -> usize {
        self.records.len() - self.free.len()
    }
}

/// Lock-free per-slot state
pub(crate) struct TransSync {
    pub(crate) refcount: AtomicU32,
    pub(crate) completion: Completion,
}

impl TransSync {
    pub(crate) const fn new() -> Self {
        Self {
            refcount: AtomicU32::new(0),
            completion: Completion::new(),
        }
    }

    /// Drop a reference unless it is the last one
    ///
    /// Returns false when the caller holds the last reference, which must
    /// then be dropped under the channel lock.
    pub(crate) fn put_unless_last(&self) -> bool {
        self.refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count > 1).then(|| count - 1)
            })
            .is_ok()
    }

    pub(crate) fn get(&self) {
        self.refcount.fetch_add(1, Ordering::AcqRel);
    }
}

// =============================================================================
// Transaction Handle
// =============================================================================

/// Caller-owned handle to an allocated transaction
///
/// Fill it with [`cmd_add`](Trans::cmd_add), [`page_add`](Trans::page_add),
/// [`skb_add`](Trans::skb_add) or the command encoders, then hand it to
/// hardware with one of the commit methods. Dropping an uncommitted handle
/// frees the transaction.
#[must_use = "dropping a transaction frees it without submitting"]
pub struct Trans<'t, B: Backend, E: TransportEvents> {
    pub(crate) transport: &'t Transport<B, E>,
    pub(crate) channel: &'t Channel<B::Channel>,
    pub(crate) slot: u16,
}

impl<'t, B: Backend, E: TransportEvents> Trans<'t, B, E> {
    pub(crate) fn new(
        transport: &'t Transport<B, E>,
        channel: &'t Channel<B::Channel>,
        slot: u16,
    ) -> Self {
        Self {
            transport,
            channel,
            slot,
        }
    }

    /// Channel this transaction belongs to
    #[must_use]
    pub fn channel_id(&self) -> u8 {
        self.channel.id()
    }

    /// Slot within the channel
    #[must_use]
    pub fn slot(&self) -> u16 {
        self.slot
    }

    /// Snapshot of the transaction
    #[must_use]
    pub fn view(&self) -> TransView {
        let id = self.channel.id();
        self.channel
            .state
            .with(|st| st.info.table.get(self.slot).view(id, self.slot))
    }

    /// Attach a caller token reported back in event hooks
    pub fn set_data(&mut self, data: u64) {
        self.channel
            .state
            .with(|st| st.info.table.get_mut(self.slot).data = data);
    }

    /// Append one command element
    ///
    /// `buf_addr` and `size` describe the payload; `opcode` tells the
    /// hardware how to interpret it.
    pub fn cmd_add(
        &mut self,
        buf_addr: u64,
        size: u32,
        direction: TransDirection,
        opcode: Opcode,
    ) -> DmaResult<()> {
        let info = CmdInfo::new(opcode, direction);
        self.transport
            .trans_push(self.channel, self.slot, &[DmaBuf::new(buf_addr, size)], Some(info))
    }

    /// Append one mapped page buffer
    pub fn page_add(&mut self, buf: DmaBuf) -> DmaResult<()> {
        self.transport.trans_push(self.channel, self.slot, &[buf], None)
    }

    /// Append every fragment of a socket buffer
    ///
    /// Either all fragments are added or none; if they do not fit in the
    /// remaining elements this fails with [`DmaError::TransferTooLarge`] and
    /// the transaction is left as it was.
    pub fn skb_add(&mut self, fragments: &[DmaBuf]) -> DmaResult<()> {
        self.transport
            .trans_push(self.channel, self.slot, fragments, None)
    }

    /// Submit the transaction to hardware
    ///
    /// With `ring_db` false the doorbell may be deferred so several commits
    /// can be batched; it is still rung when the channel runs out of TREs.
    /// A transaction with no elements is freed instead.
    pub fn commit(self, ring_db: bool) -> Result<()> {
        let (transport, channel, slot) = self.into_parts();
        transport.trans_commit(channel, slot, ring_db)
    }

    /// Submit the transaction and block until it completes
    pub fn commit_wait<D: DelayNs>(self, delay: &mut D) -> Result<()> {
        let (transport, channel, slot) = self.into_parts();
        transport.trans_commit_wait(channel, slot, None, delay)
    }

    /// Submit the transaction and block until it completes or `timeout_ms`
    /// elapses
    ///
    /// On timeout [`IoError::Timeout`](crate::IoError::Timeout) is returned;
    /// the transaction stays in flight and is released by the completion
    /// path when hardware finishes.
    pub fn commit_wait_timeout<D: DelayNs>(self, timeout_ms: u32, delay: &mut D) -> Result<()> {
        let (transport, channel, slot) = self.into_parts();
        transport.trans_commit_wait(channel, slot, Some(timeout_ms), delay)
    }

    /// Submit the transaction and await its completion
    ///
    /// The transaction is committed on the first poll. Dropping the future
    /// gives up the wait without leaking the transaction.
    #[cfg(feature = "async")]
    pub fn commit_wait_async(self) -> crate::sync::asynch::CommitWait<'t, B, E> {
        let (transport, channel, slot) = self.into_parts();
        crate::sync::asynch::CommitWait::new(transport, channel, slot)
    }

    /// Release ownership without running `Drop`
    fn into_parts(self) -> (&'t Transport<B, E>, &'t Channel<B::Channel>, u16) {
        let this = ManuallyDrop::new(self);
        (this.transport, this.channel, this.slot)
    }
}

impl<B: Backend, E: TransportEvents> Drop for Trans<'_, B, E> {
    fn drop(&mut self) {
        self.transport.trans_free(self.channel, self.slot);
    }
}

impl<B: Backend, E: TransportEvents> core::fmt::Debug for Trans<'_, B, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Trans")
            .field("channel_id", &self.channel.id())
            .field("slot", &self.slot)
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
