//! Channels.
//!
//! A channel is one hardware queue. It owns the pools its transactions draw
//! from, the four transaction queues, the traffic counters and the backend's
//! private per-channel state. Everything but the TRE budget, the per-slot
//! reference counts and the poll handle sits behind one
//! [`CriticalSectionCell`] and is only touched for short, bounded work.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::backend::HwCompletion;
use crate::driver::config::EndpointConfig;
use crate::driver::error::{ConfigError, ConfigResult, DmaError, DmaResult};
use crate::internal::constants::CMD_PAYLOAD_SIZE;
use crate::poll::PollHandle;
use crate::pool::{DmaPool, Pool, PoolSpan};
use crate::sync::CriticalSectionCell;
use crate::trans::{
    CmdInfo, ScatterEntry, TransDirection, TransRecord, TransState, TransSync, TransTable,
};

// =============================================================================
// Public Snapshots
// =============================================================================

/// Number of transactions on each queue of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueDepths {
    /// Allocated, not yet committed
    pub allocated: usize,
    /// Committed, awaiting hardware
    pub pending: usize,
    /// Finished, awaiting the harvester
    pub complete: usize,
    /// Taken by the harvester, awaiting release
    pub polled: usize,
}

impl QueueDepths {
    /// Total transactions on all queues
    #[must_use]
    pub const fn total(&self) -> usize {
        self.allocated + self.pending + self.complete + self.polled
    }
}

/// Channel traffic counters
///
/// On transmit channels `byte_count`/`trans_count` advance at commit and the
/// `compl_*` counters trail them as work completes. On receive channels only
/// `byte_count`/`trans_count` are used and advance at completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelStats {
    /// Bytes committed (transmit) or received (receive)
    pub byte_count: u64,
    /// Transactions committed (transmit) or received (receive)
    pub trans_count: u64,
    /// Bytes last reported as queued
    pub queued_byte_count: u64,
    /// Transactions last reported as queued
    pub queued_trans_count: u64,
    /// Bytes reported as completed
    pub compl_byte_count: u64,
    /// Transactions reported as completed
    pub compl_trans_count: u64,
}

impl ChannelStats {
    /// Advance the queued snapshot to the current counters, returning the delta
    pub(crate) fn take_queued(&mut self) -> (u32, u32) {
        let trans = self.trans_count - self.queued_trans_count;
        let bytes = self.byte_count - self.queued_byte_count;
        self.queued_trans_count = self.trans_count;
        self.queued_byte_count = self.byte_count;
        (trans as u32, bytes as u32)
    }

    /// Roll the completed counters forward through a transmit transaction
    pub(crate) fn tx_complete(&mut self, rec: &TransRecord) -> (u32, u32) {
        let bytes = (rec.byte_count + u64::from(rec.len)).saturating_sub(self.compl_byte_count);
        let trans = (rec.trans_count + 1).saturating_sub(self.compl_trans_count);
        self.compl_byte_count += bytes;
        self.compl_trans_count += trans;
        (trans as u32, bytes as u32)
    }

    /// Account a received transaction
    pub(crate) fn rx_complete(&mut self, rec: &TransRecord) {
        self.byte_count += u64::from(rec.len);
        self.trans_count += 1;
    }
}

// =============================================================================
// Transaction Bookkeeping
// =============================================================================

/// Command-channel pools
#[derive(Debug)]
pub(crate) struct CmdPools {
    pub(crate) info: Pool<CmdInfo>,
    pub(crate) payloads: DmaPool,
}

/// Pools, records and queues of one channel
///
/// Each record slot owns a fixed `stride`-element span of the scatter and
/// command-info pools, so transactions can be freed in any order without
/// fragmenting them.
#[derive(Debug)]
pub(crate) struct TransInfo {
    pub(crate) table: TransTable,
    stride: u32,
    pub(crate) sg_pool: Pool<ScatterEntry>,
    pub(crate) cmd: Option<CmdPools>,
    pub(crate) allocated: VecDeque<u16>,
    pub(crate) pending: VecDeque<u16>,
    pub(crate) complete: VecDeque<u16>,
    pub(crate) polled: VecDeque<u16>,
}

impl TransInfo {
    pub(crate) fn new(tre_max: u32, trans_tre_max: u32, command: bool) -> ConfigResult<Self> {
        let slots = u16::try_from(tre_max).map_err(|_| ConfigError::InvalidPoolGeometry)?;
        let spans = tre_max
            .checked_mul(trans_tre_max)
            .ok_or(ConfigError::InvalidPoolGeometry)?;
        let cmd = if command {
            Some(CmdPools {
                info: Pool::new(spans, trans_tre_max)?,
                payloads: DmaPool::new(CMD_PAYLOAD_SIZE, tre_max, trans_tre_max)?,
            })
        } else {
            None
        };
        Ok(Self {
            table: TransTable::new(slots),
            stride: trans_tre_max,
            sg_pool: Pool::new(spans, trans_tre_max)?,
            cmd,
            allocated: VecDeque::new(),
            pending: VecDeque::new(),
            complete: VecDeque::new(),
            polled: VecDeque::new(),
        })
    }

    /// Create a record and place it on the allocated queue
    pub(crate) fn alloc(&mut self, tre_count: u32, direction: TransDirection) -> DmaResult<u16> {
        let slot = self.table.insert(TransRecord {
            tre_count,
            direction,
            ..TransRecord::default()
        })?;
        match self.claim_spans(slot, tre_count) {
            Ok((sg, info)) => {
                let rec = self.table.get_mut(slot);
                rec.sg = sg;
                rec.info = info;
                self.allocated.push_back(slot);
                Ok(slot)
            }
            Err(e) => {
                self.table.remove(slot);
                Err(e)
            }
        }
    }

    /// Claim the slot's scatter span and, on the command channel, its
    /// command-info span
    fn claim_spans(
        &mut self,
        slot: u16,
        tre_count: u32,
    ) -> DmaResult<(PoolSpan, Option<PoolSpan>)> {
        let start = u32::from(slot) * self.stride;
        let sg = self.sg_pool.alloc_at(start, tre_count)?;
        let info = match self.cmd.as_mut() {
            Some(cmd) => match cmd.info.alloc_at(start, tre_count) {
                Ok(span) => Some(span),
                Err(e) => {
                    self.sg_pool.release(sg);
                    return Err(e);
                }
            },
            None => None,
        };
        Ok((sg, info))
    }

    /// Remove a record from whichever queue holds it and return its pools
    pub(crate) fn release(&mut self, slot: u16) -> TransRecord {
        let state = self.table.get(slot).state;
        let queue = self.queue_mut(state);
        let pos = queue.iter().position(|&s| s == slot);
        debug_assert!(pos.is_some(), "transaction missing from its queue");
        if let Some(pos) = pos {
            queue.remove(pos);
        }
        let record = self.table.remove(slot);
        self.release_spans(&record);
        record
    }

    fn release_spans(&mut self, record: &TransRecord) {
        if let (Some(cmd), Some(span)) = (self.cmd.as_mut(), record.info) {
            let used = record.used as usize;
            for entry in &cmd.info.slice(span)[..used] {
                if let Some(index) = entry.payload {
                    cmd.payloads.release(index);
                }
            }
            cmd.info.release(span);
        }
        self.sg_pool.release(record.sg);
    }

    /// Allocated → Pending
    pub(crate) fn move_pending(&mut self, slot: u16) {
        self.relocate(slot, TransState::Allocated, TransState::Pending);
    }

    /// Pending → Complete for `slot` and every transaction committed before it
    ///
    /// Returns false if `slot` was not pending.
    pub(crate) fn move_complete(&mut self, slot: u16) -> bool {
        let Some(pos) = self.pending.iter().position(|&s| s == slot) else {
            return false;
        };
        for done in self.pending.drain(..=pos) {
            self.table.get_mut(done).state = TransState::Complete;
            self.complete.push_back(done);
        }
        true
    }

    /// Complete → Polled for the oldest completed transaction
    pub(crate) fn move_polled(&mut self) -> Option<u16> {
        let slot = self.complete.pop_front()?;
        self.table.get_mut(slot).state = TransState::Polled;
        self.polled.push_back(slot);
        Some(slot)
    }

    /// Mark every pending transaction cancelled and move it to Complete
    pub(crate) fn cancel_pending(&mut self) -> usize {
        let count = self.pending.len();
        for slot in self.pending.drain(..) {
            let rec = self.table.get_mut(slot);
            rec.cancelled = true;
            rec.state = TransState::Complete;
            self.complete.push_back(slot);
        }
        count
    }

    /// Apply hardware completions: record lengths and advance the queues
    pub(crate) fn apply_completions(&mut self, completions: &[HwCompletion], toward_device: bool) {
        let mut newest = None;
        for done in completions {
            let rec = self.table.get_mut(done.slot);
            if rec.state != TransState::Pending {
                continue;
            }
            if !toward_device {
                if let Some(len) = done.len {
                    rec.len = len;
                }
            }
            newest = Some(done.slot);
        }
        if let Some(slot) = newest {
            self.move_complete(slot);
        }
    }

    pub(crate) fn depths(&self) -> QueueDepths {
        QueueDepths {
            allocated: self.allocated.len(),
            pending: self.pending.len(),
            complete: self.complete.len(),
            polled: self.polled.len(),
        }
    }

    fn relocate(&mut self, slot: u16, from: TransState, to: TransState) {
        debug_assert_eq!(self.table.get(slot).state, from, "transaction moved out of order");
        let source = self.queue_mut(from);
        if let Some(pos) = source.iter().position(|&s| s == slot) {
            source.remove(pos);
        }
        self.table.get_mut(slot).state = to;
        self.queue_mut(to).push_back(slot);
    }

    fn queue_mut(&mut self, state: TransState) -> &mut VecDeque<u16> {
        match state {
            TransState::Allocated => &mut self.allocated,
            TransState::Pending => &mut self.pending,
            TransState::Complete => &mut self.complete,
            TransState::Polled => &mut self.polled,
        }
    }
}

// =============================================================================
// Channel
// =============================================================================

/// Lock-protected channel state
pub(crate) struct ChannelState<P> {
    pub(crate) info: TransInfo,
    pub(crate) stats: ChannelStats,
    /// Scratch buffer for hardware completions
    pub(crate) completions: Vec<HwCompletion>,
    /// Single-byte reads issued outside any transaction, not yet retired
    pub(crate) byte_reads: u32,
    /// Backend private state
    pub(crate) hw: P,
}

/// One hardware channel
pub(crate) struct Channel<P> {
    pub(crate) endpoint: EndpointConfig,
    pub(crate) tre_max: u32,
    pub(crate) trans_tre_max: u32,
    tre_avail: AtomicU32,
    error: AtomicBool,
    pub(crate) sync: Box<[TransSync]>,
    pub(crate) poll: PollHandle,
    pub(crate) state: CriticalSectionCell<ChannelState<P>>,
}

impl<P> Channel<P> {
    pub(crate) fn new(
        endpoint: EndpointConfig,
        tre_max: u32,
        trans_tre_max: u32,
        hw: P,
    ) -> ConfigResult<Self> {
        if tre_max == 0 || trans_tre_max == 0 || trans_tre_max > tre_max {
            return Err(ConfigError::InvalidPoolGeometry);
        }
        let info = TransInfo::new(tre_max, trans_tre_max, endpoint.command)?;
        let sync = (0..tre_max).map(|_| TransSync::new()).collect();
        Ok(Self {
            endpoint,
            tre_max,
            trans_tre_max,
            tre_avail: AtomicU32::new(tre_max),
            error: AtomicBool::new(false),
            sync,
            poll: PollHandle::new(),
            state: CriticalSectionCell::new(ChannelState {
                info,
                stats: ChannelStats::default(),
                completions: Vec::new(),
                byte_reads: 0,
                hw,
            }),
        })
    }

    pub(crate) fn id(&self) -> u8 {
        self.endpoint.channel_id
    }

    pub(crate) fn toward_device(&self) -> bool {
        self.endpoint.toward_device
    }

    /// Reserve TREs; fails without side effects if the budget is short
    pub(crate) fn tre_reserve(&self, count: u32) -> bool {
        self.tre_avail
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |avail| avail.checked_sub(count))
            .is_ok()
    }

    pub(crate) fn tre_release(&self, count: u32) {
        let previous = self.tre_avail.fetch_add(count, Ordering::AcqRel);
        debug_assert!(previous + count <= self.tre_max, "TRE budget over-released");
    }

    pub(crate) fn tre_avail(&self) -> u32 {
        self.tre_avail.load(Ordering::Acquire)
    }

    pub(crate) fn has_error(&self) -> bool {
        self.error.load(Ordering::Acquire)
    }

    pub(crate) fn set_error(&self, error: bool) {
        self.error.store(error, Ordering::Release);
    }

    pub(crate) fn trans_sync(&self, slot: u16) -> &TransSync {
        &self.sync[usize::from(slot)]
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(command: bool) -> EndpointConfig {
        EndpointConfig::new("test", 1, 1)
            .with_toward_device(true)
            .with_command(command)
    }

    #[test]
    fn tre_reserve_fails_beyond_budget() {
        let channel = Channel::new(endpoint(false), 4, 2, ()).unwrap();
        assert!(channel.tre_reserve(3));
        assert!(!channel.tre_reserve(2));
        assert_eq!(channel.tre_avail(), 1);
        channel.tre_release(3);
        assert!(channel.tre_reserve(4));
        assert_eq!(channel.tre_avail(), 0);
    }

    #[test]
    fn channel_geometry_validation() {
        assert!(Channel::new(endpoint(false), 0, 1, ()).is_err());
        assert!(Channel::new(endpoint(false), 2, 3, ()).is_err());
    }

    #[test]
    fn command_channel_has_command_pools() {
        let info = TransInfo::new(8, 4, true).unwrap();
        assert!(info.cmd.is_some());
        let info = TransInfo::new(8, 4, false).unwrap();
        assert!(info.cmd.is_none());
    }

    #[test]
    fn queues_move_forward_only() {
        let mut info = TransInfo::new(8, 2, false).unwrap();
        let a = info.alloc(1, TransDirection::ToDevice).unwrap();
        let b = info.alloc(2, TransDirection::ToDevice).unwrap();
        assert_eq!(info.depths().allocated, 2);

        info.move_pending(a);
        info.move_pending(b);
        assert_eq!(info.depths().pending, 2);

        // Completing the newest completes its predecessors too
        assert!(info.move_complete(b));
        assert_eq!(info.depths().complete, 2);
        assert!(!info.move_complete(a));

        assert_eq!(info.move_polled(), Some(a));
        assert_eq!(info.table.get(a).state, TransState::Polled);
        assert_eq!(info.depths().total(), 2);

        info.release(a);
        info.release(b);
        assert_eq!(info.depths().total(), 0);
        assert_eq!(info.sg_pool.outstanding(), 0);
    }

    #[test]
    fn out_of_order_release_never_fragments() {
        let mut info = TransInfo::new(5, 4, true).unwrap();
        let slots: Vec<u16> = (0..5)
            .map(|_| info.alloc(1, TransDirection::ToDevice).unwrap())
            .collect();
        for &slot in &[slots[0], slots[1], slots[3], slots[4]] {
            info.release(slot);
        }
        let _refill = info.alloc(1, TransDirection::ToDevice).unwrap();

        // Three TREs remain in the budget; a three-element request fits
        let big = info.alloc(3, TransDirection::ToDevice).unwrap();
        let rec = info.table.get(big);
        assert_eq!(rec.sg.len, 3);
        assert_eq!(rec.sg.start, u32::from(big) * 4);
        assert_eq!(rec.info.map(|span| span.start), Some(rec.sg.start));
        assert_eq!(info.depths().allocated, 3);
    }

    #[test]
    fn cancel_pending_marks_and_moves() {
        let mut info = TransInfo::new(8, 1, false).unwrap();
        let slots: Vec<u16> = (0..3)
            .map(|_| info.alloc(1, TransDirection::FromDevice).unwrap())
            .collect();
        for &slot in &slots {
            info.move_pending(slot);
        }
        assert_eq!(info.cancel_pending(), 3);
        assert_eq!(info.depths().complete, 3);
        assert!(slots.iter().all(|&s| info.table.get(s).cancelled));
    }

    #[test]
    fn completions_record_receive_length() {
        let mut info = TransInfo::new(8, 1, false).unwrap();
        let a = info.alloc(1, TransDirection::FromDevice).unwrap();
        let b = info.alloc(1, TransDirection::FromDevice).unwrap();
        info.move_pending(a);
        info.move_pending(b);
        info.apply_completions(
            &[
                HwCompletion { slot: a, len: Some(60) },
                HwCompletion { slot: b, len: None },
            ],
            false,
        );
        assert_eq!(info.table.get(a).len, 60);
        assert_eq!(info.table.get(b).len, 0);
        assert_eq!(info.depths().complete, 2);
    }

    #[test]
    fn stats_tx_accounting() {
        let mut stats = ChannelStats::default();
        let first = TransRecord {
            len: 100,
            byte_count: 0,
            trans_count: 0,
            ..TransRecord::default()
        };
        let second = TransRecord {
            len: 50,
            byte_count: 100,
            trans_count: 1,
            ..TransRecord::default()
        };
        stats.byte_count = 150;
        stats.trans_count = 2;
        assert_eq!(stats.take_queued(), (2, 150));
        assert_eq!(stats.take_queued(), (0, 0));

        assert_eq!(stats.tx_complete(&first), (1, 100));
        assert_eq!(stats.tx_complete(&second), (1, 50));
        assert_eq!(stats.compl_byte_count, 150);
        assert_eq!(stats.compl_trans_count, 2);
    }

    #[test]
    fn stats_rx_accounting() {
        let mut stats = ChannelStats::default();
        stats.rx_complete(&TransRecord {
            len: 1500,
            ..TransRecord::default()
        });
        assert_eq!(stats.byte_count, 1500);
        assert_eq!(stats.trans_count, 1);
    }
}
