//! The transport context.
//!
//! [`Transport`] owns the backend, the channel array and the event sink, and
//! exposes the uniform surface both backends share:
//!
//! - Bring-up and shutdown ([`setup`](Transport::setup),
//!   [`teardown`](Transport::teardown), [`exit`](Transport::exit))
//! - Channel control (start, stop, reset, suspend, resume)
//! - Transaction allocation, commit and release
//! - The budgeted completion harvester ([`poll`](Transport::poll))
//!
//! There are no globals: every operation goes through a `&Transport`, and a
//! transport shared across threads by reference is safe to use from all of
//! them as long as its backend and event sink are `Sync`.

use alloc::vec::Vec;
use core::sync::atomic::Ordering;

use embedded_hal::delay::DelayNs;

use crate::backend::{Backend, Submission};
use crate::channel::{Channel, ChannelState, ChannelStats, QueueDepths, TransInfo};
use crate::cmd::{self, Opcode, tag_process_count};
use crate::driver::config::{MemoryLayout, ProtocolVersion, TransportConfig};
use crate::driver::error::{ConfigError, DmaError, DmaResult, Error, IoError, Result};
use crate::events::{NoEvents, TransportEvents};
use crate::internal::constants::{CHANNEL_COUNT_MAX, WAIT_POLL_INTERVAL_US};
use crate::sync::CriticalSectionCell;
use crate::trans::{CmdInfo, DmaBuf, ScatterEntry, Trans, TransDirection};

/// Bring-up state guarded by the coarse transport lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    /// Channels created, hardware not yet set up
    Initialized,
    /// Hardware set up; channels may be started
    Ready,
}

// =============================================================================
// Transport
// =============================================================================

/// Accelerator transport
///
/// # Type Parameters
/// * `B` - Hardware backend ([`RingBackend`](crate::backend::ring::RingBackend)
///   or [`EngineBackend`](crate::backend::engine::EngineBackend))
/// * `E` - Event sink receiving completion and accounting hooks
///
/// # Example
/// ```ignore
/// let transport = Transport::new(RingBackend::new(hw), &config, NoEvents)?;
/// transport.setup()?;
/// transport.channel_start(3)?;
///
/// let mut trans = transport.cmd_trans_alloc(1)?;
/// trans.ip_packet_init_add(2)?;
/// trans.commit_wait(&mut delay)?;
/// ```
pub struct Transport<B: Backend, E: TransportEvents = NoEvents> {
    backend: B,
    events: E,
    version: ProtocolVersion,
    lan_rx_endpoint: u8,
    memory: Option<MemoryLayout>,
    channels: Vec<Option<Channel<B::Channel>>>,
    command_channel: Option<u8>,
    lifecycle: CriticalSectionCell<Lifecycle>,
}

impl<B: Backend, E: TransportEvents> Transport<B, E> {
    // =========================================================================
    // Construction
    // =========================================================================

    /// Build a transport from an endpoint table
    ///
    /// Validates the configuration against the backend, checks the command
    /// memory layout when one is given, and creates every active channel with
    /// its pools. Hardware is not touched until [`setup`](Self::setup).
    pub fn new(backend: B, config: &TransportConfig, events: E) -> Result<Self> {
        if config.version.backend() != backend.kind() {
            return Err(ConfigError::BackendMismatch.into());
        }
        config.validate(backend.channel_limit())?;
        if let Some(memory) = &config.memory {
            cmd::validate::memory_valid(config.version, memory)?;
        }

        let mut channels = Vec::new();
        channels.resize_with(CHANNEL_COUNT_MAX, || None);
        let mut command_channel = None;

        for endpoint in config.active_endpoints() {
            let hw = backend.channel_init(endpoint)?;
            let tre_max = backend.channel_tre_max(&hw);
            let trans_tre_max = backend.channel_trans_tre_max(&hw);
            let channel = Channel::new(*endpoint, tre_max, trans_tre_max, hw)?;
            if endpoint.command {
                command_channel = Some(endpoint.channel_id);
            }
            #[cfg(feature = "defmt")]
            defmt::debug!(
                "channel {} ({}) tre_max {} trans_tre_max {}",
                endpoint.channel_id,
                endpoint.name,
                tre_max,
                trans_tre_max
            );
            channels[usize::from(endpoint.channel_id)] = Some(channel);
        }

        #[cfg(feature = "defmt")]
        defmt::info!(
            "transport {} initialized, command channel {}",
            config.version,
            command_channel
        );

        Ok(Self {
            backend,
            events,
            version: config.version,
            lan_rx_endpoint: config.lan_rx_endpoint,
            memory: config.memory.clone(),
            channels,
            command_channel,
            lifecycle: CriticalSectionCell::new(Lifecycle::Initialized),
        })
    }

    // =========================================================================
    // State Queries
    // =========================================================================

    /// Protocol version
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Endpoint receiving tag-process packets
    pub fn lan_rx_endpoint(&self) -> u8 {
        self.lan_rx_endpoint
    }

    /// Global offset added to every local-memory address in commands
    pub fn mem_offset(&self) -> u32 {
        self.memory.as_ref().map_or(0, |m| m.mem_offset)
    }

    /// Channel carrying immediate commands, if configured
    pub fn command_channel(&self) -> Option<u8> {
        self.command_channel
    }

    /// Whether [`setup`](Self::setup) has completed
    pub fn is_set_up(&self) -> bool {
        self.lifecycle.with_ref(|state| *state == Lifecycle::Ready)
    }

    /// Hardware backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Event sink
    pub fn events(&self) -> &E {
        &self.events
    }

    /// Ids of all configured channels, ascending
    pub fn channel_ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.channels.iter().flatten().map(|channel| channel.id())
    }

    pub(crate) fn channel(&self, channel_id: u8) -> Result<&Channel<B::Channel>> {
        self.channels
            .get(usize::from(channel_id))
            .and_then(Option::as_ref)
            .ok_or_else(|| ConfigError::InvalidChannel.into())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Set up every channel's hardware and enable completion signalling
    ///
    /// If any channel fails, those already set up are torn down again and
    /// the transport stays initialized.
    pub fn setup(&self) -> Result<()> {
        self.lifecycle.with(|state| -> Result<()> {
            if *state == Lifecycle::Ready {
                return Err(ConfigError::AlreadySetUp.into());
            }

            let mut done = Vec::new();
            for channel in self.channels.iter().flatten() {
                let result = channel.state.with(|st| self.backend.setup(&mut st.hw));
                if let Err(e) = result {
                    #[cfg(feature = "log")]
                    log::warn!("channel {} setup failed: {e}", channel.id());
                    for undo in done {
                        self.channel_teardown(undo);
                    }
                    return Err(e);
                }
                done.push(channel);
            }

            for channel in self.channels.iter().flatten() {
                channel.poll.enable();
                channel
                    .state
                    .with(|st| self.backend.irq_enable(&mut st.hw, true));
            }
            *state = Lifecycle::Ready;

            #[cfg(feature = "defmt")]
            defmt::info!("transport set up");
            Ok(())
        })
    }

    /// Undo [`setup`](Self::setup)
    pub fn teardown(&self) -> Result<()> {
        self.lifecycle.with(|state| -> Result<()> {
            if *state != Lifecycle::Ready {
                return Err(ConfigError::NotSetUp.into());
            }
            for channel in self.channels.iter().flatten() {
                self.channel_teardown(channel);
            }
            *state = Lifecycle::Initialized;
            Ok(())
        })
    }

    fn channel_teardown(&self, channel: &Channel<B::Channel>) {
        channel.poll.disable();
        channel.state.with(|st| {
            self.backend.irq_enable(&mut st.hw, false);
            self.backend.teardown(&mut st.hw);
        });
    }

    /// Tear down if needed and release every channel's hardware resources
    pub fn exit(self) {
        if self.is_set_up() {
            // Only fails when not set up, which was just checked
            let _ = self.teardown();
        }
        for channel in self.channels.iter().flatten() {
            channel.state.with(|st| self.backend.exit(&mut st.hw));
        }
        #[cfg(feature = "defmt")]
        defmt::info!("transport exited");
    }

    // =========================================================================
    // Channel Control
    // =========================================================================

    /// Run a channel operation under the coarse lock once set up
    fn with_ready_channel<R>(
        &self,
        channel_id: u8,
        f: impl FnOnce(&Channel<B::Channel>) -> Result<R>,
    ) -> Result<R> {
        let channel = self.channel(channel_id)?;
        self.lifecycle.with(|state| match state {
            Lifecycle::Ready => f(channel),
            Lifecycle::Initialized => Err(ConfigError::NotSetUp.into()),
        })
    }

    /// Start a channel
    pub fn channel_start(&self, channel_id: u8) -> Result<()> {
        self.with_ready_channel(channel_id, |channel| {
            channel.state.with(|st| self.backend.start(&mut st.hw))
        })
    }

    /// Stop a channel
    pub fn channel_stop(&self, channel_id: u8) -> Result<()> {
        self.with_ready_channel(channel_id, |channel| {
            channel.state.with(|st| self.backend.stop(&mut st.hw))
        })
    }

    /// Reset a channel
    ///
    /// Hardware discards outstanding work. Every pending transaction is
    /// marked cancelled and moved to the complete queue, and the harvester
    /// is scheduled to finalize them. Outstanding single-byte reads are
    /// dropped and their TREs returned. The error state is cleared.
    pub fn channel_reset(&self, channel_id: u8, doorbell: bool) -> Result<()> {
        self.with_ready_channel(channel_id, |channel| {
            let (cancelled, byte_reads) = channel.state.with(|st| -> Result<(usize, u32)> {
                self.backend.reset(&mut st.hw, doorbell)?;
                Ok((st.info.cancel_pending(), core::mem::take(&mut st.byte_reads)))
            })?;
            channel.tre_release(byte_reads);
            channel.set_error(false);
            #[cfg(feature = "log")]
            log::debug!("channel {channel_id} reset, {cancelled} pending cancelled");
            #[cfg(not(feature = "log"))]
            let _ = cancelled;
            self.schedule_poll(channel);
            Ok(())
        })
    }

    /// Quiesce a channel, stopping it if `stop` is set
    ///
    /// The harvester is disabled and the completion interrupt masked until
    /// [`channel_resume`](Self::channel_resume).
    pub fn channel_suspend(&self, channel_id: u8, stop: bool) -> Result<()> {
        self.with_ready_channel(channel_id, |channel| {
            channel.poll.disable();
            channel.state.with(|st| {
                self.backend.irq_enable(&mut st.hw, false);
                self.backend.suspend(&mut st.hw, stop)
            })
        })
    }

    /// Resume a suspended channel, starting it if `start` is set
    pub fn channel_resume(&self, channel_id: u8, start: bool) -> Result<()> {
        self.with_ready_channel(channel_id, |channel| {
            channel
                .state
                .with(|st| self.backend.resume(&mut st.hw, start))?;
            channel.poll.enable();
            channel
                .state
                .with(|st| self.backend.irq_enable(&mut st.hw, true));
            Ok(())
        })
    }

    /// Most TREs that may be outstanding on a channel
    pub fn channel_tre_max(&self, channel_id: u8) -> Result<u32> {
        Ok(self.channel(channel_id)?.tre_max)
    }

    /// Most TREs one transaction on a channel may use
    pub fn channel_trans_tre_max(&self, channel_id: u8) -> Result<u32> {
        Ok(self.channel(channel_id)?.trans_tre_max)
    }

    /// TREs currently unreserved on a channel
    pub fn channel_tre_avail(&self, channel_id: u8) -> Result<u32> {
        Ok(self.channel(channel_id)?.tre_avail())
    }

    /// Whether a channel is in a hardware error state
    pub fn channel_has_error(&self, channel_id: u8) -> Result<bool> {
        Ok(self.channel(channel_id)?.has_error())
    }

    // =========================================================================
    // Transaction Allocation
    // =========================================================================

    /// Allocate a transaction of up to `tre_count` elements on a channel
    ///
    /// Fails with [`DmaError::NoTresAvailable`] when the channel's TRE budget
    /// is exhausted; callers back off until completions return budget.
    pub fn trans_alloc(
        &self,
        channel_id: u8,
        tre_count: u32,
        direction: TransDirection,
    ) -> Result<Trans<'_, B, E>> {
        let channel = self.channel(channel_id)?;
        if tre_count == 0 {
            return Err(DmaError::InvalidPoolRequest.into());
        }
        if tre_count > channel.trans_tre_max {
            return Err(DmaError::TransferTooLarge.into());
        }
        if channel.has_error() {
            return Err(DmaError::ChannelError.into());
        }
        if !channel.tre_reserve(tre_count) {
            #[cfg(feature = "log")]
            log::debug!(
                "channel {channel_id} out of TREs ({tre_count} requested, {} free)",
                channel.tre_avail()
            );
            return Err(DmaError::NoTresAvailable.into());
        }

        let slot = match channel
            .state
            .with(|st| st.info.alloc(tre_count, direction))
        {
            Ok(slot) => slot,
            Err(e) => {
                channel.tre_release(tre_count);
                return Err(e.into());
            }
        };

        let sync = channel.trans_sync(slot);
        sync.completion.reset();
        sync.refcount.store(1, Ordering::Release);
        Ok(Trans::new(self, channel, slot))
    }

    /// Allocate a transaction on the command channel
    pub fn cmd_trans_alloc(&self, tre_count: u32) -> Result<Trans<'_, B, E>> {
        let channel_id = self
            .command_channel
            .ok_or(ConfigError::NoCommandChannel)?;
        self.trans_alloc(channel_id, tre_count, TransDirection::None)
    }

    // =========================================================================
    // Transaction Filling
    // =========================================================================

    /// Append scatter entries (and command info for the single-entry case)
    pub(crate) fn trans_push(
        &self,
        channel: &Channel<B::Channel>,
        slot: u16,
        bufs: &[DmaBuf],
        info: Option<CmdInfo>,
    ) -> DmaResult<()> {
        channel.state.with(|st| -> DmaResult<()> {
            let TransInfo {
                table,
                sg_pool,
                cmd,
                ..
            } = &mut st.info;
            let rec = table.get_mut(slot);
            let count = bufs.len() as u32;
            if rec.used + count > rec.tre_count {
                return Err(DmaError::TransferTooLarge);
            }
            let start = rec.used as usize;

            if let Some(info) = info {
                let (Some(cmd), Some(span)) = (cmd.as_mut(), rec.info) else {
                    return Err(DmaError::InvalidPoolRequest);
                };
                cmd.info.slice_mut(span)[start] = info;
            }

            let entries = &mut sg_pool.slice_mut(rec.sg)[start..start + bufs.len()];
            let mut len = 0u32;
            for (entry, buf) in entries.iter_mut().zip(bufs) {
                *entry = ScatterEntry {
                    addr: buf.addr,
                    len: buf.len,
                };
                len = len.saturating_add(buf.len);
            }
            rec.used += count;
            rec.len = rec.len.saturating_add(len);
            Ok(())
        })
    }

    /// Copy an encoded command into a payload buffer and append it
    pub(crate) fn trans_cmd_payload_add(
        &self,
        channel: &Channel<B::Channel>,
        slot: u16,
        payload: &[u8],
        opcode: Opcode,
        opcode_flags: u16,
        direction: TransDirection,
    ) -> Result<()> {
        channel.state.with(|st| -> Result<()> {
            let TransInfo {
                table,
                sg_pool,
                cmd,
                ..
            } = &mut st.info;
            let cmd = cmd.as_mut().ok_or(ConfigError::NoCommandChannel)?;
            let rec = table.get_mut(slot);
            if rec.used >= rec.tre_count {
                return Err(DmaError::TransferTooLarge.into());
            }
            let span = rec.info.ok_or(ConfigError::NoCommandChannel)?;
            if payload.len() > cmd.payloads.element_size() {
                return Err(DmaError::TransferTooLarge.into());
            }

            let dma = cmd.payloads.alloc_dma()?;
            cmd.payloads.payload_mut(dma.index)[..payload.len()].copy_from_slice(payload);

            let index = rec.used as usize;
            let len = payload.len() as u32;
            sg_pool.slice_mut(rec.sg)[index] = ScatterEntry {
                addr: dma.addr,
                len,
            };
            cmd.info.slice_mut(span)[index] = CmdInfo {
                opcode,
                direction,
                opcode_flags,
                payload: Some(dma.index),
            };
            rec.used += 1;
            rec.len += len;
            Ok(())
        })
    }

    // =========================================================================
    // Commit
    // =========================================================================

    fn trans_used(channel: &Channel<B::Channel>, slot: u16) -> u32 {
        channel.state.with_ref(|st| st.info.table.get(slot).used)
    }

    /// Submit a filled transaction; consumes the owner's reference
    pub(crate) fn trans_commit(
        &self,
        channel: &Channel<B::Channel>,
        slot: u16,
        ring_db: bool,
    ) -> Result<()> {
        if Self::trans_used(channel, slot) == 0 {
            self.trans_free(channel, slot);
            return Ok(());
        }
        if channel.has_error() {
            self.trans_free(channel, slot);
            return Err(DmaError::ChannelError.into());
        }

        let toward_device = channel.toward_device();
        let doorbell = ring_db || channel.tre_avail() == 0;

        let result = channel.state.with(|st| -> Result<Option<(u32, u32)>> {
            let ChannelState {
                info, stats, hw, ..
            } = st;
            let rec = *info.table.get(slot);
            let used = rec.used as usize;
            let submission = Submission {
                slot,
                entries: &info.sg_pool.slice(rec.sg)[..used],
                info: info
                    .cmd
                    .as_ref()
                    .zip(rec.info)
                    .map(|(cmd, span)| &cmd.info.slice(span)[..used]),
            };
            let rung = self.backend.submit(hw, &submission, doorbell)?;

            if toward_device {
                let rec = info.table.get_mut(slot);
                rec.byte_count = stats.byte_count;
                rec.trans_count = stats.trans_count;
                stats.byte_count += u64::from(rec.len);
                stats.trans_count += 1;
            }
            info.move_pending(slot);

            Ok((toward_device && rung).then(|| stats.take_queued()))
        });

        match result {
            Ok(queued) => {
                if let Some((trans_count, byte_count)) = queued {
                    self.events
                        .tx_queued(channel.id(), trans_count, byte_count);
                }
                Ok(())
            }
            Err(e) => {
                #[cfg(feature = "log")]
                log::warn!("channel {} commit failed: {e}", channel.id());
                // The backend lost in-flight work; only a reset recovers it
                if e == Error::Dma(DmaError::ChannelError) {
                    self.channel_failed(channel, DmaError::ChannelError);
                }
                self.trans_free(channel, slot);
                Err(e)
            }
        }
    }

    /// Take a waiter reference and commit with doorbell
    ///
    /// Returns false if the transaction was empty and has been freed. On
    /// success the caller owns the waiter reference and must free it.
    pub(crate) fn trans_commit_hold(
        &self,
        channel: &Channel<B::Channel>,
        slot: u16,
    ) -> Result<bool> {
        if Self::trans_used(channel, slot) == 0 {
            self.trans_free(channel, slot);
            return Ok(false);
        }
        channel.trans_sync(slot).get();
        if let Err(e) = self.trans_commit(channel, slot, true) {
            self.trans_free(channel, slot);
            return Err(e);
        }
        Ok(true)
    }

    /// Commit, then block until completion or timeout
    pub(crate) fn trans_commit_wait<D: DelayNs>(
        &self,
        channel: &Channel<B::Channel>,
        slot: u16,
        timeout_ms: Option<u32>,
        delay: &mut D,
    ) -> Result<()> {
        if !self.trans_commit_hold(channel, slot)? {
            return Ok(());
        }

        let completion = &channel.trans_sync(slot).completion;
        let mut remaining_us = timeout_ms.map(|ms| u64::from(ms) * 1000);
        let result = loop {
            if completion.is_complete() {
                break Ok(());
            }
            if let Some(remaining) = remaining_us.as_mut() {
                if *remaining == 0 {
                    #[cfg(feature = "log")]
                    log::warn!(
                        "channel {} transaction {slot} timed out after {} ms",
                        channel.id(),
                        timeout_ms.unwrap_or_default()
                    );
                    break Err(IoError::Timeout.into());
                }
                *remaining = remaining.saturating_sub(u64::from(WAIT_POLL_INTERVAL_US));
            }
            delay.delay_us(WAIT_POLL_INTERVAL_US);
        };

        self.trans_free(channel, slot);
        result
    }

    // =========================================================================
    // Release
    // =========================================================================

    /// Drop one reference; the holder of the last one releases the transaction
    pub(crate) fn trans_free(&self, channel: &Channel<B::Channel>, slot: u16) {
        let sync = channel.trans_sync(slot);
        if sync.put_unless_last() {
            return;
        }

        let released = channel.state.with(|st| {
            // Decided under the lock so only one holder can reach zero
            if sync.refcount.fetch_sub(1, Ordering::AcqRel) != 1 {
                return None;
            }
            let rec = st.info.release(slot);
            Some((rec.view(channel.id(), slot), rec.tre_count))
        });

        if let Some((view, tre_count)) = released {
            self.events.trans_release(&view);
            channel.tre_release(tre_count);
        }
    }

    // =========================================================================
    // Completion Harvester
    // =========================================================================

    /// Hardware-completion signal for a channel
    ///
    /// Schedules the harvester and masks the channel's interrupt. Returns
    /// whether this call scheduled it.
    pub fn channel_irq(&self, channel_id: u8) -> Result<bool> {
        let channel = self.channel(channel_id)?;
        Ok(self.schedule_poll(channel))
    }

    fn schedule_poll(&self, channel: &Channel<B::Channel>) -> bool {
        let scheduled = channel.poll.schedule();
        if scheduled {
            channel
                .state
                .with(|st| self.backend.irq_enable(&mut st.hw, false));
        }
        scheduled
    }

    /// Whether the harvester is scheduled for a channel
    pub fn poll_scheduled(&self, channel_id: u8) -> Result<bool> {
        Ok(self.channel(channel_id)?.poll.is_scheduled())
    }

    /// Finalize up to `budget` completed transactions on a channel
    ///
    /// Returns how many were processed. When fewer than `budget` were found
    /// the harvester is done: its scheduled flag is cleared and the
    /// completion interrupt re-armed. Otherwise it stays scheduled and the
    /// caller should poll again.
    pub fn poll(&self, channel_id: u8, budget: usize) -> Result<usize> {
        let channel = self.channel(channel_id)?;
        let mut count = 0;
        while count < budget {
            let Some(slot) = self.poll_one(channel) else {
                break;
            };
            self.trans_complete(channel, slot);
            count += 1;
        }

        if count < budget && channel.poll.complete() {
            channel
                .state
                .with(|st| self.backend.irq_enable(&mut st.hw, true));
        }
        Ok(count)
    }

    /// Take the oldest completed transaction, harvesting hardware if none
    fn poll_one(&self, channel: &Channel<B::Channel>) -> Option<u16> {
        let (slot, error) = channel.state.with(|st| {
            if let Some(slot) = st.info.move_polled() {
                return (Some(slot), None);
            }
            if channel.has_error() {
                return (None, None);
            }

            let ChannelState {
                info,
                completions,
                hw,
                ..
            } = st;
            completions.clear();
            let harvested = self.backend.harvest(hw, &info.pending, completions);
            info.apply_completions(completions, channel.toward_device());
            (info.move_polled(), harvested.err())
        });

        if let Some(error) = error {
            self.channel_failed(channel, error);
        }
        slot
    }

    /// Put a channel in the error state until it is reset
    fn channel_failed(&self, channel: &Channel<B::Channel>, error: DmaError) {
        channel.set_error(true);
        #[cfg(feature = "log")]
        log::warn!("channel {} hardware error: {error}", channel.id());
        self.events.channel_error(channel.id(), error);
    }

    /// Finalize a polled transaction and drop the harvester's reference
    fn trans_complete(&self, channel: &Channel<B::Channel>, slot: u16) {
        let (view, tx_completed) = channel.state.with(|st| {
            let rec = *st.info.table.get(slot);
            // Cancelled receives carried no data
            let tx_completed = if channel.toward_device() {
                Some(st.stats.tx_complete(&rec))
            } else if rec.cancelled {
                None
            } else {
                st.stats.rx_complete(&rec);
                None
            };
            (rec.view(channel.id(), slot), tx_completed)
        });

        if let Some((trans_count, byte_count)) = tx_completed {
            self.events
                .tx_completed(channel.id(), trans_count, byte_count);
        }
        self.events.trans_complete(&view);
        channel.trans_sync(slot).completion.complete();
        self.trans_free(channel, slot);
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Number of transactions on each queue of a channel
    pub fn queue_depths(&self, channel_id: u8) -> Result<QueueDepths> {
        let channel = self.channel(channel_id)?;
        Ok(channel.state.with_ref(|st| st.info.depths()))
    }

    /// Traffic counters of a channel
    pub fn channel_stats(&self, channel_id: u8) -> Result<ChannelStats> {
        let channel = self.channel(channel_id)?;
        Ok(channel.state.with_ref(|st| st.stats))
    }

    /// Run `f` against a channel's backend state
    pub fn inspect_channel<R>(
        &self,
        channel_id: u8,
        f: impl FnOnce(&B::Channel) -> R,
    ) -> Result<R> {
        let channel = self.channel(channel_id)?;
        Ok(channel.state.with_ref(|st| f(&st.hw)))
    }

    // =========================================================================
    // Single-Byte Reads
    // =========================================================================

    /// Issue a one-byte read into `addr` outside any transaction
    ///
    /// Holds one TRE of the channel's budget until
    /// [`read_byte_done`](Self::read_byte_done).
    pub fn read_byte(&self, channel_id: u8, addr: u64) -> Result<()> {
        let channel = self.channel(channel_id)?;
        if channel.has_error() {
            return Err(DmaError::ChannelError.into());
        }
        if !channel.tre_reserve(1) {
            return Err(DmaError::NoTresAvailable.into());
        }
        let result = channel.state.with(|st| -> Result<()> {
            self.backend.read_byte(&mut st.hw, addr)?;
            st.byte_reads += 1;
            Ok(())
        });
        if result.is_err() {
            channel.tre_release(1);
        }
        result
    }

    /// Retire the oldest outstanding one-byte read
    pub fn read_byte_done(&self, channel_id: u8) -> Result<()> {
        let channel = self.channel(channel_id)?;
        let retired = channel.state.with(|st| {
            if st.byte_reads == 0 {
                return false;
            }
            st.byte_reads -= 1;
            true
        });
        if !retired {
            return Err(IoError::InvalidState.into());
        }
        channel.tre_release(1);
        Ok(())
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Run the tag process and wait for it to complete
    ///
    /// Clears the processing pipeline and sends a tagged packet to the LAN
    /// receive endpoint, so every command submitted before it has taken
    /// effect once it returns.
    pub fn tag_process<D: DelayNs>(&self, delay: &mut D) -> Result<()> {
        let mut trans = match self.cmd_trans_alloc(tag_process_count()) {
            Ok(trans) => trans,
            Err(e) => {
                #[cfg(feature = "log")]
                log::warn!("tag process allocation failed: {e}");
                return Err(e);
            }
        };
        trans.tag_process_add()?;
        trans.commit_wait(delay)
    }
}

impl<B: Backend, E: TransportEvents> core::fmt::Debug for Transport<B, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Transport")
            .field("version", &self.version)
            .field("command_channel", &self.command_channel)
            .field("set_up", &self.is_set_up())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
