//! Descriptor-ring backend.
//!
//! Each channel owns a transfer ring of 16-byte elements (TREs) in
//! DMA-coherent memory. Committing a transaction writes one TRE per scatter
//! entry at the ring's write index, chains all but the last, flags the last
//! for an end-of-transfer interrupt, and records which transaction that
//! last TRE belongs to. Hardware reports completion through an event ring;
//! each event names the TRE that finished.
//!
//! Register access is abstracted by [`RingHw`].

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::backend::{Backend, HwCompletion, Submission};
use crate::driver::config::{BackendKind, EndpointConfig};
use crate::driver::error::{DmaError, DmaResult, IoError, Result};
use crate::internal::bits::tre;
use crate::internal::constants::{RING_CHANNEL_COUNT_MAX, TRE_SIZE};
use crate::internal::field;
use crate::pool::DmaRegion;
use crate::trans::ScatterEntry;

/// Attempts made to stop a channel that keeps reporting it is running
const CHANNEL_STOP_RETRIES: u32 = 16;

// =============================================================================
// Hardware Interface
// =============================================================================

/// Channel commands understood by the ring engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelCommand {
    /// Allocate the channel's hardware context
    Allocate,
    /// Start processing TREs
    Start,
    /// Stop processing TREs
    Stop,
    /// Discard outstanding work and return to the allocated state
    Reset,
    /// Free the channel's hardware context
    DeAllocate,
}

impl ChannelCommand {
    /// State hardware should report after the command
    #[must_use]
    pub const fn expected_state(self) -> ChannelHwState {
        match self {
            ChannelCommand::Allocate | ChannelCommand::Reset => ChannelHwState::Allocated,
            ChannelCommand::Start => ChannelHwState::Started,
            ChannelCommand::Stop => ChannelHwState::Stopped,
            ChannelCommand::DeAllocate => ChannelHwState::NotAllocated,
        }
    }
}

/// Channel state reported by the ring engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelHwState {
    /// No hardware context
    #[default]
    NotAllocated,
    /// Context allocated, not running
    Allocated,
    /// Processing TREs
    Started,
    /// Stopped
    Stopped,
    /// Hardware error; reset required
    Error,
}

/// Completion code of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventCode {
    /// End of transfer
    Eot,
    /// End of block
    Eob,
    /// Receive data overflowed the buffer (data truncated, still complete)
    Overflow,
    /// Hardware found a malformed TRE
    BadTre,
}

impl EventCode {
    /// Whether the event reports a hardware error
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, EventCode::BadTre)
    }
}

/// One completion event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RingEvent {
    /// Index of the TRE that completed
    pub tre_index: u32,
    /// Bytes transferred
    pub len: u32,
    /// Completion code
    pub code: EventCode,
}

/// Ring programming parameters for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RingProgram {
    /// Hardware address of the transfer ring
    pub ring_addr: u64,
    /// Number of TREs in the ring
    pub tre_count: u32,
    /// Number of elements in the event ring
    pub event_count: u32,
    /// Whether the doorbell engine is enabled
    pub doorbell: bool,
}

/// Register-level access to the descriptor-ring engine
///
/// Methods take `&self`: register access is inherently shared, and the
/// transport serializes calls per channel.
pub trait RingHw: Sync {
    /// Issue a channel command and report the resulting state
    fn channel_command(&self, channel_id: u8, command: ChannelCommand) -> ChannelHwState;

    /// Program the channel's ring addresses and sizes
    fn channel_program(&self, channel_id: u8, program: RingProgram);

    /// Tell hardware TREs up to (not including) `ring_addr` are ready
    fn ring_doorbell(&self, channel_id: u8, ring_addr: u64);

    /// Index of the next event hardware will write
    fn event_write_index(&self, channel_id: u8) -> u32;

    /// Read the event at `index`
    fn read_event(&self, channel_id: u8, index: u32) -> RingEvent;

    /// Return consumed events up to (not including) `index`
    fn event_doorbell(&self, channel_id: u8, index: u32);

    /// Mask or unmask the channel's end-of-transfer interrupt
    fn irq_enable(&self, channel_id: u8, enable: bool);
}

// =============================================================================
// Transfer Ring Element
// =============================================================================

/// Decoded transfer ring element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Tre {
    /// Buffer hardware address
    pub addr: u64,
    /// Length, or the opcode for immediate commands
    pub len_opcode: u16,
    /// Flags word
    pub flags: u32,
}

impl Tre {
    /// Build the TRE for one scatter entry
    ///
    /// The last TRE of a transaction requests an end-of-transfer interrupt
    /// (with block-event on transmit channels); the others chain.
    #[must_use]
    pub fn new(entry: &ScatterEntry, opcode: Option<u16>, last: bool, bei: bool) -> Self {
        let (len_opcode, kind) = match opcode {
            Some(op) => (op, tre::TYPE_IMMD_CMD),
            None => (entry.len as u16, tre::TYPE_XFER),
        };
        let mut flags = field::prep(u64::from(tre::TYPE_MASK), u64::from(kind)) as u32;
        if last {
            flags |= tre::IEOT;
            if bei {
                flags |= tre::BEI;
            }
        } else {
            flags |= tre::CHAIN;
        }
        Self {
            addr: entry.addr,
            len_opcode,
            flags,
        }
    }

    /// Wire encoding
    #[must_use]
    pub fn encode(&self) -> [u8; TRE_SIZE] {
        let mut out = [0u8; TRE_SIZE];
        out[tre::ADDR_OFFSET..tre::ADDR_OFFSET + 8].copy_from_slice(&self.addr.to_le_bytes());
        out[tre::LEN_OPCODE_OFFSET..tre::LEN_OPCODE_OFFSET + 2]
            .copy_from_slice(&self.len_opcode.to_le_bytes());
        out[tre::FLAGS_OFFSET..tre::FLAGS_OFFSET + 4].copy_from_slice(&self.flags.to_le_bytes());
        out
    }

    /// Decode a wire TRE
    #[must_use]
    pub fn decode(bytes: &[u8; TRE_SIZE]) -> Self {
        let mut addr = [0u8; 8];
        addr.copy_from_slice(&bytes[tre::ADDR_OFFSET..tre::ADDR_OFFSET + 8]);
        let len = [bytes[tre::LEN_OPCODE_OFFSET], bytes[tre::LEN_OPCODE_OFFSET + 1]];
        let mut flags = [0u8; 4];
        flags.copy_from_slice(&bytes[tre::FLAGS_OFFSET..tre::FLAGS_OFFSET + 4]);
        Self {
            addr: u64::from_le_bytes(addr),
            len_opcode: u16::from_le_bytes(len),
            flags: u32::from_le_bytes(flags),
        }
    }

    /// Element type field
    #[must_use]
    pub fn kind(&self) -> u32 {
        field::get(u64::from(tre::TYPE_MASK), u64::from(self.flags)) as u32
    }

    /// Whether more TREs of the same transaction follow
    #[must_use]
    pub fn is_chained(&self) -> bool {
        self.flags & tre::CHAIN != 0
    }

    /// Whether this TRE ends a transaction
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.flags & tre::IEOT != 0
    }
}

// =============================================================================
// Per-Channel State
// =============================================================================

/// Descriptor-ring state of one channel
#[derive(Debug)]
pub struct RingChannel {
    channel_id: u8,
    toward_device: bool,
    tre_count: u32,
    event_count: u32,
    tlv_count: u32,
    ring: DmaRegion,
    /// Next TRE to fill (free-running)
    index: u32,
    /// Transaction whose last TRE sits at each ring index
    map: Vec<Option<u16>>,
    /// Next event to consume
    evt_index: u32,
    hw_state: ChannelHwState,
}

impl RingChannel {
    fn new(endpoint: &EndpointConfig) -> Result<Self> {
        endpoint.ring.validate()?;
        let tre_count = u32::from(endpoint.ring.tre_count);
        let ring = DmaRegion::new(tre_count as usize * TRE_SIZE)?;
        let mut map = Vec::new();
        map.resize(tre_count as usize, None);
        Ok(Self {
            channel_id: endpoint.channel_id,
            toward_device: endpoint.toward_device,
            tre_count,
            event_count: u32::from(endpoint.ring.event_count),
            tlv_count: u32::from(endpoint.ring.tlv_count),
            ring,
            index: 0,
            map,
            evt_index: 0,
            hw_state: ChannelHwState::NotAllocated,
        })
    }

    /// Decoded TRE at a ring index
    #[must_use]
    pub fn tre(&self, index: u32) -> Tre {
        let offset = (index % self.tre_count) as usize * TRE_SIZE;
        let mut bytes = [0u8; TRE_SIZE];
        bytes.copy_from_slice(&self.ring.as_slice()[offset..offset + TRE_SIZE]);
        Tre::decode(&bytes)
    }

    /// Ring index the next TRE will be written to
    #[must_use]
    pub fn write_index(&self) -> u32 {
        self.index % self.tre_count
    }

    /// Hardware address of the transfer ring
    #[must_use]
    pub fn ring_addr(&self) -> u64 {
        self.ring.addr()
    }

    /// Last state hardware reported
    #[must_use]
    pub fn hw_state(&self) -> ChannelHwState {
        self.hw_state
    }

    fn write_tre(&mut self, index: u32, tre: &Tre) {
        let offset = (index % self.tre_count) as usize * TRE_SIZE;
        self.ring.as_mut_slice()[offset..offset + TRE_SIZE].copy_from_slice(&tre.encode());
    }

    fn tre_addr(&self, index: u32) -> u64 {
        self.ring.addr() + u64::from(index % self.tre_count) * TRE_SIZE as u64
    }

    fn program(&self, doorbell: bool) -> RingProgram {
        RingProgram {
            ring_addr: self.ring.addr(),
            tre_count: self.tre_count,
            event_count: self.event_count,
            doorbell,
        }
    }

    fn rewind(&mut self) {
        self.index = 0;
        self.evt_index = 0;
        self.map.fill(None);
        self.ring.as_mut_slice().fill(0);
    }
}

// =============================================================================
// Backend
// =============================================================================

/// Descriptor-ring backend over a [`RingHw`] register interface
#[derive(Debug)]
pub struct RingBackend<H> {
    hw: H,
}

impl<H: RingHw> RingBackend<H> {
    /// Create the backend
    pub const fn new(hw: H) -> Self {
        Self { hw }
    }

    /// Register interface
    pub fn hw(&self) -> &H {
        &self.hw
    }

    fn command(&self, channel: &mut RingChannel, command: ChannelCommand) -> Result<()> {
        let state = self.hw.channel_command(channel.channel_id, command);
        channel.hw_state = state;
        if state == command.expected_state() {
            Ok(())
        } else {
            #[cfg(feature = "log")]
            log::warn!(
                "channel {} {command:?} left it {state:?}",
                channel.channel_id
            );
            Err(IoError::CommandFailed.into())
        }
    }
}

impl<H: RingHw> Backend for RingBackend<H> {
    type Channel = RingChannel;

    fn kind(&self) -> BackendKind {
        BackendKind::Ring
    }

    fn channel_limit(&self) -> usize {
        RING_CHANNEL_COUNT_MAX
    }

    fn channel_init(&self, endpoint: &EndpointConfig) -> Result<RingChannel> {
        RingChannel::new(endpoint)
    }

    fn channel_tre_max(&self, channel: &RingChannel) -> u32 {
        // Leave room so a full TLV FIFO never wraps onto live TREs
        channel.tre_count - (channel.tlv_count - 1)
    }

    fn channel_trans_tre_max(&self, channel: &RingChannel) -> u32 {
        channel.tlv_count
    }

    fn setup(&self, channel: &mut RingChannel) -> Result<()> {
        self.command(channel, ChannelCommand::Allocate)?;
        channel.rewind();
        self.hw.channel_program(channel.channel_id, channel.program(true));
        #[cfg(feature = "defmt")]
        defmt::debug!("ring channel {} allocated", channel.channel_id);
        Ok(())
    }

    fn teardown(&self, channel: &mut RingChannel) {
        self.hw.irq_enable(channel.channel_id, false);
        // Teardown continues regardless; failures are logged by `command`
        let _ = self.command(channel, ChannelCommand::Reset);
        let _ = self.command(channel, ChannelCommand::DeAllocate);
    }

    fn start(&self, channel: &mut RingChannel) -> Result<()> {
        self.command(channel, ChannelCommand::Start)
    }

    fn stop(&self, channel: &mut RingChannel) -> Result<()> {
        let mut result = self.command(channel, ChannelCommand::Stop);
        let mut retries = 1;
        while result.is_err()
            && channel.hw_state == ChannelHwState::Started
            && retries < CHANNEL_STOP_RETRIES
        {
            result = self.command(channel, ChannelCommand::Stop);
            retries += 1;
        }
        result
    }

    fn reset(&self, channel: &mut RingChannel, doorbell: bool) -> Result<()> {
        self.command(channel, ChannelCommand::Reset)?;
        channel.rewind();
        self.hw
            .channel_program(channel.channel_id, channel.program(doorbell));
        Ok(())
    }

    fn suspend(&self, channel: &mut RingChannel, stop: bool) -> Result<()> {
        if stop { self.stop(channel) } else { Ok(()) }
    }

    fn resume(&self, channel: &mut RingChannel, start: bool) -> Result<()> {
        if start { self.start(channel) } else { Ok(()) }
    }

    fn submit(
        &self,
        channel: &mut RingChannel,
        submission: &Submission<'_>,
        doorbell: bool,
    ) -> Result<bool> {
        let count = submission.entries.len() as u32;
        if count == 0 {
            return Ok(false);
        }
        // The length field is 16 bits; check before touching the ring
        let too_long = submission
            .entries
            .iter()
            .enumerate()
            .any(|(i, e)| submission.opcode(i).is_none() && e.len > u32::from(u16::MAX));
        if too_long {
            return Err(DmaError::TransferTooLarge.into());
        }

        for (i, entry) in submission.entries.iter().enumerate() {
            let last = i as u32 + 1 == count;
            let tre = Tre::new(entry, submission.opcode(i), last, channel.toward_device);
            channel.write_tre(channel.index.wrapping_add(i as u32), &tre);
        }
        channel.index = channel.index.wrapping_add(count);

        let last_index = (channel.index.wrapping_sub(1) % channel.tre_count) as usize;
        channel.map[last_index] = Some(submission.slot);

        if doorbell {
            self.hw
                .ring_doorbell(channel.channel_id, channel.tre_addr(channel.index));
        }
        Ok(doorbell)
    }

    fn harvest(
        &self,
        channel: &mut RingChannel,
        _pending: &VecDeque<u16>,
        out: &mut Vec<HwCompletion>,
    ) -> DmaResult<()> {
        let hw_index = self.hw.event_write_index(channel.channel_id) % channel.event_count;
        let mut result = Ok(());

        while channel.evt_index != hw_index {
            let event = self.hw.read_event(channel.channel_id, channel.evt_index);
            channel.evt_index = (channel.evt_index + 1) % channel.event_count;

            if event.code.is_error() {
                #[cfg(feature = "log")]
                log::warn!(
                    "channel {} error event {:?} at TRE {}",
                    channel.channel_id,
                    event.code,
                    event.tre_index
                );
                channel.hw_state = ChannelHwState::Error;
                result = Err(DmaError::ChannelError);
                break;
            }

            let index = (event.tre_index % channel.tre_count) as usize;
            // Events for TREs outside a transaction (single-byte reads) map to nothing
            if let Some(slot) = channel.map[index].take() {
                out.push(HwCompletion {
                    slot,
                    len: Some(event.len),
                });
            }
        }

        self.hw.event_doorbell(channel.channel_id, channel.evt_index);
        result
    }

    fn irq_enable(&self, channel: &mut RingChannel, enable: bool) {
        self.hw.irq_enable(channel.channel_id, enable);
    }

    fn read_byte(&self, channel: &mut RingChannel, addr: u64) -> Result<()> {
        let entry = ScatterEntry { addr, len: 1 };
        let tre = Tre::new(&entry, None, true, false);
        channel.write_tre(channel.index, &tre);
        channel.index = channel.index.wrapping_add(1);
        channel.map[((channel.index.wrapping_sub(1)) % channel.tre_count) as usize] = None;
        self.hw
            .ring_doorbell(channel.channel_id, channel.tre_addr(channel.index));
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::Opcode;
    use crate::driver::config::RingGeometry;
    use crate::testing::MockRingHw;
    use crate::trans::{CmdInfo, TransDirection};

    fn endpoint(toward_device: bool) -> EndpointConfig {
        EndpointConfig::new("ring", 3, 3)
            .with_toward_device(toward_device)
            .with_ring(RingGeometry::new(8, 8, 4))
    }

    fn ready(backend: &RingBackend<MockRingHw>, toward_device: bool) -> RingChannel {
        let mut channel = backend.channel_init(&endpoint(toward_device)).unwrap();
        backend.setup(&mut channel).unwrap();
        channel
    }

    #[test]
    fn tre_flags_for_chained_transaction() {
        let entry = ScatterEntry { addr: 0x1000, len: 64 };
        let middle = Tre::new(&entry, None, false, true);
        assert!(middle.is_chained());
        assert!(!middle.is_last());
        assert_eq!(middle.kind(), tre::TYPE_XFER);
        assert_eq!(middle.len_opcode, 64);

        let last = Tre::new(&entry, None, true, true);
        assert_eq!(last.flags, tre::IEOT | tre::BEI | (tre::TYPE_XFER << 16));
    }

    #[test]
    fn tre_for_command_carries_opcode() {
        let entry = ScatterEntry { addr: 0x2000, len: 16 };
        let tre = Tre::new(&entry, Some(Opcode::RegisterWrite as u16), true, false);
        assert_eq!(tre.len_opcode, Opcode::RegisterWrite as u16);
        assert_eq!(tre.kind(), tre::TYPE_IMMD_CMD);
        assert_eq!(tre.flags & tre::BEI, 0);
    }

    #[test]
    fn tre_wire_layout() {
        let tre = Tre {
            addr: 0x1122_3344_5566_7788,
            len_opcode: 0xabcd,
            flags: 0x0002_0201,
        };
        let bytes = tre.encode();
        assert_eq!(&bytes[0..8], &0x1122_3344_5566_7788u64.to_le_bytes());
        assert_eq!(&bytes[8..10], &[0xcd, 0xab]);
        assert_eq!(&bytes[10..12], &[0, 0]);
        assert_eq!(&bytes[12..16], &0x0002_0201u32.to_le_bytes());
        assert_eq!(Tre::decode(&bytes), tre);
    }

    #[test]
    fn limits_leave_room_for_one_tlv() {
        let backend = RingBackend::new(MockRingHw::new());
        let channel = ready(&backend, true);
        assert_eq!(backend.channel_tre_max(&channel), 5);
        assert_eq!(backend.channel_trans_tre_max(&channel), 4);
    }

    #[test]
    fn submit_writes_tres_and_rings_doorbell() {
        let backend = RingBackend::new(MockRingHw::new());
        let mut channel = ready(&backend, true);
        let entries = [
            ScatterEntry { addr: 0x100, len: 10 },
            ScatterEntry { addr: 0x200, len: 20 },
        ];
        let sub = Submission {
            slot: 5,
            entries: &entries,
            info: None,
        };
        assert!(backend.submit(&mut channel, &sub, true).unwrap());

        assert!(channel.tre(0).is_chained());
        assert!(channel.tre(1).is_last());
        assert_eq!(channel.tre(1).addr, 0x200);
        assert_eq!(channel.write_index(), 2);
        assert_eq!(
            backend.hw().doorbells(3),
            [channel.ring_addr() + 2 * TRE_SIZE as u64]
        );
    }

    #[test]
    fn submit_without_doorbell_defers() {
        let backend = RingBackend::new(MockRingHw::new());
        let mut channel = ready(&backend, true);
        let entries = [ScatterEntry { addr: 0x100, len: 10 }];
        let sub = Submission {
            slot: 0,
            entries: &entries,
            info: None,
        };
        assert!(!backend.submit(&mut channel, &sub, false).unwrap());
        assert!(backend.hw().doorbells(3).is_empty());
    }

    #[test]
    fn submit_rejects_oversized_entry() {
        let backend = RingBackend::new(MockRingHw::new());
        let mut channel = ready(&backend, true);
        let entries = [ScatterEntry { addr: 0x100, len: 0x1_0000 }];
        let sub = Submission {
            slot: 0,
            entries: &entries,
            info: None,
        };
        assert!(backend.submit(&mut channel, &sub, true).is_err());
        assert_eq!(channel.write_index(), 0);
    }

    #[test]
    fn submit_command_entries() {
        let backend = RingBackend::new(MockRingHw::new());
        let mut channel = ready(&backend, true);
        let entries = [ScatterEntry { addr: 0x100, len: 16 }];
        let info = [CmdInfo::new(Opcode::IpPacketInit, TransDirection::None)];
        let sub = Submission {
            slot: 0,
            entries: &entries,
            info: Some(&info),
        };
        backend.submit(&mut channel, &sub, true).unwrap();
        assert_eq!(channel.tre(0).len_opcode, Opcode::IpPacketInit as u16);
    }

    #[test]
    fn harvest_maps_events_to_transactions() {
        let backend = RingBackend::new(MockRingHw::new());
        let mut channel = ready(&backend, false);
        let entries = [ScatterEntry { addr: 0x100, len: 2048 }];
        for slot in 0..2 {
            let sub = Submission {
                slot,
                entries: &entries,
                info: None,
            };
            backend.submit(&mut channel, &sub, true).unwrap();
        }

        backend.hw().push_event(3, 0, 100, EventCode::Eot);
        backend.hw().push_event(3, 1, 200, EventCode::Eot);

        let mut out = Vec::new();
        backend
            .harvest(&mut channel, &VecDeque::new(), &mut out)
            .unwrap();
        assert_eq!(
            out,
            [
                HwCompletion { slot: 0, len: Some(100) },
                HwCompletion { slot: 1, len: Some(200) },
            ]
        );
        assert_eq!(backend.hw().event_doorbells(3).last(), Some(&2));
    }

    #[test]
    fn harvest_stops_at_error_event() {
        let backend = RingBackend::new(MockRingHw::new());
        let mut channel = ready(&backend, false);
        let entries = [ScatterEntry { addr: 0x100, len: 64 }];
        for slot in 0..2 {
            let sub = Submission {
                slot,
                entries: &entries,
                info: None,
            };
            backend.submit(&mut channel, &sub, true).unwrap();
        }
        backend.hw().push_event(3, 0, 64, EventCode::Eot);
        backend.hw().push_event(3, 1, 0, EventCode::BadTre);

        let mut out = Vec::new();
        let result = backend.harvest(&mut channel, &VecDeque::new(), &mut out);
        assert_eq!(result, Err(DmaError::ChannelError));
        assert_eq!(out.len(), 1);
        assert_eq!(channel.hw_state(), ChannelHwState::Error);
    }

    #[test]
    fn stop_retries_while_running() {
        let backend = RingBackend::new(MockRingHw::new());
        let mut channel = ready(&backend, true);
        backend.start(&mut channel).unwrap();
        backend.hw().refuse_stop(3, 2);
        assert!(backend.stop(&mut channel).is_ok());
        assert_eq!(channel.hw_state(), ChannelHwState::Stopped);
    }

    #[test]
    fn reset_rewinds_ring() {
        let backend = RingBackend::new(MockRingHw::new());
        let mut channel = ready(&backend, true);
        let entries = [ScatterEntry { addr: 0x100, len: 64 }];
        let sub = Submission {
            slot: 0,
            entries: &entries,
            info: None,
        };
        backend.submit(&mut channel, &sub, true).unwrap();
        backend.reset(&mut channel, true).unwrap();
        assert_eq!(channel.write_index(), 0);
        assert_eq!(channel.tre(0), Tre::default());
    }

    #[test]
    fn read_byte_uses_one_unmapped_tre() {
        let backend = RingBackend::new(MockRingHw::new());
        let mut channel = ready(&backend, false);
        backend.read_byte(&mut channel, 0xdead_0000).unwrap();
        assert_eq!(channel.tre(0).len_opcode, 1);
        assert_eq!(channel.write_index(), 1);

        backend.hw().push_event(3, 0, 1, EventCode::Eot);
        let mut out = Vec::new();
        backend
            .harvest(&mut channel, &VecDeque::new(), &mut out)
            .unwrap();
        assert!(out.is_empty());
    }
}
