//! Immediate commands.
//!
//! Commands are small payloads sent on the command channel. Each one is
//! encoded into a buffer drawn from the channel's DMA payload pool and added
//! to a transaction as a single element whose opcode tells the hardware how
//! to read it.
//!
//! ```ignore
//! let mut trans = transport.cmd_trans_alloc(2)?;
//! trans.register_write_add(0x90, 1, 1, true)?;
//! trans.ip_packet_init_add(lan_rx)?;
//! trans.commit_wait(&mut delay)?;
//! ```

pub mod layout;
pub mod validate;

pub use layout::{DmaSharedMem, HdrInitLocal, RegisterWrite, TableInit};

use crate::backend::Backend;
use crate::driver::config::WireLayout;
use crate::driver::error::{ConfigError, Result};
use crate::events::TransportEvents;
use crate::internal::constants::{
    CMD_PAYLOAD_SIZE, TAG_COOKIE_V2, TAG_COOKIE_V3, TAG_PROCESS_COUNT, TAG_PROCESS_TRANSFER_SIZE,
};
use crate::trans::{Trans, TransDirection};

/// Immediate-command opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    /// Plain data transfer
    #[default]
    None = 0,
    /// IPv4 filter table init
    IpV4FilterInit = 3,
    /// IPv6 filter table init
    IpV6FilterInit = 4,
    /// IPv4 routing table init
    IpV4RoutingInit = 7,
    /// IPv6 routing table init
    IpV6RoutingInit = 8,
    /// Header table init in local memory
    HdrInitLocal = 9,
    /// Masked register write
    RegisterWrite = 12,
    /// Skip processing of the next packet and send it to an endpoint
    IpPacketInit = 16,
    /// Copy to or from accelerator-local memory
    DmaSharedMem = 19,
    /// Emit a status packet carrying a tag
    IpPacketTagStatus = 20,
}

impl Opcode {
    /// Whether this opcode initializes a filter or routing table
    #[must_use]
    pub const fn is_table_init(self) -> bool {
        matches!(
            self,
            Opcode::IpV4FilterInit
                | Opcode::IpV6FilterInit
                | Opcode::IpV4RoutingInit
                | Opcode::IpV6RoutingInit
        )
    }

    /// Whether this opcode targets an IPv6 table
    #[must_use]
    pub const fn is_ipv6(self) -> bool {
        matches!(self, Opcode::IpV6FilterInit | Opcode::IpV6RoutingInit)
    }
}

/// Pipeline clear performed before a register write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ClearOption {
    /// Wait for the packet-processing stages to drain
    #[default]
    Hps = 0,
    /// Wait for the source group to drain
    SrcGrp = 1,
    /// Wait for the full pipeline to drain
    Full = 2,
}

impl ClearOption {
    /// Decode the two-bit field; the reserved value reads as [`Full`](Self::Full)
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        match bits & 0x3 {
            0 => ClearOption::Hps,
            1 => ClearOption::SrcGrp,
            _ => ClearOption::Full,
        }
    }
}

/// Number of elements [`Trans::tag_process_add`] appends
#[must_use]
pub const fn tag_process_count() -> u32 {
    TAG_PROCESS_COUNT
}

fn local_offset(mem_offset: u32, offset: u32) -> Result<u32> {
    mem_offset
        .checked_add(offset)
        .ok_or_else(|| ConfigError::FieldOverflow.into())
}

// =============================================================================
// Encoders
// =============================================================================

impl<B: Backend, E: TransportEvents> Trans<'_, B, E> {
    fn push_payload(
        &mut self,
        payload: &[u8],
        opcode: Opcode,
        opcode_flags: u16,
        direction: TransDirection,
    ) -> Result<()> {
        self.transport.trans_cmd_payload_add(
            self.channel,
            self.slot,
            payload,
            opcode,
            opcode_flags,
            direction,
        )
    }

    fn layout(&self) -> WireLayout {
        self.transport.version().layout()
    }

    /// Append a filter or routing table init command
    ///
    /// `opcode` selects the table; offsets in `table` are relative to the
    /// configured memory offset.
    pub fn table_init_add(&mut self, opcode: Opcode, table: TableInit) -> Result<()> {
        if !opcode.is_table_init() {
            return Err(ConfigError::InvalidConfig.into());
        }
        let mem_offset = self.transport.mem_offset();
        let cmd = TableInit {
            offset: local_offset(mem_offset, table.offset)?,
            hash_offset: if table.hash_size != 0 {
                local_offset(mem_offset, table.hash_offset)?
            } else {
                0
            },
            ..table
        };
        let mut payload = [0u8; CMD_PAYLOAD_SIZE];
        let len = layout::encode_table_init(self.layout(), opcode.is_ipv6(), &cmd, &mut payload)?;
        self.push_payload(&payload[..len], opcode, 0, TransDirection::ToDevice)
    }

    /// Append a header table init command
    pub fn hdr_init_local_add(&mut self, offset: u32, size: u16, addr: u64) -> Result<()> {
        let cmd = HdrInitLocal {
            offset: local_offset(self.transport.mem_offset(), offset)?,
            size,
            addr,
        };
        let mut payload = [0u8; CMD_PAYLOAD_SIZE];
        let len = layout::encode_hdr_init_local(self.layout(), &cmd, &mut payload)?;
        self.push_payload(&payload[..len], Opcode::HdrInitLocal, 0, TransDirection::ToDevice)
    }

    /// Append a masked register write
    ///
    /// `clear_full` waits for the full pipeline to drain first; otherwise
    /// only the packet-processing stages are drained.
    pub fn register_write_add(
        &mut self,
        offset: u32,
        value: u32,
        mask: u32,
        clear_full: bool,
    ) -> Result<()> {
        let cmd = RegisterWrite {
            offset,
            value,
            mask,
            clear: if clear_full {
                ClearOption::Full
            } else {
                ClearOption::Hps
            },
        };
        let mut payload = [0u8; CMD_PAYLOAD_SIZE];
        let (len, opcode_flags) =
            layout::encode_register_write(self.transport.version(), &cmd, &mut payload)?;
        self.push_payload(
            &payload[..len],
            Opcode::RegisterWrite,
            opcode_flags,
            TransDirection::None,
        )
    }

    /// Append a copy between `addr` and accelerator-local memory
    pub fn dma_shared_mem_add(
        &mut self,
        offset: u32,
        size: u16,
        addr: u64,
        toward_device: bool,
    ) -> Result<()> {
        let cmd = DmaSharedMem {
            offset: local_offset(self.transport.mem_offset(), offset)?,
            size,
            addr,
            toward_device,
        };
        let mut payload = [0u8; CMD_PAYLOAD_SIZE];
        let len = layout::encode_dma_shared_mem(self.layout(), &cmd, &mut payload)?;
        let direction = if toward_device {
            TransDirection::ToDevice
        } else {
            TransDirection::FromDevice
        };
        self.push_payload(&payload[..len], Opcode::DmaSharedMem, 0, direction)
    }

    /// Append a packet-init command: the next packet on this channel skips
    /// processing and goes to `endpoint_id`
    pub fn ip_packet_init_add(&mut self, endpoint_id: u8) -> Result<()> {
        let mut payload = [0u8; CMD_PAYLOAD_SIZE];
        let len = layout::encode_packet_init(endpoint_id, &mut payload)?;
        self.push_payload(&payload[..len], Opcode::IpPacketInit, 0, TransDirection::ToDevice)
    }

    /// Append a tag-status command
    pub fn ip_tag_status_add(&mut self, tag: u64) -> Result<()> {
        let mut payload = [0u8; CMD_PAYLOAD_SIZE];
        let len = layout::encode_tag_status(self.layout(), tag, &mut payload)?;
        self.push_payload(
            &payload[..len],
            Opcode::IpPacketTagStatus,
            0,
            TransDirection::ToDevice,
        )
    }

    /// Append a zero-filled data transfer of `size` bytes
    pub fn transfer_add(&mut self, size: u32) -> Result<()> {
        let size = usize::try_from(size).map_err(|_| ConfigError::FieldOverflow)?;
        if size == 0 || size > CMD_PAYLOAD_SIZE {
            return Err(ConfigError::FieldOverflow.into());
        }
        let payload = [0u8; CMD_PAYLOAD_SIZE];
        self.push_payload(&payload[..size], Opcode::None, 0, TransDirection::ToDevice)
    }

    /// Append the tag process sequence
    ///
    /// Clears the pipeline, directs the next packet to the LAN receive
    /// endpoint, tags it and sends a small transfer to carry it. Uses
    /// [`tag_process_count`] elements.
    pub fn tag_process_add(&mut self) -> Result<()> {
        let cookie = match self.layout() {
            WireLayout::V2 => TAG_COOKIE_V2,
            WireLayout::V3 => TAG_COOKIE_V3,
        };
        self.register_write_add(0, 0, 0, true)?;
        self.ip_packet_init_add(self.transport.lan_rx_endpoint())?;
        self.ip_tag_status_add(cookie)?;
        self.transfer_add(TAG_PROCESS_TRANSFER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_values() {
        assert_eq!(Opcode::None as u8, 0);
        assert_eq!(Opcode::IpV4FilterInit as u8, 3);
        assert_eq!(Opcode::IpV6RoutingInit as u8, 8);
        assert_eq!(Opcode::HdrInitLocal as u8, 9);
        assert_eq!(Opcode::RegisterWrite as u8, 12);
        assert_eq!(Opcode::IpPacketInit as u8, 16);
        assert_eq!(Opcode::DmaSharedMem as u8, 19);
        assert_eq!(Opcode::IpPacketTagStatus as u8, 20);
    }

    #[test]
    fn table_opcodes() {
        assert!(Opcode::IpV4RoutingInit.is_table_init());
        assert!(!Opcode::HdrInitLocal.is_table_init());
        assert!(Opcode::IpV6FilterInit.is_ipv6());
        assert!(!Opcode::IpV4FilterInit.is_ipv6());
    }

    #[test]
    fn clear_option_bits() {
        assert_eq!(ClearOption::from_bits(0), ClearOption::Hps);
        assert_eq!(ClearOption::from_bits(1), ClearOption::SrcGrp);
        assert_eq!(ClearOption::from_bits(2), ClearOption::Full);
        assert_eq!(ClearOption::Full as u64, 2);
    }

    #[test]
    fn tag_process_uses_four_elements() {
        assert_eq!(tag_process_count(), 4);
    }

    #[test]
    fn local_offset_overflow() {
        assert_eq!(local_offset(0x100, 0x20), Ok(0x120));
        assert!(local_offset(u32::MAX, 1).is_err());
    }
}
