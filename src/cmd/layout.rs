//! Immediate-command payload layouts.
//!
//! Two wire families exist. [`WireLayout::V2`] serves protocol v2.6L on the
//! transfer-engine backend; [`WireLayout::V3`] serves v3.5.1 and every v4.x
//! on the descriptor-ring backend. Register-write additionally differs
//! between v3.5.1 and v4.0+, so its encoder takes the full version.
//!
//! Encoders check every value against its field and fail with
//! [`ConfigError::FieldOverflow`] rather than truncate. Decoders read back
//! what an encoder wrote and exist so encodings can be checked.

use super::ClearOption;
use crate::driver::config::{ProtocolVersion, WireLayout};
use crate::driver::error::{ConfigError, ConfigResult};
use crate::internal::bits::{
    dma_shared_mem, hdr_init, packet_init, register_write, table_init, tag_status, v2_sized_addr,
};
use crate::internal::field;

// =============================================================================
// Command Parameters
// =============================================================================

/// Filter or routing table initialization
///
/// Offsets are accelerator-local and already include the memory offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TableInit {
    /// Non-hashed table size in bytes
    pub size: u16,
    /// Non-hashed table local offset
    pub offset: u32,
    /// Non-hashed rules source address
    pub addr: u64,
    /// Hashed table size; 0 when unused
    pub hash_size: u16,
    /// Hashed table local offset
    pub hash_offset: u32,
    /// Hashed rules source address
    pub hash_addr: u64,
}

/// Header table initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HdrInitLocal {
    /// Header table local offset
    pub offset: u32,
    /// Header table size in bytes
    pub size: u16,
    /// Source address of the initial table contents
    pub addr: u64,
}

/// Masked register write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterWrite {
    /// Register offset
    pub offset: u32,
    /// Value to write
    pub value: u32,
    /// Bits of the register affected
    pub mask: u32,
    /// Pipeline clear performed before the write
    pub clear: ClearOption,
}

/// Copy between host memory and accelerator-local memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaSharedMem {
    /// Accelerator-local offset
    pub offset: u32,
    /// Bytes to copy
    pub size: u16,
    /// Host buffer address
    pub addr: u64,
    /// True to write accelerator memory, false to read it
    pub toward_device: bool,
}

// =============================================================================
// Payload Sizes
// =============================================================================

const V2_TABLE_INIT_LEN: usize = 8;
const V3_TABLE_INIT_LEN: usize = 24;
const HDR_INIT_LOCAL_LEN: usize = 16;
const V2_REGISTER_WRITE_LEN: usize = 12;
const V3_REGISTER_WRITE_LEN: usize = 16;
const DMA_SHARED_MEM_LEN: usize = 16;
const PACKET_INIT_LEN: usize = 8;
const TAG_STATUS_LEN: usize = 8;

// =============================================================================
// Little-Endian Access
// =============================================================================

fn put_u16(out: &mut [u8], at: usize, value: u16) {
    out[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut [u8], at: usize, value: u32) {
    out[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut [u8], at: usize, value: u64) {
    out[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

fn get_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn get_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(raw)
}

fn get_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

/// Place `value` in `mask`, failing if it does not fit
fn encode_field(mask: u64, value: u64) -> ConfigResult<u64> {
    if field::fits(mask, value) {
        Ok(field::prep(mask, value))
    } else {
        Err(ConfigError::FieldOverflow)
    }
}

fn narrow<T: TryFrom<u64>>(value: u64) -> ConfigResult<T> {
    T::try_from(value).map_err(|_| ConfigError::FieldOverflow)
}

// =============================================================================
// Table Init
// =============================================================================

/// Encode a table-init payload
///
/// The v2 layout has separate IPv4 and IPv6 forms and no hashed table.
pub fn encode_table_init(
    layout: WireLayout,
    ipv6: bool,
    cmd: &TableInit,
    out: &mut [u8],
) -> ConfigResult<usize> {
    match layout {
        WireLayout::V2 => {
            put_u32(out, 0, narrow(cmd.addr)?);
            if ipv6 {
                put_u16(out, 4, cmd.size);
                put_u16(out, 6, narrow(u64::from(cmd.offset))?);
            } else {
                let word = encode_field(v2_sized_addr::SIZE, u64::from(cmd.size))?
                    | encode_field(v2_sized_addr::ADDR, u64::from(cmd.offset))?;
                put_u32(out, 4, word as u32);
            }
            Ok(V2_TABLE_INIT_LEN)
        }
        WireLayout::V3 => {
            let mut flags = encode_field(table_init::NHASH_ADDR, u64::from(cmd.offset))?
                | encode_field(table_init::NHASH_SIZE, u64::from(cmd.size))?;
            // Hash fields stay zero when there is no hashed table
            let hash_addr = if cmd.hash_size != 0 {
                flags |= encode_field(table_init::HASH_ADDR, u64::from(cmd.hash_offset))?
                    | encode_field(table_init::HASH_SIZE, u64::from(cmd.hash_size))?;
                cmd.hash_addr
            } else {
                0
            };
            put_u64(out, 0, hash_addr);
            put_u64(out, 8, flags);
            put_u64(out, 16, cmd.addr);
            Ok(V3_TABLE_INIT_LEN)
        }
    }
}

/// Decode a table-init payload
#[must_use]
pub fn decode_table_init(layout: WireLayout, ipv6: bool, bytes: &[u8]) -> TableInit {
    match layout {
        WireLayout::V2 => {
            let addr = u64::from(get_u32(bytes, 0));
            let (size, offset) = if ipv6 {
                (get_u16(bytes, 4), u32::from(get_u16(bytes, 6)))
            } else {
                let word = u64::from(get_u32(bytes, 4));
                (
                    field::get(v2_sized_addr::SIZE, word) as u16,
                    field::get(v2_sized_addr::ADDR, word) as u32,
                )
            };
            TableInit {
                size,
                offset,
                addr,
                ..TableInit::default()
            }
        }
        WireLayout::V3 => {
            let flags = get_u64(bytes, 8);
            TableInit {
                size: field::get(table_init::NHASH_SIZE, flags) as u16,
                offset: field::get(table_init::NHASH_ADDR, flags) as u32,
                addr: get_u64(bytes, 16),
                hash_size: field::get(table_init::HASH_SIZE, flags) as u16,
                hash_offset: field::get(table_init::HASH_ADDR, flags) as u32,
                hash_addr: get_u64(bytes, 0),
            }
        }
    }
}

// =============================================================================
// Header Init
// =============================================================================

/// Encode a header-init-local payload
pub fn encode_hdr_init_local(
    layout: WireLayout,
    cmd: &HdrInitLocal,
    out: &mut [u8],
) -> ConfigResult<usize> {
    let flags = encode_field(hdr_init::TABLE_SIZE, u64::from(cmd.size))?
        | encode_field(hdr_init::HDR_ADDR, u64::from(cmd.offset))?;
    match layout {
        WireLayout::V2 => {
            put_u32(out, 0, narrow(cmd.addr)?);
            put_u64(out, 8, flags);
        }
        WireLayout::V3 => {
            put_u64(out, 0, cmd.addr);
            put_u32(out, 8, flags as u32);
        }
    }
    Ok(HDR_INIT_LOCAL_LEN)
}

/// Decode a header-init-local payload
#[must_use]
pub fn decode_hdr_init_local(layout: WireLayout, bytes: &[u8]) -> HdrInitLocal {
    let (addr, flags) = match layout {
        WireLayout::V2 => (u64::from(get_u32(bytes, 0)), get_u64(bytes, 8)),
        WireLayout::V3 => (get_u64(bytes, 0), u64::from(get_u32(bytes, 8))),
    };
    HdrInitLocal {
        offset: field::get(hdr_init::HDR_ADDR, flags) as u32,
        size: field::get(hdr_init::TABLE_SIZE, flags) as u16,
        addr,
    }
}

// =============================================================================
// Register Write
// =============================================================================

/// Encode a register-write payload
///
/// Returns the payload length and the bits to OR into the opcode word:
/// from v4.0 the pipeline clear option travels in the opcode.
pub fn encode_register_write(
    version: ProtocolVersion,
    cmd: &RegisterWrite,
    out: &mut [u8],
) -> ConfigResult<(usize, u16)> {
    let offset = u64::from(cmd.offset);
    if offset >> version.register_write_offset_bits() != 0 {
        return Err(ConfigError::FieldOverflow);
    }
    let clear = cmd.clear as u64;

    // Skip-clear is never set: the pipeline is always cleared
    let (flags, options, opcode_flags) = if version.has_extended_register_write() {
        let high = field::get(register_write::OFFSET_HIGH_SOURCE, offset);
        (
            field::prep(register_write::OFFSET_HIGH, high),
            0,
            field::prep(register_write::OPCODE_CLEAR_OPTION, clear),
        )
    } else {
        (0, field::prep(register_write::CLEAR_OPTION, clear), 0)
    };

    put_u16(out, 0, flags as u16);
    put_u16(out, 2, field::get(register_write::OFFSET_LOW, offset) as u16);
    put_u32(out, 4, cmd.value);
    put_u32(out, 8, cmd.mask);
    let len = match version.layout() {
        WireLayout::V2 => V2_REGISTER_WRITE_LEN,
        WireLayout::V3 => {
            put_u32(out, 12, options as u32);
            V3_REGISTER_WRITE_LEN
        }
    };
    Ok((len, opcode_flags as u16))
}

/// Decode a register-write payload
///
/// `opcode` is the full opcode word the payload was submitted with. The v2
/// layout cannot carry a clear option and decodes as [`ClearOption::Hps`].
#[must_use]
pub fn decode_register_write(version: ProtocolVersion, bytes: &[u8], opcode: u16) -> RegisterWrite {
    let flags = u64::from(get_u16(bytes, 0));
    let mut offset = u32::from(get_u16(bytes, 2));
    let clear = if version.has_extended_register_write() {
        offset |= (field::get(register_write::OFFSET_HIGH, flags) as u32) << 16;
        field::get(register_write::OPCODE_CLEAR_OPTION, u64::from(opcode))
    } else if version.layout() == WireLayout::V3 {
        field::get(register_write::CLEAR_OPTION, u64::from(get_u32(bytes, 12)))
    } else {
        0
    };
    RegisterWrite {
        offset,
        value: get_u32(bytes, 4),
        mask: get_u32(bytes, 8),
        clear: ClearOption::from_bits(clear),
    }
}

// =============================================================================
// DMA Shared Memory
// =============================================================================

/// Encode a DMA-shared-memory payload
pub fn encode_dma_shared_mem(
    layout: WireLayout,
    cmd: &DmaSharedMem,
    out: &mut [u8],
) -> ConfigResult<usize> {
    if cmd.size == 0 {
        return Err(ConfigError::InvalidConfig);
    }
    let local: u16 = narrow(u64::from(cmd.offset))?;
    let flags = if cmd.toward_device {
        0
    } else {
        dma_shared_mem::DIRECTION as u16
    };
    match layout {
        WireLayout::V2 => {
            put_u16(out, 2, cmd.size);
            put_u32(out, 4, narrow(cmd.addr)?);
            put_u16(out, 8, local);
            put_u16(out, 10, flags);
        }
        WireLayout::V3 => {
            // clear_after_read is never needed
            put_u16(out, 2, cmd.size);
            put_u16(out, 4, local);
            put_u16(out, 6, flags);
            put_u64(out, 8, cmd.addr);
        }
    }
    Ok(DMA_SHARED_MEM_LEN)
}

/// Decode a DMA-shared-memory payload
#[must_use]
pub fn decode_dma_shared_mem(layout: WireLayout, bytes: &[u8]) -> DmaSharedMem {
    let (local, flags, addr) = match layout {
        WireLayout::V2 => (
            get_u16(bytes, 8),
            get_u16(bytes, 10),
            u64::from(get_u32(bytes, 4)),
        ),
        WireLayout::V3 => (get_u16(bytes, 4), get_u16(bytes, 6), get_u64(bytes, 8)),
    };
    DmaSharedMem {
        offset: u32::from(local),
        size: get_u16(bytes, 2),
        addr,
        toward_device: u64::from(flags) & dma_shared_mem::DIRECTION == 0,
    }
}

// =============================================================================
// Packet Init / Tag Status
// =============================================================================

/// Encode a packet-init payload (same in both layouts)
pub fn encode_packet_init(endpoint_id: u8, out: &mut [u8]) -> ConfigResult<usize> {
    out[0] = encode_field(packet_init::DEST_ENDPOINT, u64::from(endpoint_id))? as u8;
    Ok(PACKET_INIT_LEN)
}

/// Decode a packet-init payload
#[must_use]
pub fn decode_packet_init(bytes: &[u8]) -> u8 {
    field::get(packet_init::DEST_ENDPOINT, u64::from(bytes[0])) as u8
}

fn tag_mask(layout: WireLayout) -> u64 {
    match layout {
        WireLayout::V2 => tag_status::TAG_V2,
        WireLayout::V3 => tag_status::TAG_V3,
    }
}

/// Encode a tag-status payload
pub fn encode_tag_status(layout: WireLayout, tag: u64, out: &mut [u8]) -> ConfigResult<usize> {
    put_u64(out, 0, encode_field(tag_mask(layout), tag)?);
    Ok(TAG_STATUS_LEN)
}

/// Decode a tag-status payload
#[must_use]
pub fn decode_tag_status(layout: WireLayout, bytes: &[u8]) -> u64 {
    field::get(tag_mask(layout), get_u64(bytes, 0))
}
