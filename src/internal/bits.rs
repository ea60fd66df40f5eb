//! Wire-level bit field constants.
//!
//! Transfer ring elements, engine descriptor flags and the immediate-command
//! payload layouts. Multi-byte fields are little-endian on the wire.

// =============================================================================
// Transfer Ring Element (16 bytes)
// =============================================================================

/// Transfer ring element layout: `u64 addr`, `u16 len_opcode`, `u16 reserved`,
/// `u32 flags`
pub mod tre {
    /// Byte offset of the buffer address
    pub const ADDR_OFFSET: usize = 0;
    /// Byte offset of the length (or immediate-command opcode)
    pub const LEN_OPCODE_OFFSET: usize = 8;
    /// Byte offset of the flags word
    pub const FLAGS_OFFSET: usize = 12;

    /// Chain - more TREs of the same transaction follow
    pub const CHAIN: u32 = 1 << 0;
    /// Interrupt on end of transfer
    pub const IEOT: u32 = 1 << 9;
    /// Block event interrupt (transmit channels only)
    pub const BEI: u32 = 1 << 10;
    /// Element type field
    pub const TYPE_MASK: u32 = 0x00ff_0000;

    /// Type: data transfer
    pub const TYPE_XFER: u32 = 0x2;
    /// Type: immediate command
    pub const TYPE_IMMD_CMD: u32 = 0x3;
}

// =============================================================================
// Transfer Engine Descriptor Flags
// =============================================================================

/// Flags passed when preparing a transfer-engine descriptor
pub mod engine {
    /// Raise an interrupt when this descriptor completes
    pub const INTERRUPT: u32 = 1 << 0;
    /// The length word carries an immediate-command opcode
    pub const IMM_CMD: u32 = 1 << 1;
}

// =============================================================================
// Immediate Command Payloads, v3 Layout
// =============================================================================

/// Routing/filter table init flags (v3)
pub mod table_init {
    /// Hashed table size
    pub const HASH_SIZE: u64 = 0x0000_0000_0000_0fff;
    /// Hashed table local address
    pub const HASH_ADDR: u64 = 0x0000_0000_0fff_f000;
    /// Non-hashed table size
    pub const NHASH_SIZE: u64 = 0x0000_00ff_f000_0000;
    /// Non-hashed table local address
    pub const NHASH_ADDR: u64 = 0x00ff_ff00_0000_0000;
}

/// Header table init flags (v3 32-bit word, v2 64-bit word)
pub mod hdr_init {
    /// Header table size
    pub const TABLE_SIZE: u64 = 0x0000_0fff;
    /// Header table local address
    pub const HDR_ADDR: u64 = 0x0fff_f000;
}

/// Register write fields
pub mod register_write {
    /// v4.0+: bits 19:16 of the register offset
    pub const OFFSET_HIGH: u64 = 0x7800;
    /// v4.0+ opcode: pipeline clear option
    pub const OPCODE_CLEAR_OPTION: u64 = 0x0600;
    /// v3.5.1: pipeline clear option in the clear_options word
    pub const CLEAR_OPTION: u64 = 0x0003;
    /// Offset bits carried in the 16-bit offset field
    pub const OFFSET_LOW: u64 = 0xffff;
    /// Offset bits carried in [`OFFSET_HIGH`]
    pub const OFFSET_HIGH_SOURCE: u64 = 0x000f_0000;
}

/// DMA shared memory flags
pub mod dma_shared_mem {
    /// Direction: 0 writes accelerator memory, 1 reads it
    pub const DIRECTION: u64 = 1 << 0;
}

/// Packet init fields
pub mod packet_init {
    /// Destination endpoint id
    pub const DEST_ENDPOINT: u64 = 0x1f;
}

/// Tag status tag fields
pub mod tag_status {
    /// v3 tag field (48 bits)
    pub const TAG_V3: u64 = 0xffff_ffff_ffff_0000;
    /// v2 tag field (32 bits)
    pub const TAG_V2: u64 = 0x0000_0000_ffff_ffff;
}

/// v2 IPv4 table init / v2 header init size+address word
pub mod v2_sized_addr {
    /// Size in bytes
    pub const SIZE: u64 = 0x0000_0fff;
    /// Local address
    pub const ADDR: u64 = 0x0fff_f000;
}
