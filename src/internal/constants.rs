//! Centralized Constants
//!
//! This module provides a single source of truth for the limits, magic
//! numbers and timing values used throughout the transport.
//!
//! # Organization
//!
//! Constants are grouped by category:
//! - **Channel limits**: channel counts and per-backend TRE limits
//! - **Pools**: element sizes and page geometry for DMA-coherent pools
//! - **Commands**: payload size, barrier cookies, tag process length
//! - **Timing**: wait polling intervals
//! - **Harvester**: default poll budget
//!
//! # Note
//!
//! Wire-level bit definitions live in [`super::bits`].

// =============================================================================
// Channel Limits
// =============================================================================

/// Maximum number of channels a transport can address (channel ids 0..20)
pub const CHANNEL_COUNT_MAX: usize = 20;

/// Maximum number of channels the descriptor-ring engine implements
pub const RING_CHANNEL_COUNT_MAX: usize = 17;

/// Largest TLV FIFO (and so the most TREs in one transaction) on a ring channel
pub const RING_TLV_MAX: u8 = 64;

/// Maximum burst of the transfer engine; bounds both channel and transaction TREs
pub const ENGINE_MAX_BURST: u32 = 0x10;

/// Size in bytes of one transfer ring element
pub const TRE_SIZE: usize = 16;

// =============================================================================
// Pools
// =============================================================================

/// Page size used to round DMA-coherent pool regions
pub const PAGE_SIZE: usize = 4096;

/// Required granularity of DMA pool element sizes
pub const POOL_ELEMENT_ALIGN: usize = 8;

// =============================================================================
// Commands
// =============================================================================

/// Size of a command payload buffer (the largest immediate-command layout)
pub const CMD_PAYLOAD_SIZE: usize = 24;

/// Number of command elements used by a tag process sequence
pub const TAG_PROCESS_COUNT: u32 = 4;

/// Size of the zero-filled transfer closing a tag process sequence
pub const TAG_PROCESS_TRANSFER_SIZE: u32 = 4;

/// Pipeline barrier cookie for the v2 wire layout (32-bit tag field)
pub const TAG_COOKIE_V2: u64 = 0x5783_1603;

/// Pipeline barrier cookie for the v3 wire layout (48-bit tag field)
pub const TAG_COOKIE_V3: u64 = 0xcba9_8765_4321;

// =============================================================================
// Timing
// =============================================================================

/// Interval between completion checks while blocking on a transaction (µs)
pub const WAIT_POLL_INTERVAL_US: u32 = 10;

/// Default timeout for bounded command waits (ms)
pub const DEFAULT_COMMAND_TIMEOUT_MS: u32 = 500;

// =============================================================================
// Harvester
// =============================================================================

/// Default harvester budget per invocation
pub const POLL_WEIGHT: usize = 64;

// =============================================================================
// Unit Tests
// =============================================================================
