//! Configuration types for the accelerator transport

use alloc::vec::Vec;

use super::error::{ConfigError, ConfigResult};
use crate::internal::constants::{CHANNEL_COUNT_MAX, RING_TLV_MAX};

/// Accelerator protocol version
///
/// The version selects both the backend family and the immediate-command
/// wire layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolVersion {
    /// v2.6L, served by a scatter-gather transfer engine
    V2_6L,
    /// v3.5.1
    V3_5_1,
    /// v4.0
    #[default]
    V4_0,
    /// v4.2
    V4_2,
    /// v4.5
    V4_5,
}

impl ProtocolVersion {
    /// Wire layout of immediate-command payloads for this version
    #[must_use]
    pub const fn layout(self) -> WireLayout {
        match self {
            ProtocolVersion::V2_6L => WireLayout::V2,
            _ => WireLayout::V3,
        }
    }

    /// Backend family serving this version
    #[must_use]
    pub const fn backend(self) -> BackendKind {
        match self {
            ProtocolVersion::V2_6L => BackendKind::Engine,
            _ => BackendKind::Ring,
        }
    }

    /// Whether register writes carry the high offset bits and the clear
    /// option in the opcode (v4.0 and later)
    #[must_use]
    pub const fn has_extended_register_write(self) -> bool {
        matches!(
            self,
            ProtocolVersion::V4_0 | ProtocolVersion::V4_2 | ProtocolVersion::V4_5
        )
    }

    /// Number of bits available for a register-write offset
    #[must_use]
    pub const fn register_write_offset_bits(self) -> u32 {
        if self.has_extended_register_write() {
            20
        } else {
            16
        }
    }
}

/// Immediate-command wire layout family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireLayout {
    /// Compact layout with 32-bit system addresses
    V2,
    /// Layout with 64-bit system addresses
    V3,
}

/// Backend family implementing the transport surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BackendKind {
    /// Descriptor-ring engine with event rings and doorbells
    Ring,
    /// Generic scatter-gather transfer-engine channels
    Engine,
}

/// Execution environment owning a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExecEnv {
    /// Application processor (this host)
    #[default]
    Ap,
    /// Modem; channels are listed but never driven from here
    Modem,
}

/// Ring geometry of a descriptor-ring channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RingGeometry {
    /// Number of TREs in the transfer ring (power of two)
    pub tre_count: u16,
    /// Number of elements in the event ring (power of two)
    pub event_count: u16,
    /// Hardware TLV FIFO depth; the most TREs one transaction may use
    pub tlv_count: u8,
}

impl RingGeometry {
    /// Create a ring geometry
    #[must_use]
    pub const fn new(tre_count: u16, event_count: u16, tlv_count: u8) -> Self {
        Self {
            tre_count,
            event_count,
            tlv_count,
        }
    }

    /// Whether no ring is described
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tlv_count == 0
    }

    /// Check the geometry against the ring engine's limits
    pub fn validate(&self) -> ConfigResult<()> {
        if self.tlv_count == 0 || self.tlv_count > RING_TLV_MAX {
            return Err(ConfigError::InvalidConfig);
        }
        if !self.tre_count.is_power_of_two() || !self.event_count.is_power_of_two() {
            return Err(ConfigError::InvalidConfig);
        }
        // One full transaction must fit with room to spare for the next
        if u32::from(self.tre_count) < 2 * u32::from(self.tlv_count) {
            return Err(ConfigError::InvalidConfig);
        }
        Ok(())
    }
}

/// One endpoint/channel entry of the transport configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointConfig {
    /// Channel name, also used to request transfer-engine channels
    pub name: &'static str,
    /// Hardware channel id
    pub channel_id: u8,
    /// Accelerator endpoint id
    pub endpoint_id: u8,
    /// Transmit (toward the accelerator) or receive
    pub toward_device: bool,
    /// Whether this is the immediate-command channel
    pub command: bool,
    /// Owning execution environment
    pub owner: ExecEnv,
    /// Ring geometry (descriptor-ring backend only)
    pub ring: RingGeometry,
}

impl EndpointConfig {
    /// Create a receive endpoint owned by this host with no ring geometry
    #[must_use]
    pub const fn new(name: &'static str, channel_id: u8, endpoint_id: u8) -> Self {
        Self {
            name,
            channel_id,
            endpoint_id,
            toward_device: false,
            command: false,
            owner: ExecEnv::Ap,
            ring: RingGeometry::new(0, 0, 0),
        }
    }

    /// Mark the endpoint as transmit (toward the accelerator)
    #[must_use]
    pub const fn with_toward_device(mut self, toward_device: bool) -> Self {
        self.toward_device = toward_device;
        self
    }

    /// Mark the endpoint as the immediate-command channel
    ///
    /// Command channels always transmit.
    #[must_use]
    pub const fn with_command(mut self, command: bool) -> Self {
        self.command = command;
        if command {
            self.toward_device = true;
        }
        self
    }

    /// Set the owning execution environment
    #[must_use]
    pub const fn with_owner(mut self, owner: ExecEnv) -> Self {
        self.owner = owner;
        self
    }

    /// Set the ring geometry
    #[must_use]
    pub const fn with_ring(mut self, ring: RingGeometry) -> Self {
        self.ring = ring;
        self
    }

    /// Whether this entry is skipped for the given backend
    ///
    /// Entries with no name, entries owned by another execution environment,
    /// and ring entries without a geometry describe nothing to drive.
    #[must_use]
    pub const fn is_empty(&self, backend: BackendKind) -> bool {
        if self.name.is_empty() || !matches!(self.owner, ExecEnv::Ap) {
            return true;
        }
        matches!(backend, BackendKind::Ring) && self.ring.is_empty()
    }
}

/// A region of accelerator-local memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MemRegion {
    /// Offset from the start of the accelerator's shared memory
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
}

impl MemRegion {
    /// Create a region
    #[must_use]
    pub const fn new(offset: u32, size: u32) -> Self {
        Self { offset, size }
    }
}

/// Filter or routing table regions, hashed and non-hashed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TableRegions {
    /// Hashed table; size 0 when the hardware has no hashed tables
    pub hashed: MemRegion,
    /// Non-hashed table
    pub non_hashed: MemRegion,
}

/// Layout of accelerator-local memory used by command payloads
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryLayout {
    /// Offset added to every local-memory address placed in a command
    pub mem_offset: u32,
    /// Size of the accelerator's shared memory
    pub mem_size: u32,
    /// Filter and routing tables initialized by table-init commands
    pub tables: Vec<TableRegions>,
    /// Header table initialized by header-init commands
    pub header: MemRegion,
    /// Register offsets the owner will target with register-write commands
    pub register_offsets: Vec<u32>,
}

impl MemoryLayout {
    /// Create an empty layout
    #[must_use]
    pub const fn new(mem_offset: u32, mem_size: u32) -> Self {
        Self {
            mem_offset,
            mem_size,
            tables: Vec::new(),
            header: MemRegion::new(0, 0),
            register_offsets: Vec::new(),
        }
    }

    /// Add a filter or routing table
    #[must_use]
    pub fn with_table(mut self, table: TableRegions) -> Self {
        self.tables.push(table);
        self
    }

    /// Set the header table region
    #[must_use]
    pub const fn with_header(mut self, header: MemRegion) -> Self {
        self.header = header;
        self
    }

    /// Declare a register offset used with register-write commands
    #[must_use]
    pub fn with_register_offset(mut self, offset: u32) -> Self {
        self.register_offsets.push(offset);
        self
    }
}

/// Transport configuration
///
/// # Example
///
/// ```ignore
/// let config = TransportConfig::new(ProtocolVersion::V4_2)
///     .with_endpoint(
///         EndpointConfig::new("cmd_tx", 3, 3)
///             .with_command(true)
///             .with_ring(RingGeometry::new(256, 256, 20)),
///     )
///     .with_lan_rx_endpoint(2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportConfig {
    /// Protocol version
    pub version: ProtocolVersion,
    /// Endpoint table in configuration order
    pub endpoints: Vec<EndpointConfig>,
    /// Endpoint that receives the tag-process packet
    pub lan_rx_endpoint: u8,
    /// Command memory layout, validated at construction when present
    pub memory: Option<MemoryLayout>,
}

impl TransportConfig {
    /// Create an empty configuration for a protocol version
    #[must_use]
    pub const fn new(version: ProtocolVersion) -> Self {
        Self {
            version,
            endpoints: Vec::new(),
            lan_rx_endpoint: 0,
            memory: None,
        }
    }

    /// Append an endpoint entry
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: EndpointConfig) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Set the endpoint receiving tag-process packets
    #[must_use]
    pub const fn with_lan_rx_endpoint(mut self, endpoint_id: u8) -> Self {
        self.lan_rx_endpoint = endpoint_id;
        self
    }

    /// Set the command memory layout
    #[must_use]
    pub fn with_memory(mut self, memory: MemoryLayout) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Entries that will be driven by this host
    pub fn active_endpoints(&self) -> impl Iterator<Item = &EndpointConfig> {
        let backend = self.version.backend();
        self.endpoints.iter().filter(move |ep| !ep.is_empty(backend))
    }

    /// Validate the endpoint table for a channel limit
    ///
    /// Checks channel ids are in range and unique, at most one command
    /// channel exists, and ring geometries are usable.
    pub fn validate(&self, channel_limit: usize) -> ConfigResult<()> {
        let mut seen = [false; CHANNEL_COUNT_MAX];
        let mut active = 0usize;
        let mut commands = 0usize;

        for ep in self.active_endpoints() {
            let id = usize::from(ep.channel_id);
            if id >= CHANNEL_COUNT_MAX {
                return Err(ConfigError::InvalidChannel);
            }
            if seen[id] {
                return Err(ConfigError::DuplicateChannel);
            }
            seen[id] = true;
            active += 1;

            if ep.command {
                if !ep.toward_device {
                    return Err(ConfigError::InvalidConfig);
                }
                commands += 1;
            }
            if matches!(self.version.backend(), BackendKind::Ring) {
                ep.ring.validate()?;
            }
        }

        if active > channel_limit {
            return Err(ConfigError::TooManyChannels);
        }
        if commands > 1 {
            return Err(ConfigError::InvalidConfig);
        }
        Ok(())
    }

    /// Reference endpoint table of a v2.6L platform driven by a transfer engine
    ///
    /// Four channels belong to this host; the modem entries are listed for
    /// completeness and skipped.
    #[must_use]
    pub fn engine_reference() -> Self {
        Self::new(ProtocolVersion::V2_6L)
            .with_endpoint(EndpointConfig::new("cmd_tx", 3, 3).with_command(true))
            .with_endpoint(EndpointConfig::new("ap_lan_rx", 2, 2))
            .with_endpoint(EndpointConfig::new("ap_modem_tx", 4, 4).with_toward_device(true))
            .with_endpoint(EndpointConfig::new("ap_modem_rx", 5, 5))
            .with_endpoint(
                EndpointConfig::new("modem_lan_tx", 6, 6)
                    .with_toward_device(true)
                    .with_owner(ExecEnv::Modem),
            )
            .with_endpoint(
                EndpointConfig::new("modem_cmd_tx", 7, 7)
                    .with_toward_device(true)
                    .with_owner(ExecEnv::Modem),
            )
            .with_endpoint(EndpointConfig::new("modem_lan_rx", 8, 8).with_owner(ExecEnv::Modem))
            .with_endpoint(EndpointConfig::new("modem_ap_rx", 9, 9).with_owner(ExecEnv::Modem))
            .with_lan_rx_endpoint(2)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
