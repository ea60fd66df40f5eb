//! Command memory checks run at bring-up.
//!
//! Every local-memory address placed in a command is the configured region
//! offset plus the global memory offset, and must fit the command field that
//! carries it. Regions must also lie within accelerator memory.

use crate::driver::config::{MemRegion, MemoryLayout, ProtocolVersion, WireLayout};
use crate::driver::error::{ConfigError, ConfigResult};
use crate::internal::bits::{hdr_init, table_init, v2_sized_addr};
use crate::internal::field;

fn offset_fits(offset_max: u32, mem_offset: u32, offset: u32) -> bool {
    offset <= offset_max && mem_offset <= offset_max - offset
}

fn in_range(mem_size: u32, region: &MemRegion) -> bool {
    region.offset <= mem_size && region.size <= mem_size - region.offset
}

/// Check a filter or routing table region
pub fn table_valid(
    layout: WireLayout,
    memory: &MemoryLayout,
    region: &MemRegion,
    hashed: bool,
) -> ConfigResult<()> {
    let mask = match (layout, hashed) {
        (WireLayout::V2, _) => v2_sized_addr::ADDR,
        (WireLayout::V3, true) => table_init::HASH_ADDR,
        (WireLayout::V3, false) => table_init::NHASH_ADDR,
    };
    let offset_max = field::max(mask) as u32;
    if !offset_fits(offset_max, memory.mem_offset, region.offset) {
        #[cfg(feature = "log")]
        log::warn!(
            "table region offset too large ({:#x} + {:#x} > {:#x})",
            memory.mem_offset,
            region.offset,
            offset_max
        );
        return Err(ConfigError::RegionOffsetTooLarge);
    }
    if !in_range(memory.mem_size, region) {
        return Err(ConfigError::RegionOutOfRange);
    }
    Ok(())
}

/// Check the header table region
pub fn header_valid(memory: &MemoryLayout) -> ConfigResult<()> {
    let offset_max = field::max(hdr_init::HDR_ADDR) as u32;
    if !offset_fits(offset_max, memory.mem_offset, memory.header.offset) {
        return Err(ConfigError::RegionOffsetTooLarge);
    }
    if !field::fits(hdr_init::TABLE_SIZE, u64::from(memory.header.size)) {
        return Err(ConfigError::FieldOverflow);
    }
    if !in_range(memory.mem_size, &memory.header) {
        return Err(ConfigError::RegionOutOfRange);
    }
    Ok(())
}

/// Check an offset used with a register-write command
///
/// v2 and v3.5.1 carry 16 offset bits; v4.0 and later carry 20.
pub fn register_write_offset_valid(
    version: ProtocolVersion,
    mem_offset: u32,
    offset: u32,
) -> ConfigResult<()> {
    let offset_max = u32::MAX >> (32 - version.register_write_offset_bits());
    if offset_fits(offset_max, mem_offset, offset) {
        Ok(())
    } else {
        Err(ConfigError::FieldOverflow)
    }
}

/// Check every region and register offset of a memory layout
pub fn memory_valid(version: ProtocolVersion, memory: &MemoryLayout) -> ConfigResult<()> {
    let layout = version.layout();
    for table in &memory.tables {
        table_valid(layout, memory, &table.non_hashed, false)?;
        // Hardware without hashed tables configures them empty
        if table.hashed.size != 0 {
            table_valid(layout, memory, &table.hashed, true)?;
        }
    }
    header_valid(memory)?;
    for &offset in &memory.register_offsets {
        register_write_offset_valid(version, memory.mem_offset, offset)?;
    }
    #[cfg(feature = "defmt")]
    defmt::debug!("command memory layout valid");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::config::TableRegions;

    fn layout() -> MemoryLayout {
        MemoryLayout::new(0x0800, 0x2000)
            .with_table(TableRegions {
                hashed: MemRegion::new(0x0100, 0x80),
                non_hashed: MemRegion::new(0x0200, 0x80),
            })
            .with_header(MemRegion::new(0x0400, 0x140))
            .with_register_offset(0x0090)
    }

    #[test]
    fn valid_layout_passes() {
        assert_eq!(memory_valid(ProtocolVersion::V4_2, &layout()), Ok(()));
        assert_eq!(memory_valid(ProtocolVersion::V2_6L, &layout()), Ok(()));
    }

    #[test]
    fn table_offset_plus_mem_offset_must_fit() {
        let mut memory = layout();
        memory.mem_offset = 0xff00;
        assert_eq!(
            memory_valid(ProtocolVersion::V4_2, &memory),
            Err(ConfigError::RegionOffsetTooLarge)
        );
    }

    #[test]
    fn table_must_lie_in_memory() {
        let memory = layout().with_table(TableRegions {
            hashed: MemRegion::default(),
            non_hashed: MemRegion::new(0x1f00, 0x200),
        });
        assert_eq!(
            memory_valid(ProtocolVersion::V4_2, &memory),
            Err(ConfigError::RegionOutOfRange)
        );
    }

    #[test]
    fn empty_hashed_table_is_skipped() {
        let memory = MemoryLayout::new(0, 0x1000).with_table(TableRegions {
            hashed: MemRegion::new(0xffff_0000, 0),
            non_hashed: MemRegion::new(0x100, 0x80),
        });
        assert!(memory_valid(ProtocolVersion::V3_5_1, &memory).is_ok());
    }

    #[test]
    fn header_size_must_fit_field() {
        let memory = MemoryLayout::new(0, 0x4000).with_header(MemRegion::new(0, 0x1000));
        assert_eq!(header_valid(&memory), Err(ConfigError::FieldOverflow));
    }

    #[test]
    fn register_offset_width_follows_version() {
        assert!(register_write_offset_valid(ProtocolVersion::V3_5_1, 0, 0xffff).is_ok());
        assert!(register_write_offset_valid(ProtocolVersion::V3_5_1, 1, 0xffff).is_err());
        assert!(register_write_offset_valid(ProtocolVersion::V4_0, 0, 0x1_0000).is_ok());
        assert!(register_write_offset_valid(ProtocolVersion::V4_5, 0, 0x10_0000).is_err());
    }
}
