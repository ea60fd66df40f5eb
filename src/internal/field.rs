//! Mask-based bit field helpers.
//!
//! Wire layouts are described by contiguous masks (`0x0fff_f000` style). These
//! helpers place a value into a mask, extract it again, and report the largest
//! value a mask can hold.

/// Shift a value into the field described by `mask`.
///
/// Bits of `value` that do not fit in the field are discarded.
#[inline(always)]
pub const fn prep(mask: u64, value: u64) -> u64 {
    (value << mask.trailing_zeros()) & mask
}

/// Extract the field described by `mask` from `reg`.
#[inline(always)]
pub const fn get(mask: u64, reg: u64) -> u64 {
    (reg & mask) >> mask.trailing_zeros()
}

/// Largest value representable in the field described by `mask`.
#[inline(always)]
pub const fn max(mask: u64) -> u64 {
    mask >> mask.trailing_zeros()
}

/// Whether `value` fits in the field described by `mask`.
#[inline(always)]
pub const fn fits(mask: u64, value: u64) -> bool {
    value <= max(mask)
}
