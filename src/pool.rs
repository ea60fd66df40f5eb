//! Fixed-capacity bump pools.
//!
//! Transactions draw their scatter lists, command info and command payloads
//! from pools created when a channel is initialized. Allocation is a bump
//! cursor that moves forward and wraps to the start when a request does not
//! fit before the end. The region holds
//! `count + max_alloc - 1` elements so a request for up to `max_alloc`
//! contiguous elements always finds room after a wrap.
//!
//! Reuse is safe because the owning channel never lets more than `count`
//! elements be outstanding: the TRE budget bounds live transactions, and
//! completions retire transactions in submission order. Owners hand spans
//! back with [`Pool::release`]; the cursor steps over elements that are
//! still live and rejects requests that would exceed `count` instead of
//! handing out memory twice.
//!
//! Channels whose transactions may be freed in any order partition a pool
//! into fixed per-slot spans with [`Pool::alloc_at`] instead, so free space
//! never fragments.

use alloc::alloc::{Layout, alloc_zeroed, dealloc};
use alloc::vec::Vec;
use core::ptr::NonNull;

use crate::driver::error::{ConfigError, ConfigResult, DmaError, DmaResult};
use crate::internal::constants::{PAGE_SIZE, POOL_ELEMENT_ALIGN};

/// A contiguous run of pool elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PoolSpan {
    /// Index of the first element
    pub start: u32,
    /// Number of elements
    pub len: u32,
}

impl PoolSpan {
    /// Index range covered by the span
    #[must_use]
    pub const fn range(&self) -> core::ops::Range<usize> {
        self.start as usize..(self.start + self.len) as usize
    }
}

/// Cursor and accounting shared by both pool variants
#[derive(Debug, Clone)]
struct Cursor {
    /// Logical capacity
    count: u32,
    /// Physical element count (`count + max_alloc - 1`)
    capacity: u32,
    /// Largest single request
    max_alloc: u32,
    /// Index of the next element to hand out
    free: u32,
    /// Elements handed out and not yet released
    outstanding: u32,
    /// Elements currently handed out
    live: Vec<bool>,
}

impl Cursor {
    fn new(count: u32, max_alloc: u32) -> ConfigResult<Self> {
        if max_alloc == 0 || count < max_alloc {
            return Err(ConfigError::InvalidPoolGeometry);
        }
        let capacity = count + max_alloc - 1;
        let mut live = Vec::new();
        live.resize(capacity as usize, false);
        Ok(Self {
            count,
            capacity,
            max_alloc,
            free: 0,
            outstanding: 0,
            live,
        })
    }

    fn grow(&mut self, capacity: u32) {
        self.count += capacity - self.capacity;
        self.capacity = capacity;
        self.live.resize(capacity as usize, false);
    }

    fn take(&mut self, n: u32) -> DmaResult<PoolSpan> {
        if n == 0 || n > self.max_alloc {
            return Err(DmaError::InvalidPoolRequest);
        }
        if self.outstanding + n > self.count {
            return Err(DmaError::PoolOverrun);
        }

        // Retirement normally follows allocation order, so the cursor lands
        // on free elements. Elements still held by an older owner are
        // stepped over rather than handed out twice.
        let mut start = self.free;
        let mut scanned = 0;
        loop {
            if n > self.capacity - start {
                scanned += self.capacity - start;
                start = 0;
            }
            let busy = (start..start + n).rev().find(|&i| self.live[i as usize]);
            match busy {
                None => break,
                Some(i) => {
                    scanned += i + 1 - start;
                    start = i + 1;
                }
            }
            if scanned > self.capacity + n {
                return Err(DmaError::PoolOverrun);
            }
        }

        let span = PoolSpan { start, len: n };
        self.live[span.range()].fill(true);
        self.free = start + n;
        self.outstanding += n;
        Ok(span)
    }

    fn claim(&mut self, start: u32, n: u32) -> DmaResult<PoolSpan> {
        if n == 0 || n > self.max_alloc || start > self.capacity - n {
            return Err(DmaError::InvalidPoolRequest);
        }
        let span = PoolSpan { start, len: n };
        if self.outstanding + n > self.count || self.live[span.range()].contains(&true) {
            return Err(DmaError::PoolOverrun);
        }
        self.live[span.range()].fill(true);
        self.outstanding += n;
        Ok(span)
    }

    fn release(&mut self, span: PoolSpan) {
        for live in &mut self.live[span.range()] {
            debug_assert!(*live, "pool element released twice");
            *live = false;
        }
        self.outstanding = self.outstanding.saturating_sub(span.len);
    }

    fn reset(&mut self) {
        self.free = 0;
        self.outstanding = 0;
        self.live.fill(false);
    }

    fn next(&self, index: u32) -> u32 {
        if index + 1 < self.capacity {
            index + 1
        } else {
            0
        }
    }
}

// =============================================================================
// Plain Pool
// =============================================================================

/// Bump pool of typed elements in ordinary memory
#[derive(Debug)]
pub struct Pool<T> {
    elems: Vec<T>,
    cursor: Cursor,
}

impl<T: Default + Clone> Pool<T> {
    /// Create a pool for `count` elements with requests of up to `max_alloc`
    pub fn new(count: u32, max_alloc: u32) -> ConfigResult<Self> {
        let cursor = Cursor::new(count, max_alloc)?;
        let mut elems = Vec::new();
        elems.resize(cursor.capacity as usize, T::default());
        Ok(Self { elems, cursor })
    }

    /// Allocate `count` contiguous elements, reset to their default value
    pub fn alloc(&mut self, count: u32) -> DmaResult<PoolSpan> {
        let span = self.cursor.take(count)?;
        self.elems[span.range()].fill(T::default());
        Ok(span)
    }

    /// Allocate `count` elements starting at `start`, reset to their
    /// default value
    ///
    /// For owners that partition the pool themselves. The cursor is not
    /// moved.
    pub fn alloc_at(&mut self, start: u32, count: u32) -> DmaResult<PoolSpan> {
        let span = self.cursor.claim(start, count)?;
        self.elems[span.range()].fill(T::default());
        Ok(span)
    }
}

impl<T> Pool<T> {
    /// Elements of a span
    #[must_use]
    pub fn slice(&self, span: PoolSpan) -> &[T] {
        &self.elems[span.range()]
    }

    /// Mutable elements of a span
    pub fn slice_mut(&mut self, span: PoolSpan) -> &mut [T] {
        &mut self.elems[span.range()]
    }

    /// Index of the element following `index`, wrapping at the end
    #[must_use]
    pub fn next(&self, index: u32) -> u32 {
        self.cursor.next(index)
    }

    /// Return a span's elements to the pool
    pub fn release(&mut self, span: PoolSpan) {
        self.cursor.release(span);
    }

    /// Rewind the cursor and forget all outstanding elements
    pub fn reset(&mut self) {
        self.cursor.reset();
    }

    /// Logical capacity
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.cursor.count
    }

    /// Largest single request
    #[must_use]
    pub const fn max_alloc(&self) -> u32 {
        self.cursor.max_alloc
    }

    /// Elements currently outstanding
    #[must_use]
    pub const fn outstanding(&self) -> u32 {
        self.cursor.outstanding
    }
}

// =============================================================================
// DMA-Coherent Region
// =============================================================================

/// Page-aligned, zero-initialized memory shared with the hardware
///
/// The hardware address is the region's own address: the transport assumes
/// an identity-mapped bus, as on the targets it is written for.
pub struct DmaRegion {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl DmaRegion {
    /// Allocate `size` bytes rounded up to a power-of-two number of pages
    pub fn new(size: usize) -> ConfigResult<Self> {
        if size == 0 {
            return Err(ConfigError::InvalidPoolGeometry);
        }
        let pages = size.div_ceil(PAGE_SIZE).next_power_of_two();
        let layout = Layout::from_size_align(pages * PAGE_SIZE, PAGE_SIZE)
            .map_err(|_| ConfigError::InvalidPoolGeometry)?;
        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(ConfigError::InvalidPoolGeometry)?;
        Ok(Self { ptr, layout })
    }

    /// Size in bytes after rounding
    #[must_use]
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    /// Always false; regions are never empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Hardware address of the first byte
    #[must_use]
    pub fn addr(&self) -> u64 {
        self.ptr.as_ptr() as usize as u64
    }

    /// The region's bytes
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `layout.size()` initialized bytes for
        // the lifetime of `self`.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    /// The region's bytes, mutably
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as in `as_slice`; `&mut self` guarantees exclusive access.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for DmaRegion {
    fn drop(&mut self) {
        // SAFETY: `ptr` was returned by `alloc_zeroed` with this `layout`.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl core::fmt::Debug for DmaRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DmaRegion")
            .field("addr", &self.addr())
            .field("len", &self.len())
            .finish()
    }
}

// SAFETY: the region is plain owned memory; access goes through `&`/`&mut`.
unsafe impl Send for DmaRegion {}
// SAFETY: shared access only hands out `&[u8]`.
unsafe impl Sync for DmaRegion {}

// =============================================================================
// DMA Pool
// =============================================================================

/// One element handed out by a [`DmaPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaSlot {
    /// Element index
    pub index: u32,
    /// Hardware address of the element
    pub addr: u64,
}

/// Bump pool of fixed-size buffers in hardware-addressable memory
///
/// Element sizes are rounded up to a power of two so no element crosses a
/// power-of-two boundary larger than itself. Elements are handed out one at
/// a time.
#[derive(Debug)]
pub struct DmaPool {
    region: DmaRegion,
    size: usize,
    cursor: Cursor,
}

impl DmaPool {
    /// Create a DMA pool of `count` elements of at least `size` bytes
    ///
    /// `size` must be a non-zero multiple of 8.
    pub fn new(size: usize, count: u32, max_alloc: u32) -> ConfigResult<Self> {
        if size == 0 || size % POOL_ELEMENT_ALIGN != 0 {
            return Err(ConfigError::InvalidPoolGeometry);
        }
        let mut cursor = Cursor::new(count, max_alloc)?;
        let size = size.next_power_of_two();
        let region = DmaRegion::new(size * cursor.capacity as usize)?;

        // Rounding to whole pages may leave room for more elements
        cursor.grow((region.len() / size) as u32);

        Ok(Self {
            region,
            size,
            cursor,
        })
    }

    /// Allocate one zeroed element
    pub fn alloc_dma(&mut self) -> DmaResult<DmaSlot> {
        let span = self.cursor.take(1)?;
        let offset = span.start as usize * self.size;
        self.region.as_mut_slice()[offset..offset + self.size].fill(0);
        Ok(DmaSlot {
            index: span.start,
            addr: self.region.addr() + offset as u64,
        })
    }

    /// Bytes of an element
    #[must_use]
    pub fn payload(&self, index: u32) -> &[u8] {
        let offset = index as usize * self.size;
        &self.region.as_slice()[offset..offset + self.size]
    }

    /// Mutable bytes of an element
    pub fn payload_mut(&mut self, index: u32) -> &mut [u8] {
        let offset = index as usize * self.size;
        &mut self.region.as_mut_slice()[offset..offset + self.size]
    }

    /// Index of the element following `index`, wrapping at the end
    #[must_use]
    pub fn next(&self, index: u32) -> u32 {
        self.cursor.next(index)
    }

    /// Return one element to the pool
    pub fn release(&mut self, index: u32) {
        self.cursor.release(PoolSpan {
            start: index,
            len: 1,
        });
    }

    /// Hardware address of the pool's first element
    #[must_use]
    pub fn addr(&self) -> u64 {
        self.region.addr()
    }

    /// Element size after rounding
    #[must_use]
    pub const fn element_size(&self) -> usize {
        self.size
    }

    /// Logical capacity after rounding
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.cursor.count
    }

    /// Elements currently outstanding
    #[must_use]
    pub const fn outstanding(&self) -> u32 {
        self.cursor.outstanding
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_geometry_validation() {
        assert!(Pool::<u32>::new(4, 0).is_err());
        assert!(Pool::<u32>::new(2, 3).is_err());
        assert!(Pool::<u32>::new(4, 4).is_ok());
    }

    #[test]
    fn pool_alloc_is_contiguous_and_zeroed() {
        let mut pool: Pool<u32> = Pool::new(8, 4).unwrap();
        let span = pool.alloc(3).unwrap();
        assert_eq!(span, PoolSpan { start: 0, len: 3 });
        pool.slice_mut(span).fill(7);

        let next = pool.alloc(2).unwrap();
        assert_eq!(next.start, 3);
        assert!(pool.slice(next).iter().all(|&v| v == 0));
    }

    #[test]
    fn pool_wraps_when_request_does_not_fit() {
        // count 4, max_alloc 3 -> 6 physical elements
        let mut pool: Pool<u8> = Pool::new(4, 3).unwrap();
        let a = pool.alloc(3).unwrap();
        pool.slice_mut(a).fill(9);
        pool.release(a);
        let b = pool.alloc(2).unwrap();
        assert_eq!(b.start, 3);
        pool.release(b);
        // Only one element left before the end
        let c = pool.alloc(2).unwrap();
        assert_eq!(c.start, 0);
        assert_eq!(pool.slice(c), &[0, 0]);
    }

    #[test]
    fn pool_never_straddles_the_end() {
        let mut pool: Pool<u8> = Pool::new(5, 4).unwrap();
        for n in [1u32, 4, 2, 3, 4, 1, 4, 4] {
            let span = pool.alloc(n).unwrap();
            assert!(span.range().end <= 8);
            pool.release(span);
        }
    }

    #[test]
    fn pool_steps_over_live_elements() {
        let mut pool: Pool<u8> = Pool::new(4, 1).unwrap();
        let spans: alloc::vec::Vec<PoolSpan> = (0..4).map(|_| pool.alloc(1).unwrap()).collect();
        pool.slice_mut(spans[0]).fill(0xaa);
        // Everything but the oldest retires
        for span in &spans[1..] {
            pool.release(*span);
        }
        let reused = pool.alloc(1).unwrap();
        assert_eq!(reused.start, 1);
        assert_eq!(pool.slice(spans[0]), &[0xaa]);
    }

    #[test]
    fn pool_rejects_invalid_requests() {
        let mut pool: Pool<u8> = Pool::new(4, 2).unwrap();
        assert_eq!(pool.alloc(0), Err(DmaError::InvalidPoolRequest));
        assert_eq!(pool.alloc(3), Err(DmaError::InvalidPoolRequest));
    }

    #[test]
    fn pool_rejects_overrun() {
        let mut pool: Pool<u8> = Pool::new(4, 2).unwrap();
        let first = pool.alloc(2).unwrap();
        pool.alloc(2).unwrap();
        assert_eq!(pool.alloc(1), Err(DmaError::PoolOverrun));
        pool.release(first);
        assert!(pool.alloc(1).is_ok());
        assert_eq!(pool.outstanding(), 3);
    }

    #[test]
    fn pool_alloc_at_claims_fixed_spans() {
        let mut pool: Pool<u8> = Pool::new(8, 4).unwrap();
        let a = pool.alloc_at(4, 3).unwrap();
        assert_eq!(a, PoolSpan { start: 4, len: 3 });
        pool.slice_mut(a).fill(5);

        // Overlapping a live span is refused; the span itself is untouched
        assert_eq!(pool.alloc_at(6, 2), Err(DmaError::PoolOverrun));
        assert_eq!(pool.slice(a), &[5, 5, 5]);
        assert_eq!(pool.alloc_at(0, 5), Err(DmaError::InvalidPoolRequest));
        assert_eq!(pool.alloc_at(10, 2), Err(DmaError::InvalidPoolRequest));

        pool.release(a);
        let span = pool.alloc_at(4, 4).unwrap();
        assert!(pool.slice(span).iter().all(|&v| v == 0));
        assert_eq!(pool.outstanding(), 4);
    }

    #[test]
    fn pool_reset_forgets_outstanding() {
        let mut pool: Pool<u8> = Pool::new(2, 2).unwrap();
        pool.alloc(2).unwrap();
        pool.reset();
        assert_eq!(pool.outstanding(), 0);
        assert_eq!(pool.alloc(2).unwrap().start, 0);
    }

    #[test]
    fn pool_next_wraps() {
        let pool: Pool<u8> = Pool::new(3, 2).unwrap();
        assert_eq!(pool.next(0), 1);
        assert_eq!(pool.next(3), 0);
    }

    #[test]
    fn dma_pool_geometry_validation() {
        assert!(DmaPool::new(0, 4, 1).is_err());
        assert!(DmaPool::new(12, 4, 1).is_err());
        assert!(DmaPool::new(24, 4, 5).is_err());
    }

    #[test]
    fn dma_pool_rounds_element_size() {
        let pool = DmaPool::new(24, 4, 1).unwrap();
        assert_eq!(pool.element_size(), 32);
        // One page holds 128 elements of 32 bytes
        assert_eq!(pool.count(), 128);
        assert_eq!(pool.addr() % PAGE_SIZE as u64, 0);
    }

    #[test]
    fn dma_pool_alloc_returns_hardware_address() {
        let mut pool = DmaPool::new(16, 8, 1).unwrap();
        let a = pool.alloc_dma().unwrap();
        let b = pool.alloc_dma().unwrap();
        assert_eq!(a.addr, pool.addr());
        assert_eq!(b.addr, pool.addr() + 16);
        assert_eq!(b.index, pool.next(a.index));
    }

    #[test]
    fn dma_pool_alloc_zeroes_reused_elements() {
        let mut pool = DmaPool::new(8, 1, 1).unwrap();
        let count = pool.count();
        let first = pool.alloc_dma().unwrap();
        pool.payload_mut(first.index).fill(0xff);
        pool.release(first.index);
        for _ in 1..count {
            let slot = pool.alloc_dma().unwrap();
            pool.release(slot.index);
        }
        let again = pool.alloc_dma().unwrap();
        assert_eq!(again.index, first.index);
        assert!(pool.payload(again.index).iter().all(|&b| b == 0));
    }
}
