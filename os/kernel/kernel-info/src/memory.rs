//! # Memory Layout

/// Size of a physical page frame in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// `log2(PAGE_SIZE)`.
pub const PAGE_SHIFT: u32 = 12;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Approximate upper bound (inclusive) of the low memory zone.
///
/// The first usable region starting at or below this address defines the
/// DMA boundary. Memory below the boundary is tracked by a bitmap and can be
/// handed out as physically contiguous runs; everything above it is served
/// one page at a time.
pub const DMA_APPROX_END: u64 = 0x3FF_FFFF;

/// Number of pages tracked by one bitmap word.
pub const PAGES_PER_BITMAP_WORD: usize = u64::BITS as usize;

/// Number of whole or partial pages needed to hold `bytes` bytes.
#[inline]
#[must_use]
pub const fn page_count(bytes: u64) -> u64 {
    bytes.div_ceil(PAGE_SIZE)
}

const _: () = {
    assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
    assert!(DMA_APPROX_END < HHDM_BASE);
};
