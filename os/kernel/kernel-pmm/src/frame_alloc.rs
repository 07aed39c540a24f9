//! # Physical Page-Frame Allocator
//!
//! Two strategies share one physical address space, split at the DMA
//! boundary:
//!
//! * **Below** the boundary a [`DmaBitmap`] tracks every page; requests for
//!   contiguous runs of `n` pages are served by a next-fit scan.
//! * **Above** the boundary free pages sit on an intrusive [`FreeList`];
//!   single-page requests pop its head in O(1).
//!
//! ## Locking
//!
//! [`PhysicalMemoryManager`] contains no lock. Every mutating operation takes
//! `&mut self`, so whoever calls it must hold the manager exclusively: in the
//! kernel that is the `spin::Mutex` in [`global`](crate::global), held for
//! the duration of each call.

use crate::addresses::{PageFrame, PhysicalAddress, VirtualAddress};
use crate::bitmap::DmaBitmap;
use crate::free_list::FreeList;
use crate::phys_mapper::PhysMapper;
use log::trace;

/// Allocation failure. Recoverable; the caller decides how to react.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PmmError {
    #[error("cannot allocate zero pages")]
    ZeroPages,
    #[error("out of physical memory: no run of {pages} free page(s)")]
    OutOfMemory { pages: usize },
    #[error("physical memory allocator not initialized")]
    NotInitialized,
}

/// Minimal single-frame interface for page-table code.
pub trait FrameAlloc {
    /// Allocate one 4 KiB frame. Returns `None` on out-of-memory.
    fn alloc_4k(&mut self) -> Option<PageFrame>;

    /// Return a frame obtained from [`alloc_4k`](Self::alloc_4k).
    fn free_4k(&mut self, frame: PageFrame);
}

/// Point-in-time accounting snapshot.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PmmStats {
    /// Inclusive last address of bitmap-managed memory.
    pub dma_end: PhysicalAddress,
    /// Pages covered by the bitmap (multiple of 64).
    pub dma_page_count: usize,
    /// Free pages in the bitmap.
    pub free_bitmap_pages: usize,
    /// Free pages on the free list.
    pub free_list_pages: usize,
    /// Next-fit cursor.
    pub cursor: usize,
}

impl PmmStats {
    #[must_use]
    pub const fn free_pages(&self) -> usize {
        self.free_bitmap_pages + self.free_list_pages
    }
}

/// Hybrid bitmap / free-list page-frame allocator.
///
/// Built once by [`bootstrap`](Self::bootstrap) and never torn down.
pub struct PhysicalMemoryManager<'m, M: PhysMapper> {
    mapper: &'m M,
    bitmap: DmaBitmap<'m>,
    bitmap_base: PhysicalAddress,
    free_list: FreeList,
    /// Inclusive end of bitmap-managed memory.
    dma_end: PhysicalAddress,
    /// Next-fit hint, always `< bitmap.page_count()`.
    cursor: usize,
}

impl<'m, M: PhysMapper> PhysicalMemoryManager<'m, M> {
    pub(crate) const fn from_parts(
        mapper: &'m M,
        bitmap: DmaBitmap<'m>,
        bitmap_base: PhysicalAddress,
        free_list: FreeList,
        dma_end: PhysicalAddress,
    ) -> Self {
        Self {
            mapper,
            bitmap,
            bitmap_base,
            free_list,
            dma_end,
            cursor: 0,
        }
    }

    /// Allocate `npages` physically contiguous pages.
    ///
    /// Single pages come from the free list while it has any; everything
    /// else is claimed from the bitmap with a next-fit scan that starts at
    /// the cursor and wraps around to the front once.
    ///
    /// # Errors
    /// - [`PmmError::ZeroPages`] if `npages == 0`.
    /// - [`PmmError::OutOfMemory`] if no run of `npages` free pages exists.
    pub fn allocate(&mut self, npages: usize) -> Result<PhysicalAddress, PmmError> {
        if npages == 0 {
            return Err(PmmError::ZeroPages);
        }

        if npages == 1 {
            // SAFETY: the list was filled through this very mapper.
            if let Some(frame) = unsafe { self.free_list.pop(self.mapper) } {
                return Ok(frame.base());
            }
        }

        let Some(first) = self.claim_next_fit(npages) else {
            trace!("pmm: no run of {npages} free page(s), cursor={}", self.cursor);
            return Err(PmmError::OutOfMemory { pages: npages });
        };
        Ok(PageFrame::from_index(first).base())
    }

    /// Like [`allocate`](Self::allocate), but returns the direct-mapped address.
    ///
    /// # Errors
    /// See [`allocate`](Self::allocate).
    pub fn allocate_hhdm(&mut self, npages: usize) -> Result<VirtualAddress, PmmError> {
        let pa = self.allocate(npages)?;
        Ok(self.mapper.phys_to_virt(pa))
    }

    /// Return `npages` pages starting at `address`.
    ///
    /// The zero address and `npages == 0` are ignored. `address` and `npages`
    /// must describe a live allocation; this is not checked.
    pub fn free(&mut self, address: PhysicalAddress, npages: usize) {
        if address.is_zero() || npages == 0 {
            return;
        }
        debug_assert!(address.is_page_aligned(), "unaligned free of {address}");

        let first = address.frame();
        if npages == 1 && address > self.dma_end {
            // SAFETY: the caller returns ownership of a page above the boundary.
            unsafe { self.free_list.push(self.mapper, first) };
            return;
        }

        let page_count = self.bitmap.page_count();
        let first_index = first.index();
        let last_index = first_index + npages - 1;

        if first_index < page_count {
            self.bitmap
                .mark_free(first_index, last_index.min(page_count - 1));
            self.cursor = first_index;
        }

        // Tail pages past the bitmap's coverage are high memory.
        for index in first_index.max(page_count)..=last_index {
            // SAFETY: as above.
            unsafe { self.free_list.push(self.mapper, PageFrame::from_index(index)) };
        }
    }

    /// Like [`free`](Self::free), for an address from [`allocate_hhdm`](Self::allocate_hhdm).
    /// A null address is ignored.
    pub fn free_hhdm(&mut self, address: VirtualAddress, npages: usize) {
        if address.is_null() {
            return;
        }
        let pa = self.mapper.virt_to_phys(address);
        self.free(pa, npages);
    }

    /// Try every window start once: `cursor..=last_start`, then `0..cursor`.
    fn claim_next_fit(&mut self, npages: usize) -> Option<usize> {
        let page_count = self.bitmap.page_count();
        let last_start = page_count.checked_sub(npages)?;

        let forward = self.cursor..=last_start;
        let wrapped = 0..self.cursor.min(last_start + 1);

        let bitmap = &mut self.bitmap;
        let first = forward
            .chain(wrapped)
            .find(|&start| bitmap.try_mark_used(start, start + npages - 1))?;

        self.cursor = (first + npages) % page_count;
        Some(first)
    }

    /// Inclusive last address of bitmap-managed memory.
    #[must_use]
    pub const fn dma_end(&self) -> PhysicalAddress {
        self.dma_end
    }

    /// Pages covered by the bitmap.
    #[must_use]
    pub const fn dma_page_count(&self) -> usize {
        self.bitmap.page_count()
    }

    /// Physical location of the bitmap itself.
    #[must_use]
    pub const fn bitmap_base(&self) -> PhysicalAddress {
        self.bitmap_base
    }

    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub const fn free_list_len(&self) -> usize {
        self.free_list.len()
    }

    #[must_use]
    pub fn free_bitmap_pages(&self) -> usize {
        self.bitmap.count_free()
    }

    #[must_use]
    pub fn free_pages(&self) -> usize {
        self.free_bitmap_pages() + self.free_list_len()
    }

    /// Whether the bitmap currently marks `frame` free.
    #[must_use]
    pub fn is_free_in_bitmap(&self, frame: PageFrame) -> bool {
        self.bitmap.is_free(frame.index())
    }

    /// Frames on the free list, most recently freed first.
    pub fn free_list_frames(&self) -> impl Iterator<Item = PageFrame> + '_ {
        // SAFETY: the list was filled through `self.mapper` and `&self` pins it.
        unsafe { self.free_list.iter(self.mapper) }
    }

    #[must_use]
    pub fn stats(&self) -> PmmStats {
        PmmStats {
            dma_end: self.dma_end,
            dma_page_count: self.dma_page_count(),
            free_bitmap_pages: self.free_bitmap_pages(),
            free_list_pages: self.free_list_len(),
            cursor: self.cursor,
        }
    }
}

impl<M: PhysMapper> FrameAlloc for PhysicalMemoryManager<'_, M> {
    fn alloc_4k(&mut self) -> Option<PageFrame> {
        self.allocate(1).ok().map(PhysicalAddress::frame)
    }

    fn free_4k(&mut self, frame: PageFrame) {
        self.free(frame.base(), 1);
    }
}
