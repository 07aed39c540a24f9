//! # Allocator Bootstrap
//!
//! Consumes the bootloader memory map exactly once and builds both halves of
//! the [`PhysicalMemoryManager`]:
//!
//! 1. The DMA boundary is the inclusive end of the first usable region that
//!    starts at or below the DMA ceiling (or of all such regions, see
//!    [`LowRegionPolicy`]).
//! 2. The bitmap covers `page_count(dma_end + 1)` pages, rounded up to a
//!    multiple of 64.
//! 3. The bitmap is placed at the start of the first usable region large
//!    enough to hold it and reached through the direct map.
//! 4. Every bit starts out used.
//! 5. The low region(s) are marked free.
//! 6. Page 0 and the bitmap's own pages are marked used.
//! 7. Every page of every usable region above the boundary is pushed onto the
//!    free list (except bitmap pages, should the bitmap live up there).
//!
//! Failing step 3 is the only unrecoverable error of the allocator.

use crate::addresses::{PageFrame, PhysicalAddress};
use crate::bitmap::DmaBitmap;
use crate::frame_alloc::PhysicalMemoryManager;
use crate::free_list::FreeList;
use crate::phys_mapper::PhysMapper;
use core::ops::RangeInclusive;
use kernel_info::memory::{DMA_APPROX_END, PAGE_SIZE, PAGES_PER_BITMAP_WORD, page_count};
use kernel_info::memory_map::MemoryRegion;
use log::{debug, trace};

/// Which usable low regions end up in the bitmap.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum LowRegionPolicy {
    /// Only the first usable region at or below the ceiling defines the DMA
    /// boundary and is freed in the bitmap. Other low regions stay used.
    #[default]
    FirstMatch,
    /// The boundary is the highest end of all usable regions at or below the
    /// ceiling, and all of them are freed in the bitmap.
    Aggregate,
}

/// Bootstrap tuning.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BootstrapConfig {
    /// Low regions must start at or below this address.
    pub dma_ceiling: u64,
    pub low_region_policy: LowRegionPolicy,
}

impl BootstrapConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            dma_ceiling: DMA_APPROX_END,
            low_region_policy: LowRegionPolicy::FirstMatch,
        }
    }

    #[must_use]
    pub const fn with_dma_ceiling(mut self, dma_ceiling: u64) -> Self {
        self.dma_ceiling = dma_ceiling;
        self
    }

    #[must_use]
    pub const fn with_low_region_policy(mut self, policy: LowRegionPolicy) -> Self {
        self.low_region_policy = policy;
        self
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BootstrapError {
    #[error("out of memory: no usable region can hold the {bytes}-byte page bitmap")]
    BitmapPlacement { bytes: u64 },
}

/// Whole pages inside `region`, as an inclusive page-index range.
#[allow(clippy::cast_possible_truncation)]
fn page_span(region: &MemoryRegion) -> Option<RangeInclusive<usize>> {
    let first = region.base.div_ceil(PAGE_SIZE);
    let end = region.end() / PAGE_SIZE;
    (end > first).then(|| first as usize..=(end - 1) as usize)
}

impl<'m, M: PhysMapper> PhysicalMemoryManager<'m, M> {
    /// Build the allocator from the bootloader memory map.
    ///
    /// # Errors
    /// [`BootstrapError::BitmapPlacement`] if no usable region is large
    /// enough to host the bitmap. The kernel treats this as fatal.
    ///
    /// # Safety
    /// - Every usable region must be real RAM that nothing else uses, and
    ///   reachable and writable through `mapper` for `'m`.
    /// - Must be called at most once per physical address space.
    #[allow(clippy::cast_possible_truncation)]
    pub unsafe fn bootstrap(
        mapper: &'m M,
        regions: &[MemoryRegion],
        config: BootstrapConfig,
    ) -> Result<Self, BootstrapError> {
        let is_low =
            |r: &&MemoryRegion| r.is_usable() && !r.is_empty() && r.base <= config.dma_ceiling;
        let low_regions = match config.low_region_policy {
            LowRegionPolicy::FirstMatch => 1,
            LowRegionPolicy::Aggregate => usize::MAX,
        };

        let dma_end = regions
            .iter()
            .filter(is_low)
            .take(low_regions)
            .filter_map(MemoryRegion::last_address)
            .max()
            .unwrap_or(0);

        let dma_page_count = page_count(dma_end + 1)
            .next_multiple_of(PAGES_PER_BITMAP_WORD as u64) as usize;
        let bitmap_bytes = (dma_page_count / 8) as u64;
        let bitmap_pages = page_count(bitmap_bytes) as usize;

        let bitmap_first = regions
            .iter()
            .filter(|r| r.is_usable())
            .filter_map(page_span)
            .find(|span| span.clone().count() >= bitmap_pages)
            .map(|span| *span.start())
            .ok_or(BootstrapError::BitmapPlacement {
                bytes: bitmap_bytes,
            })?;
        let bitmap_span = bitmap_first..=bitmap_first + bitmap_pages - 1;
        let bitmap_base = PageFrame::from_index(bitmap_first).base();

        // SAFETY: the region is usable RAM, mapped through `mapper` (caller contract).
        let words = unsafe {
            core::slice::from_raw_parts_mut(
                mapper.phys_to_virt(bitmap_base).as_mut_ptr::<u64>(),
                dma_page_count / PAGES_PER_BITMAP_WORD,
            )
        };
        let mut bitmap = DmaBitmap::new(words);
        bitmap.mark_used(0, dma_page_count - 1);

        for span in regions
            .iter()
            .filter(is_low)
            .take(low_regions)
            .filter_map(page_span)
        {
            let last = (*span.end()).min(dma_page_count - 1);
            if *span.start() <= last {
                bitmap.mark_free(*span.start(), last);
            }
        }

        // Physical address zero doubles as "no address"; never hand it out.
        bitmap.mark_used(0, 0);

        if bitmap_first < dma_page_count {
            bitmap.mark_used(bitmap_first, (*bitmap_span.end()).min(dma_page_count - 1));
        }

        let mut free_list = FreeList::new();
        for region in regions.iter().filter(|r| r.is_usable() && r.base > dma_end) {
            let Some(span) = page_span(region) else {
                continue;
            };
            let before = free_list.len();
            for index in span.filter(|index| !bitmap_span.contains(index)) {
                // SAFETY: a usable high page, owned by the allocator from now on.
                unsafe { free_list.push(mapper, PageFrame::from_index(index)) };
            }
            trace!("pmm: {} high page(s) from {region:?}", free_list.len() - before);
        }

        debug!("pmm: dma_end_addr={dma_end:#x}, dma_numpages={dma_page_count}");
        debug!("pmm: dma_bitmap={bitmap_base} ({bitmap_pages} page(s))");

        Ok(Self::from_parts(
            mapper,
            bitmap,
            bitmap_base,
            free_list,
            PhysicalAddress::new(dma_end),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phys_mapper::HhdmPhysMapper;
    use crate::test_ram::TestRam;
    use kernel_info::memory_map::MemoryRegionKind;

    #[test]
    fn page_span_trims_to_whole_pages() {
        assert_eq!(page_span(&MemoryRegion::usable(0x0, 0x4_0000)), Some(0..=0x3F));
        assert_eq!(page_span(&MemoryRegion::usable(0x800, 0x2000)), Some(1..=1));
        assert_eq!(page_span(&MemoryRegion::usable(0x800, 0x1000)), None);
        assert_eq!(page_span(&MemoryRegion::usable(0x1000, 0)), None);
    }

    #[test]
    fn bitmap_is_sized_in_whole_words() {
        // 65 pages round up to 128.
        let ram = TestRam::covering(0x4_1000);
        let mapper = ram.mapper();
        let regions = [MemoryRegion::usable(0x0, 0x4_1000)];
        let pmm = unsafe {
            PhysicalMemoryManager::bootstrap(&mapper, &regions, BootstrapConfig::default())
        }
        .unwrap();

        assert_eq!(pmm.dma_end().as_u64(), 0x4_0FFF);
        assert_eq!(pmm.dma_page_count(), 128);
        // Page 0 holds the bitmap; pages 65..128 lie past the region.
        assert_eq!(pmm.free_bitmap_pages(), 64);
        assert!(!pmm.is_free_in_bitmap(PageFrame::from_index(65)));
    }

    #[test]
    fn bitmap_above_the_boundary_is_not_on_the_free_list() {
        // The low region holds no whole page, so the bitmap goes high.
        let ram = TestRam::covering(0x10_4000);
        let mapper = ram.mapper();
        let regions = [
            MemoryRegion::usable(0x800, 0x800),
            MemoryRegion::usable(0x10_0000, 0x4000),
        ];
        let pmm = unsafe {
            PhysicalMemoryManager::bootstrap(&mapper, &regions, BootstrapConfig::default())
        }
        .unwrap();

        assert_eq!(pmm.dma_end().as_u64(), 0xFFF);
        assert_eq!(pmm.bitmap_base().as_u64(), 0x10_0000);
        assert_eq!(pmm.free_list_len(), 3);
        assert!(pmm.free_list_frames().all(|f| f.base().as_u64() != 0x10_0000));
    }

    #[test]
    fn unusable_regions_are_ignored() {
        let ram = TestRam::covering(0x2_0000);
        let mapper = ram.mapper();
        let regions = [
            MemoryRegion::new(0x0, 0x1_0000, MemoryRegionKind::Reserved),
            MemoryRegion::usable(0x1_0000, 0x1_0000),
        ];
        let pmm = unsafe {
            PhysicalMemoryManager::bootstrap(&mapper, &regions, BootstrapConfig::default())
        }
        .unwrap();

        assert_eq!(pmm.dma_end().as_u64(), 0x1_FFFF);
        assert_eq!(pmm.bitmap_base().as_u64(), 0x1_0000);
        // 16 pages in the region, one holds the bitmap.
        assert_eq!(pmm.free_bitmap_pages(), 15);
        assert!((0..16).all(|i| !pmm.is_free_in_bitmap(PageFrame::from_index(i))));
    }

    #[test]
    fn first_match_ignores_later_low_regions() {
        let ram = TestRam::covering(0x20_0000);
        let mapper = ram.mapper();
        let regions = [
            MemoryRegion::usable(0x0, 0x4_0000),
            MemoryRegion::usable(0x8_0000, 0x4_0000),
        ];
        let pmm = unsafe {
            PhysicalMemoryManager::bootstrap(&mapper, &regions, BootstrapConfig::default())
        }
        .unwrap();

        assert_eq!(pmm.dma_end().as_u64(), 0x3_FFFF);
        assert_eq!(pmm.dma_page_count(), 64);
        assert_eq!(pmm.free_bitmap_pages(), 63);
        // The second low region lies above the boundary and feeds the free list.
        assert_eq!(pmm.free_list_len(), 64);
    }

    #[test]
    fn aggregate_frees_every_low_region() {
        let ram = TestRam::covering(0x20_0000);
        let mapper = ram.mapper();
        let regions = [
            MemoryRegion::usable(0x0, 0x4_0000),
            MemoryRegion::new(0x4_0000, 0x4_0000, MemoryRegionKind::Reserved),
            MemoryRegion::usable(0x8_0000, 0x4_0000),
        ];
        let config = BootstrapConfig::default().with_low_region_policy(LowRegionPolicy::Aggregate);
        let pmm = unsafe { PhysicalMemoryManager::bootstrap(&mapper, &regions, config) }.unwrap();

        assert_eq!(pmm.dma_end().as_u64(), 0xB_FFFF);
        assert_eq!(pmm.dma_page_count(), 192);
        assert_eq!(pmm.free_bitmap_pages(), 63 + 64);
        assert!(!pmm.is_free_in_bitmap(PageFrame::from_index(0x40)));
        assert!(pmm.is_free_in_bitmap(PageFrame::from_index(0x80)));
        assert_eq!(pmm.free_list_len(), 0);
    }

    #[test]
    fn dma_ceiling_bounds_the_low_regions() {
        let ram = TestRam::covering(0x2_0000);
        let mapper = ram.mapper();
        let regions = [MemoryRegion::usable(0x1_0000, 0x1_0000)];
        let config = BootstrapConfig::default().with_dma_ceiling(0x8000);
        let pmm = unsafe { PhysicalMemoryManager::bootstrap(&mapper, &regions, config) }.unwrap();

        // Nothing qualifies as low memory: only page 0 is covered, and it is reserved.
        assert_eq!(pmm.dma_end().as_u64(), 0);
        assert_eq!(pmm.free_bitmap_pages(), 0);
        assert_eq!(pmm.bitmap_base().as_u64(), 0x1_0000);
        assert_eq!(pmm.free_list_len(), 15);
    }

    #[test]
    fn bitmap_placement_failure_is_reported() {
        let mapper = HhdmPhysMapper::new(0);
        // Usable, but not a single whole page to put the bitmap in.
        let regions = [MemoryRegion::usable(0x0, 0x800)];

        let result = unsafe {
            PhysicalMemoryManager::bootstrap(&mapper, &regions, BootstrapConfig::default())
        };
        let err = result.err().unwrap();
        assert_eq!(err, BootstrapError::BitmapPlacement { bytes: 8 });
        assert_eq!(
            err.to_string(),
            "out of memory: no usable region can hold the 8-byte page bitmap"
        );
    }
}
