#![allow(dead_code)]

use kernel_info::memory::PAGE_SIZE;
use kernel_info::memory_map::{MemoryRegion, MemoryRegionKind};
use kernel_pmm::HhdmPhysMapper;

#[derive(Clone)]
#[repr(C, align(4096))]
pub struct Frame([u8; PAGE_SIZE as usize]);

/// Host buffer standing in for physical RAM starting at address 0.
pub struct Ram {
    frames: Vec<Frame>,
}

impl Ram {
    pub fn covering(end: u64) -> Self {
        let n = usize::try_from(end.div_ceil(PAGE_SIZE)).unwrap();
        Self {
            frames: vec![Frame([0; PAGE_SIZE as usize]); n],
        }
    }

    pub fn mapper(&mut self) -> HhdmPhysMapper {
        HhdmPhysMapper::new(self.frames.as_mut_ptr() as u64)
    }
}

/// 256 KiB of low memory, a reserved hole, and 256 KiB above 1 MiB.
pub const LOW_END: u64 = 0x4_0000;
pub const HIGH_BASE: u64 = 0x10_0000;
pub const HIGH_LEN: u64 = 0x4_0000;

pub fn memory_map() -> [MemoryRegion; 3] {
    [
        MemoryRegion::usable(0, LOW_END),
        MemoryRegion::new(LOW_END, HIGH_BASE - LOW_END, MemoryRegionKind::Reserved),
        MemoryRegion::usable(HIGH_BASE, HIGH_LEN),
    ]
}

/// Backing store for [`memory_map`].
pub fn ram() -> Ram {
    Ram::covering(HIGH_BASE + HIGH_LEN)
}

/// Page 0 and the bitmap page are taken out of the 64 low pages.
pub const LOW_FREE: usize = 63;
pub const HIGH_FREE: usize = 64;
