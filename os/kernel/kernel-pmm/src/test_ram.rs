//! Host memory standing in for physical RAM in unit tests.

use crate::phys_mapper::HhdmPhysMapper;
use kernel_info::memory::{PAGE_SIZE, page_count};

/// A 4 KiB-aligned raw frame.
#[derive(Clone)]
#[repr(C, align(4096))]
pub struct Frame([u8; PAGE_SIZE as usize]);

/// Simulated physical memory `[0, frames * PAGE_SIZE)`.
///
/// Physical address `pa` lives at `base + pa`, so an [`HhdmPhysMapper`] with
/// `offset = base` is a faithful direct map over it.
pub struct TestRam {
    #[allow(dead_code)] // owns the memory `base` points into
    frames: Vec<Frame>,
    base: u64,
}

impl TestRam {
    pub fn with_frames(n: usize) -> Self {
        let mut frames = vec![Frame([0; PAGE_SIZE as usize]); n];
        let base = frames.as_mut_ptr() as u64;
        Self { frames, base }
    }

    /// Enough RAM to back every physical address below `end`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn covering(end: u64) -> Self {
        Self::with_frames(page_count(end) as usize)
    }

    pub const fn mapper(&self) -> HhdmPhysMapper {
        HhdmPhysMapper::new(self.base)
    }
}
