//! # Kernel Physical Memory Manager
//!
//! Hands out 4 KiB physical page frames to the rest of the kernel. Physical
//! memory is split at the DMA boundary into two pools with different
//! strategies:
//!
//! ```text
//! 0x0                      dma_end                                    top of RAM
//! ├────────────────────────────┼─────────────────────────────────────────────┤
//! │   DmaBitmap (1 bit/page)   │   FreeList (intrusive, LIFO, single pages)  │
//! │   contiguous runs,         │   O(1) push/pop                             │
//! │   next-fit cursor          │                                             │
//! └────────────────────────────┴─────────────────────────────────────────────┘
//! ```
//!
//! * [`bootstrap`] builds both pools once from the bootloader memory map.
//! * [`frame_alloc`] holds the [`PhysicalMemoryManager`] with `allocate` and
//!   `free` (plus their direct-mapped `_hhdm` variants).
//! * [`global`] is the kernel-wide instance behind a `spin::Mutex`.
//!
//! All memory owned by the allocator, including the bitmap words and the
//! free-list links, is reached through a [`PhysMapper`]; on the host,
//! tests point an [`HhdmPhysMapper`] at an ordinary buffer.
//!
//! ## Example
//!
//! ```rust
//! use kernel_info::memory_map::MemoryRegion;
//! use kernel_pmm::{BootstrapConfig, HhdmPhysMapper, PhysicalMemoryManager};
//!
//! #[repr(C, align(4096))]
//! struct Ram([u8; 64 * 4096]);
//! let mut ram = Box::new(Ram([0; 64 * 4096]));
//! let mapper = HhdmPhysMapper::new(ram.0.as_mut_ptr() as u64);
//!
//! let regions = [MemoryRegion::usable(0, 64 * 4096)];
//! let mut pmm = unsafe {
//!     PhysicalMemoryManager::bootstrap(&mapper, &regions, BootstrapConfig::default())
//! }
//! .unwrap();
//!
//! let pa = pmm.allocate(4).unwrap();
//! assert!(!pa.is_zero());
//! pmm.free(pa, 4);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod addresses;
pub mod bitmap;
pub mod bootstrap;
pub mod frame_alloc;
pub mod free_list;
pub mod global;
pub mod phys_mapper;

#[cfg(test)]
mod test_ram;

pub use addresses::{PageFrame, PhysicalAddress, VirtualAddress};
pub use bootstrap::{BootstrapConfig, BootstrapError, LowRegionPolicy};
pub use frame_alloc::{FrameAlloc, PhysicalMemoryManager, PmmError, PmmStats};
pub use phys_mapper::{HhdmPhysMapper, PhysMapper};
