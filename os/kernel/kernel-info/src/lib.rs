//! # Kernel Boot Handoff and Memory Layout
//!
//! This crate holds the data the bootloader hands to the kernel and the
//! compile-time memory layout constants the physical memory manager is sized
//! from. It has no behavior of its own beyond decoding the memory map.
//!
//! ## Modules
//!
//! ### Boot Information ([`boot`])
//! The `#[repr(C)]` structures passed from the UEFI loader to the kernel:
//! * **Kernel Entry Point**: function signature and calling convention
//! * **Memory Map Handoff**: a copy of the raw UEFI memory map buffer
//!
//! ### Memory Map ([`memory_map`])
//! The allocator-facing view of physical memory:
//! * [`MemoryRegion`](memory_map::MemoryRegion): `{ base, length, kind }`
//! * [`MemoryRegionKind`](memory_map::MemoryRegionKind): the region's type tag;
//!   only [`Usable`](memory_map::MemoryRegionKind::Usable) memory is ever
//!   handed to the page-frame allocator.
//!
//! ### Memory Layout ([`memory`])
//! * **Page Geometry**: [`PAGE_SIZE`](memory::PAGE_SIZE), [`PAGE_SHIFT`](memory::PAGE_SHIFT)
//! * **Direct Mapping**: [`HHDM_BASE`](memory::HHDM_BASE), the virtual window
//!   through which all of physical memory is reachable
//! * **DMA Ceiling**: [`DMA_APPROX_END`](memory::DMA_APPROX_END), the
//!   approximate upper bound of the low, bitmap-managed memory zone
//!
//! ```text
//! Physical Memory (as seen by the page-frame allocator):
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │  Low memory (first usable       │  bitmap-managed,
//!             │  region at or below the ceiling)│  contiguous runs
//! dma_end     ├─────────────────────────────────┤
//!             │  High memory                    │  free-list-managed,
//!             │  (all other usable regions)     │  single pages
//!             └─────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use kernel_info::memory_map::{MemoryRegion, MemoryRegionKind};
//!
//! let low = MemoryRegion::new(0x0, 0x4_0000, MemoryRegionKind::Usable);
//! assert!(low.is_usable());
//! assert_eq!(low.last_address(), Some(0x3_FFFF));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
pub mod memory_map;
