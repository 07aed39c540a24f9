//! # Kernel Boot Information

use crate::memory_map::UefiMemoryRegions;

/// Kernel function pointer.
///
/// # ABI
/// The ABI is `sysv64` (Rust's `extern "C"`), so `boot_info` arrives in `RDI`.
pub type KernelEntryFn = extern "C" fn(*const KernelBootInfo) -> !;

/// Information the kernel needs right after `ExitBootServices`.
/// Keep this `#[repr(C)]` and prefer fixed-size integers at the ABI boundary.
#[repr(C)]
#[derive(Clone)]
pub struct KernelBootInfo {
    /// Memory map information.
    pub mmap: MemoryMapInfo,

    /// Offset of the direct physical memory map the loader set up, or 0 if
    /// the kernel should assume [`HHDM_BASE`](crate::memory::HHDM_BASE).
    pub hhdm_offset: u64,
}

#[repr(C)]
#[derive(Clone)]
pub struct MemoryMapInfo {
    /// Pointer to the raw UEFI memory map buffer (array of `EFI_MEMORY_DESCRIPTOR` bytes).
    pub mmap_ptr: u64,

    /// Length of the memory map buffer in **bytes**.
    pub mmap_len: u64,

    /// Size of a single memory descriptor in bytes (`EFI_MEMORY_DESCRIPTOR_VERSION` dependent).
    pub mmap_desc_size: u64,

    /// Descriptor version (from UEFI). Kernel can check it matches expectations.
    pub mmap_desc_version: u32,
}

impl MemoryMapInfo {
    /// Iterate the memory map as [`MemoryRegion`](crate::memory_map::MemoryRegion)s.
    ///
    /// # Safety
    /// `mmap_ptr .. mmap_ptr + mmap_len` must be readable in the current
    /// address space and stay untouched for `'a`.
    #[allow(unsafe_code, clippy::cast_possible_truncation)]
    #[must_use]
    pub unsafe fn regions<'a>(&self) -> UefiMemoryRegions<'a> {
        if self.mmap_ptr == 0 || self.mmap_len == 0 {
            return UefiMemoryRegions::new(&[], 0);
        }

        // SAFETY: the caller vouches for the buffer.
        let buffer = unsafe {
            core::slice::from_raw_parts(self.mmap_ptr as *const u8, self.mmap_len as usize)
        };
        UefiMemoryRegions::new(buffer, self.mmap_desc_size as usize)
    }
}
