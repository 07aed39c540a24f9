//! # Direct Physical-to-Virtual Mapping
//!
//! The allocator never owns virtual mappings; it reaches physical memory
//! (its own bitmap and the free-list nodes stored inside free pages) through
//! a fixed window in which every physical address `pa` is visible at
//! `offset + pa`.
//!
//! ## Why is this a trait?
//! - The kernel uses the higher-half direct map at [`HHDM_BASE`].
//! - Host-side tests point the same window at an ordinary page-aligned buffer
//!   that stands in for RAM.
//!
//! ## Example
//! ```rust
//! use kernel_pmm::addresses::PhysicalAddress;
//! use kernel_pmm::phys_mapper::{HhdmPhysMapper, PhysMapper};
//!
//! let mapper = HhdmPhysMapper::KERNEL;
//! let va = mapper.phys_to_virt(PhysicalAddress::new(0x1234_0000));
//! assert_eq!(mapper.virt_to_phys(va), PhysicalAddress::new(0x1234_0000));
//! ```

use crate::addresses::{PhysicalAddress, VirtualAddress};
use kernel_info::memory::HHDM_BASE;

/// Translates between physical addresses and their direct-mapped virtual
/// counterparts.
///
/// # Safety
/// Implementations must return addresses that, for every physical page the
/// allocator manages, are mapped writable in the current address space for
/// as long as the mapper is in use.
pub trait PhysMapper {
    /// Virtual address through which `pa` is reachable.
    fn phys_to_virt(&self, pa: PhysicalAddress) -> VirtualAddress;

    /// Inverse of [`phys_to_virt`](Self::phys_to_virt).
    fn virt_to_phys(&self, va: VirtualAddress) -> PhysicalAddress;

    /// Convert a *physical* address to a usable mutable reference.
    ///
    /// # Safety
    /// - `pa` must be mapped writable through this mapper.
    /// - `pa` must be suitably aligned for `T`, and the bytes at `pa` must be
    ///   a valid `T` for reads.
    /// - No other reference to the same bytes may be live for `'a`.
    #[inline]
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = self.phys_to_virt(pa).as_mut_ptr::<T>();
        // SAFETY: Caller must ensure the physical address is valid and mapped.
        unsafe { &mut *va }
    }
}

/// [`PhysMapper`] for a fixed-offset direct map.
///
/// [`HhdmPhysMapper::KERNEL`] is the kernel's higher-half direct map; any
/// other offset describes an alternative window over physical memory.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HhdmPhysMapper {
    offset: u64,
}

impl HhdmPhysMapper {
    /// The kernel's higher-half direct map at [`HHDM_BASE`].
    pub const KERNEL: Self = Self::new(HHDM_BASE);

    #[inline]
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self { offset }
    }

    #[inline]
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }
}

impl Default for HhdmPhysMapper {
    fn default() -> Self {
        Self::KERNEL
    }
}

impl PhysMapper for HhdmPhysMapper {
    #[inline]
    fn phys_to_virt(&self, pa: PhysicalAddress) -> VirtualAddress {
        VirtualAddress::new(self.offset.wrapping_add(pa.as_u64()))
    }

    #[inline]
    fn virt_to_phys(&self, va: VirtualAddress) -> PhysicalAddress {
        PhysicalAddress::new(va.as_u64().wrapping_sub(self.offset))
    }
}
