//! The kernel-wide allocator instance.
//!
//! Initialized once during early boot from the bootloader memory map, then
//! shared behind a spinlock held for the duration of every operation.

use crate::addresses::{PhysicalAddress, VirtualAddress};
use crate::bootstrap::BootstrapConfig;
use crate::frame_alloc::{PhysicalMemoryManager, PmmError};
use crate::phys_mapper::HhdmPhysMapper;
use kernel_info::memory_map::MemoryRegion;
use spin::{Mutex, Once};

pub type KernelPmm = PhysicalMemoryManager<'static, HhdmPhysMapper>;

static KERNEL_MAPPER: HhdmPhysMapper = HhdmPhysMapper::KERNEL;
static PMM: Once<Mutex<KernelPmm>> = Once::new();

/// Bootstrap the kernel allocator over the direct map at `HHDM_BASE`.
///
/// Later calls return the existing instance and ignore `regions`.
///
/// # Safety
/// See [`PhysicalMemoryManager::bootstrap`]; all usable RAM must be mapped
/// at `HHDM_BASE`.
///
/// # Panics
/// If no usable region can hold the page bitmap. The kernel cannot continue
/// without a physical memory allocator.
pub unsafe fn init_physical_memory_allocator_once(
    regions: &[MemoryRegion],
) -> &'static Mutex<KernelPmm> {
    unsafe {
        init_physical_memory_allocator_once_with(&KERNEL_MAPPER, regions, BootstrapConfig::default())
    }
}

/// Like [`init_physical_memory_allocator_once`], with an explicit direct map
/// and bootstrap configuration.
///
/// # Safety
/// See [`PhysicalMemoryManager::bootstrap`].
///
/// # Panics
/// If no usable region can hold the page bitmap.
#[allow(clippy::panic)]
pub unsafe fn init_physical_memory_allocator_once_with(
    mapper: &'static HhdmPhysMapper,
    regions: &[MemoryRegion],
    config: BootstrapConfig,
) -> &'static Mutex<KernelPmm> {
    PMM.call_once(|| {
        // SAFETY: forwarded to the caller.
        match unsafe { PhysicalMemoryManager::bootstrap(mapper, regions, config) } {
            Ok(pmm) => Mutex::new(pmm),
            Err(e) => panic!("pmm: {e}"),
        }
    })
}

/// Run `f` with the allocator locked.
///
/// # Errors
/// [`PmmError::NotInitialized`] before [`init_physical_memory_allocator_once`].
#[inline]
pub fn with_pmm<R>(f: impl FnOnce(&mut KernelPmm) -> R) -> Result<R, PmmError> {
    let pmm = PMM.get().ok_or(PmmError::NotInitialized)?;
    Ok(f(&mut pmm.lock()))
}

/// # Errors
/// See [`PhysicalMemoryManager::allocate`].
pub fn alloc_pages(npages: usize) -> Result<PhysicalAddress, PmmError> {
    with_pmm(|pmm| pmm.allocate(npages))?
}

/// # Errors
/// See [`PhysicalMemoryManager::allocate_hhdm`].
pub fn alloc_pages_hhdm(npages: usize) -> Result<VirtualAddress, PmmError> {
    with_pmm(|pmm| pmm.allocate_hhdm(npages))?
}

/// # Errors
/// [`PmmError::NotInitialized`] before initialization.
pub fn free_pages(address: PhysicalAddress, npages: usize) -> Result<(), PmmError> {
    with_pmm(|pmm| pmm.free(address, npages))
}

/// # Errors
/// [`PmmError::NotInitialized`] before initialization.
pub fn free_pages_hhdm(address: VirtualAddress, npages: usize) -> Result<(), PmmError> {
    with_pmm(|pmm| pmm.free_hhdm(address, npages))
}

/// Free pages across both pools, or 0 before initialization.
#[must_use]
pub fn free_page_count() -> usize {
    with_pmm(|pmm| pmm.free_pages()).unwrap_or(0)
}
