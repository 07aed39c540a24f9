//! # Physical Memory Map
//!
//! The bootloader reports physical memory as an unordered list of regions.
//! The page-frame allocator consumes this list exactly once, read-only, while
//! bootstrapping.

use core::fmt;
use uefi::mem::memory_map::{MemoryDescriptor, MemoryType};

use crate::memory::PAGE_SIZE;

/// Type tag of a [`MemoryRegion`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MemoryRegionKind {
    /// Free RAM the kernel may hand out.
    Usable,
    /// Firmware-reserved or otherwise unknown memory.
    Reserved,
    /// ACPI tables; reclaimable once parsed.
    AcpiReclaimable,
    /// ACPI non-volatile storage.
    AcpiNvs,
    /// Memory the firmware flagged as defective.
    BadMemory,
    /// The kernel image, its stacks and loader-owned buffers (including the memory map copy).
    KernelAndModules,
    /// Memory-mapped I/O.
    Mmio,
}

impl MemoryRegionKind {
    /// Whether the allocator may take ownership of regions of this kind.
    #[inline]
    #[must_use]
    pub const fn is_usable(self) -> bool {
        matches!(self, Self::Usable)
    }
}

impl From<MemoryType> for MemoryRegionKind {
    /// Classifies a UEFI memory type as seen **after** `ExitBootServices`.
    fn from(ty: MemoryType) -> Self {
        match ty {
            MemoryType::CONVENTIONAL | MemoryType::BOOT_SERVICES_CODE | MemoryType::BOOT_SERVICES_DATA => {
                Self::Usable
            }
            MemoryType::LOADER_CODE | MemoryType::LOADER_DATA => Self::KernelAndModules,
            MemoryType::ACPI_RECLAIM => Self::AcpiReclaimable,
            MemoryType::ACPI_NON_VOLATILE => Self::AcpiNvs,
            MemoryType::UNUSABLE => Self::BadMemory,
            MemoryType::MMIO | MemoryType::MMIO_PORT_SPACE => Self::Mmio,
            _ => Self::Reserved,
        }
    }
}

/// One entry of the physical memory map: `[base, base + length)`.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct MemoryRegion {
    /// Physical start address.
    pub base: u64,
    /// Length in bytes.
    pub length: u64,
    /// What the region is used for.
    pub kind: MemoryRegionKind,
}

impl MemoryRegion {
    #[inline]
    #[must_use]
    pub const fn new(base: u64, length: u64, kind: MemoryRegionKind) -> Self {
        Self { base, length, kind }
    }

    /// Shorthand for a [`Usable`](MemoryRegionKind::Usable) region.
    #[inline]
    #[must_use]
    pub const fn usable(base: u64, length: u64) -> Self {
        Self::new(base, length, MemoryRegionKind::Usable)
    }

    #[inline]
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.kind.is_usable()
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Exclusive end address (saturating at the top of the address space).
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base.saturating_add(self.length)
    }

    /// Inclusive last address, or `None` for an empty region.
    #[inline]
    #[must_use]
    pub const fn last_address(&self) -> Option<u64> {
        if self.is_empty() {
            None
        } else {
            Some(self.end() - 1)
        }
    }
}

impl fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MemoryRegion(0x{:016X}..0x{:016X}, {:?})",
            self.base,
            self.end(),
            self.kind
        )
    }
}

impl From<&MemoryDescriptor> for MemoryRegion {
    fn from(desc: &MemoryDescriptor) -> Self {
        Self {
            base: desc.phys_start,
            length: desc.page_count.saturating_mul(PAGE_SIZE),
            kind: MemoryRegionKind::from(desc.ty),
        }
    }
}

/// Iterator over a raw UEFI memory map buffer.
///
/// Descriptors are read with the firmware-reported stride (`desc_size`),
/// which may be larger than `size_of::<MemoryDescriptor>()`.
pub struct UefiMemoryRegions<'a> {
    buffer: &'a [u8],
    desc_size: usize,
    offset: usize,
}

impl<'a> UefiMemoryRegions<'a> {
    /// Yields nothing if `desc_size` is smaller than a descriptor.
    #[must_use]
    pub const fn new(buffer: &'a [u8], desc_size: usize) -> Self {
        Self {
            buffer,
            desc_size,
            offset: 0,
        }
    }
}

impl Iterator for UefiMemoryRegions<'_> {
    type Item = MemoryRegion;

    #[allow(unsafe_code)]
    fn next(&mut self) -> Option<Self::Item> {
        if self.desc_size < size_of::<MemoryDescriptor>() {
            return None;
        }

        let end = self.offset.checked_add(size_of::<MemoryDescriptor>())?;
        let bytes = self.buffer.get(self.offset..end)?;
        self.offset = self.offset.saturating_add(self.desc_size);

        // SAFETY: `bytes` spans exactly one descriptor; the firmware buffer
        // carries no alignment guarantee, hence the unaligned read.
        let desc = unsafe { bytes.as_ptr().cast::<MemoryDescriptor>().read_unaligned() };
        Some(MemoryRegion::from(&desc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_bounds() {
        let r = MemoryRegion::usable(0x10_0000, 0x2_0000);
        assert_eq!(r.end(), 0x12_0000);
        assert_eq!(r.last_address(), Some(0x11_FFFF));
        assert!(r.is_usable());

        let empty = MemoryRegion::usable(0x1000, 0);
        assert!(empty.is_empty());
        assert_eq!(empty.last_address(), None);
    }

    #[test]
    fn uefi_types_after_exit_boot_services() {
        assert!(MemoryRegionKind::from(MemoryType::CONVENTIONAL).is_usable());
        assert!(MemoryRegionKind::from(MemoryType::BOOT_SERVICES_DATA).is_usable());
        assert_eq!(
            MemoryRegionKind::from(MemoryType::LOADER_DATA),
            MemoryRegionKind::KernelAndModules
        );
        assert_eq!(
            MemoryRegionKind::from(MemoryType::ACPI_RECLAIM),
            MemoryRegionKind::AcpiReclaimable
        );
        assert_eq!(
            MemoryRegionKind::from(MemoryType::RUNTIME_SERVICES_DATA),
            MemoryRegionKind::Reserved
        );
    }

    #[test]
    #[allow(unsafe_code)]
    fn walks_descriptors_with_firmware_stride() {
        // Firmware commonly reports a stride larger than the struct.
        let stride = size_of::<MemoryDescriptor>() + 8;
        let descs = [
            (MemoryType::CONVENTIONAL, 0x0, 0x40),
            (MemoryType::RESERVED, 0x4_0000, 0x10),
            (MemoryType::BOOT_SERVICES_CODE, 0x10_0000, 0x20),
        ];

        let mut buffer = vec![0u8; stride * descs.len()];
        for (i, (ty, phys_start, page_count)) in descs.into_iter().enumerate() {
            let desc = MemoryDescriptor {
                ty,
                phys_start,
                virt_start: 0,
                page_count,
                att: uefi::mem::memory_map::MemoryAttribute::empty(),
            };
            unsafe {
                buffer
                    .as_mut_ptr()
                    .add(i * stride)
                    .cast::<MemoryDescriptor>()
                    .write_unaligned(desc);
            }
        }

        let regions: Vec<_> = UefiMemoryRegions::new(&buffer, stride).collect();
        assert_eq!(
            regions,
            [
                MemoryRegion::usable(0x0, 0x4_0000),
                MemoryRegion::new(0x4_0000, 0x1_0000, MemoryRegionKind::Reserved),
                MemoryRegion::usable(0x10_0000, 0x2_0000),
            ]
        );
    }

    #[test]
    fn undersized_stride_yields_nothing() {
        let buffer = [0u8; 256];
        assert_eq!(UefiMemoryRegions::new(&buffer, 4).count(), 0);
    }

    #[test]
    fn truncated_trailing_descriptor_is_ignored() {
        let stride = size_of::<MemoryDescriptor>();
        let buffer = vec![0u8; stride + stride / 2];
        assert_eq!(UefiMemoryRegions::new(&buffer, stride).count(), 1);
    }
}
