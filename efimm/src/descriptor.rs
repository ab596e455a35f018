//! UEFI memory descriptors.
//!
//! The firmware tells us the stride (`descriptor_size`) at runtime and is
//! free to append fields past the v1 layout, so descriptors are always read
//! out of a stride-sized slice, never cast from a fixed-size struct.

use crate::config::pages_to_bytes;

/// Memory type as reported in `EFI_MEMORY_DESCRIPTOR.Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EfiMemoryType {
    /// Reserved by firmware. Do not touch.
    Reserved = 0,
    LoaderCode = 1,
    LoaderData = 2,
    BootServicesCode = 3,
    BootServicesData = 4,
    RuntimeServicesCode = 5,
    RuntimeServicesData = 6,
    /// Free memory
    Conventional = 7,
    Unusable = 8,
    AcpiReclaim = 9,
    AcpiNvs = 10,
    Mmio = 11,
    MmioPortSpace = 12,
    /// Processor reserved (PAL code on Itanium)
    PalCode = 13,
    /// Persistent memory (NVDIMM)
    Persistent = 14,
}

impl EfiMemoryType {
    /// Convert from raw UEFI memory type value.
    ///
    /// OEM and OS-defined ranges (0x7000_0000 and up) come back as `None`.
    pub const fn from_raw(value: u32) -> Option<Self> {
        Some(match value {
            0 => EfiMemoryType::Reserved,
            1 => EfiMemoryType::LoaderCode,
            2 => EfiMemoryType::LoaderData,
            3 => EfiMemoryType::BootServicesCode,
            4 => EfiMemoryType::BootServicesData,
            5 => EfiMemoryType::RuntimeServicesCode,
            6 => EfiMemoryType::RuntimeServicesData,
            7 => EfiMemoryType::Conventional,
            8 => EfiMemoryType::Unusable,
            9 => EfiMemoryType::AcpiReclaim,
            10 => EfiMemoryType::AcpiNvs,
            11 => EfiMemoryType::Mmio,
            12 => EfiMemoryType::MmioPortSpace,
            13 => EfiMemoryType::PalCode,
            14 => EfiMemoryType::Persistent,
            _ => return None,
        })
    }
}

/// One decoded `EFI_MEMORY_DESCRIPTOR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryDescriptor {
    /// Raw type; may be outside [`EfiMemoryType`].
    pub raw_type: u32,
    pub physical_start: u64,
    pub virtual_start: u64,
    /// Number of 4KB pages
    pub number_of_pages: u64,
    pub attribute: u64,
}

impl MemoryDescriptor {
    /// Size of the v1 descriptor layout:
    ///
    /// ```text
    /// offset 0:  u32 Type
    /// offset 4:  u32 Padding
    /// offset 8:  u64 PhysicalStart
    /// offset 16: u64 VirtualStart
    /// offset 24: u64 NumberOfPages
    /// offset 32: u64 Attribute
    /// ```
    pub const SIZE: usize = 40;

    /// Decode from the start of `bytes`. `None` if shorter than [`Self::SIZE`].
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..Self::SIZE)?;
        Some(Self {
            raw_type: read_u32(bytes, 0),
            physical_start: read_u64(bytes, 8),
            virtual_start: read_u64(bytes, 16),
            number_of_pages: read_u64(bytes, 24),
            attribute: read_u64(bytes, 32),
        })
    }

    pub const fn memory_type(&self) -> Option<EfiMemoryType> {
        EfiMemoryType::from_raw(self.raw_type)
    }

    /// Size in bytes.
    pub const fn size(&self) -> u64 {
        pages_to_bytes(self.number_of_pages)
    }

    /// Physical end address (exclusive).
    pub const fn physical_end(&self) -> u64 {
        self.physical_start.saturating_add(self.size())
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

/// Walks a memory map buffer one `descriptor_size` at a time.
///
/// A trailing partial descriptor is not yielded.
#[derive(Debug, Clone)]
pub struct DescriptorIter<'a> {
    chunks: core::slice::ChunksExact<'a, u8>,
}

impl<'a> DescriptorIter<'a> {
    /// `None` when the stride cannot hold a v1 descriptor.
    pub fn new(map: &'a [u8], descriptor_size: usize) -> Option<Self> {
        if descriptor_size < MemoryDescriptor::SIZE {
            return None;
        }
        Some(Self {
            chunks: map.chunks_exact(descriptor_size),
        })
    }
}

impl Iterator for DescriptorIter<'_> {
    type Item = MemoryDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        self.chunks.next().and_then(MemoryDescriptor::parse)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for DescriptorIter<'_> {}
