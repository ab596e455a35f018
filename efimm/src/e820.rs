//! E820 memory map built from the UEFI map.
//!
//! Legacy kernels want a short, address-ordered list of four region types.
//! The UEFI map is walked once in firmware order; each classified region is
//! appended through a merge-aware insert, so the result never contains two
//! touching entries of the same type and needs no compaction pass.

use log::{debug, warn};

use crate::config::{E820_MAX, LEGACY_HOLE_END, LEGACY_HOLE_START};
use crate::descriptor::{DescriptorIter, EfiMemoryType, MemoryDescriptor};
use crate::error::{MmError, Result};

// ═══════════════════════════════════════════════════════════════════════════
// E820 TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// E820 memory type for Linux boot protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum E820Type {
    Ram = 1,
    Reserved = 2,
    /// ACPI reclaimable
    Acpi = 3,
    /// ACPI non-volatile storage
    Nvs = 4,
}

impl E820Type {
    /// Legacy bucket for a UEFI memory type.
    ///
    /// Types a legacy consumer has no use for (persistent memory, anything
    /// unknown) map to `None` and are left out of the E820 map entirely.
    pub const fn from_efi(mem_type: EfiMemoryType) -> Option<Self> {
        match mem_type {
            EfiMemoryType::AcpiReclaim => Some(E820Type::Acpi),

            EfiMemoryType::RuntimeServicesCode
            | EfiMemoryType::RuntimeServicesData
            | EfiMemoryType::Reserved
            | EfiMemoryType::Mmio
            | EfiMemoryType::MmioPortSpace
            | EfiMemoryType::Unusable
            | EfiMemoryType::PalCode => Some(E820Type::Reserved),

            EfiMemoryType::LoaderCode
            | EfiMemoryType::LoaderData
            | EfiMemoryType::BootServicesCode
            | EfiMemoryType::BootServicesData
            | EfiMemoryType::Conventional => Some(E820Type::Ram),

            EfiMemoryType::AcpiNvs => Some(E820Type::Nvs),

            EfiMemoryType::Persistent => None,
        }
    }

    pub const fn from_raw(value: u32) -> Option<Self> {
        match value {
            1 => Some(E820Type::Ram),
            2 => Some(E820Type::Reserved),
            3 => Some(E820Type::Acpi),
            4 => Some(E820Type::Nvs),
            _ => None,
        }
    }
}

/// E820 entry - matches Linux boot protocol format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, packed)]
pub struct E820Entry {
    pub addr: u64,
    pub size: u64,
    pub entry_type: u32,
}

impl E820Entry {
    pub const fn empty() -> Self {
        Self {
            addr: 0,
            size: 0,
            entry_type: 0,
        }
    }

    pub const fn new(addr: u64, size: u64, kind: E820Type) -> Self {
        Self {
            addr,
            size,
            entry_type: kind as u32,
        }
    }

    pub const fn kind(&self) -> Option<E820Type> {
        E820Type::from_raw(self.entry_type)
    }

    /// End address (exclusive).
    pub const fn end(&self) -> u64 {
        self.addr.saturating_add(self.size)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LEGACY MAP
// ═══════════════════════════════════════════════════════════════════════════

/// The coalesced legacy memory map.
#[derive(Clone)]
pub struct LegacyMap {
    entries: [E820Entry; E820_MAX],
    count: usize,
    truncated: bool,
}

impl LegacyMap {
    pub const fn new() -> Self {
        Self {
            entries: [E820Entry::empty(); E820_MAX],
            count: 0,
            truncated: false,
        }
    }

    /// Translate a raw UEFI memory map.
    ///
    /// `map` holds `map.len() / descriptor_size` descriptors laid out at
    /// `descriptor_size` intervals. Running out of E820 slots is not an
    /// error: what fit is kept and [`is_truncated`](Self::is_truncated) is set.
    pub fn from_efi_map(map: &[u8], descriptor_size: usize) -> Result<Self> {
        let descriptors = DescriptorIter::new(map, descriptor_size)
            .ok_or(MmError::InvalidDescriptorSize(descriptor_size))?;

        let mut legacy = Self::new();
        for desc in descriptors {
            if let Err(err) = legacy.add_descriptor(&desc) {
                warn!("[MEM] {}, dropping the rest of the map", err);
                legacy.truncated = true;
                break;
            }
        }

        debug!(
            "[MEM] e820: {} entries from {} descriptor bytes",
            legacy.count,
            map.len()
        );
        Ok(legacy)
    }

    /// Classify one descriptor and append it, cutting RAM around the
    /// legacy hole.
    pub fn add_descriptor(&mut self, desc: &MemoryDescriptor) -> Result<()> {
        let Some(kind) = desc.memory_type().and_then(E820Type::from_efi) else {
            return Ok(());
        };

        let start = desc.physical_start;
        let end = desc.physical_end();

        if kind != E820Type::Ram || end <= LEGACY_HOLE_START || start >= LEGACY_HOLE_END {
            return self.add_region(start, end - start, kind);
        }

        if start < LEGACY_HOLE_START {
            self.add_region(start, LEGACY_HOLE_START - start, E820Type::Ram)?;
        }
        if end > LEGACY_HOLE_END {
            self.add_region(LEGACY_HOLE_END, end - LEGACY_HOLE_END, E820Type::Ram)?;
        }
        Ok(())
    }

    /// Append a region, growing the last entry when it is the same type and
    /// ends exactly where this one starts.
    pub fn add_region(&mut self, start: u64, size: u64, kind: E820Type) -> Result<()> {
        if size == 0 {
            return Ok(());
        }

        // A full table takes nothing more, not even a merge into the last entry
        if self.count == E820_MAX {
            return Err(MmError::MapFull);
        }

        if let Some(last) = self.entries[..self.count].last_mut() {
            if last.entry_type == kind as u32 && last.end() == start {
                last.size = last.size.saturating_add(size);
                return Ok(());
            }
        }

        self.entries[self.count] = E820Entry::new(start, size, kind);
        self.count += 1;
        Ok(())
    }

    /// Live entries, in address order.
    pub fn entries(&self) -> &[E820Entry] {
        &self.entries[..self.count]
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Input was dropped because the table filled up.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Live entries as raw boot-params table bytes.
    pub fn as_bytes(&self) -> &[u8] {
        let entries = self.entries();
        // SAFETY: E820Entry is packed plain data without padding
        unsafe {
            core::slice::from_raw_parts(
                entries.as_ptr().cast::<u8>(),
                core::mem::size_of_val(entries),
            )
        }
    }

    /// Export into a boot-params style table.
    ///
    /// # Returns
    /// Number of entries written.
    pub fn export_e820(&self, buffer: &mut [E820Entry]) -> usize {
        let count = self.count.min(buffer.len());
        buffer[..count].copy_from_slice(&self.entries[..count]);
        if count < self.count {
            warn!(
                "[MEM] e820 export: {} of {} entries fit",
                count, self.count
            );
        }
        count
    }

    /// KB of RAM below the legacy hole.
    pub fn conventional_kib(&self) -> u64 {
        let bytes: u64 = self
            .entries()
            .iter()
            .filter(|e| e.kind() == Some(E820Type::Ram) && e.addr < LEGACY_HOLE_START)
            .map(|e| e.end().min(LEGACY_HOLE_START) - e.addr)
            .sum();
        bytes >> 10
    }

    /// KB of contiguous RAM starting at 1MB.
    pub fn extended_kib(&self) -> u64 {
        self.entries()
            .iter()
            .find(|e| {
                e.kind() == Some(E820Type::Ram)
                    && e.addr <= LEGACY_HOLE_END
                    && e.end() > LEGACY_HOLE_END
            })
            .map_or(0, |e| (e.end() - LEGACY_HOLE_END) >> 10)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TRAIT IMPLS
// ═══════════════════════════════════════════════════════════════════════════

impl Default for LegacyMap {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for LegacyMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries() == other.entries() && self.truncated == other.truncated
    }
}

impl Eq for LegacyMap {}

impl core::fmt::Debug for LegacyMap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LegacyMap")
            .field("entries", &self.entries())
            .field("truncated", &self.truncated)
            .finish()
    }
}
