//! Layer configuration and fixed limits.

use crate::descriptor::EfiMemoryType;

/// Page size (4KB, same as UEFI)
pub const PAGE_SIZE: u64 = 4096;
pub const PAGE_SHIFT: u32 = 12;

/// Highest address we hand out. Some consumers of this loader cannot reach
/// memory above 2GB.
pub const ALLOCATION_CEILING: u64 = 0x7fff_ffff;

/// Bytes reserved for the page allocation registry.
pub const ALLOCATED_PAGES_SIZE: usize = 0x1000;

/// Initial memory map scratch buffer. Must be a multiple of 4KB.
pub const MEMORY_MAP_SIZE: usize = 0x2000;

/// E820 table capacity (matches the boot params `e820_table`).
pub const E820_MAX: usize = 128;

/// Legacy VGA/BIOS hole, never reported as RAM.
pub const LEGACY_HOLE_START: u64 = 0x000A_0000;
pub const LEGACY_HOLE_END: u64 = 0x0010_0000;

/// How many times a refresh re-queries after BUFFER_TOO_SMALL.
pub const MAP_FETCH_ATTEMPTS: usize = 4;

/// Convert bytes to pages (rounded up).
#[inline]
pub const fn bytes_to_pages(bytes: u64) -> u64 {
    bytes.div_ceil(PAGE_SIZE)
}

/// Convert pages to bytes, saturating on absurd page counts.
#[inline]
pub const fn pages_to_bytes(pages: u64) -> u64 {
    pages.saturating_mul(PAGE_SIZE)
}

/// Tunables for [`MemoryManager`](crate::MemoryManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmConfig {
    /// Inclusive upper bound for `allocate_pages`.
    pub allocation_ceiling: u64,
    /// Registry storage in bytes; capacity is this over the slot size.
    pub registry_bytes: usize,
    /// First-try size of the memory map scratch buffer.
    pub memory_map_bytes: usize,
    /// Memory type stamped on every page and pool allocation.
    pub memory_type: EfiMemoryType,
    /// Upper bound on GetMemoryMap attempts per refresh.
    pub map_fetch_attempts: usize,
}

impl MmConfig {
    pub const fn new() -> Self {
        Self {
            allocation_ceiling: ALLOCATION_CEILING,
            registry_bytes: ALLOCATED_PAGES_SIZE,
            memory_map_bytes: MEMORY_MAP_SIZE,
            memory_type: EfiMemoryType::LoaderData,
            map_fetch_attempts: MAP_FETCH_ATTEMPTS,
        }
    }

    pub const fn with_ceiling(mut self, ceiling: u64) -> Self {
        self.allocation_ceiling = ceiling;
        self
    }

    pub const fn with_registry_bytes(mut self, bytes: usize) -> Self {
        self.registry_bytes = bytes;
        self
    }

    pub const fn with_memory_map_bytes(mut self, bytes: usize) -> Self {
        self.memory_map_bytes = bytes;
        self
    }

    pub const fn with_map_fetch_attempts(mut self, attempts: usize) -> Self {
        self.map_fetch_attempts = attempts;
        self
    }

    /// Pages backing the registry.
    pub const fn registry_pages(&self) -> u64 {
        bytes_to_pages(self.registry_bytes as u64)
    }
}

impl Default for MmConfig {
    fn default() -> Self {
        Self::new()
    }
}
