//! Memory manager: the firmware memory layer as one owned object.
//!
//! Owns the page tracker and the current legacy map for the pre-EBS phase.
//! Dropping the manager gives every tracked range back to the firmware.

use core::ptr::NonNull;
use core::slice;

use log::{debug, info, warn};

use crate::config::{bytes_to_pages, pages_to_bytes, MmConfig};
use crate::e820::LegacyMap;
use crate::error::{MmError, Result};
use crate::firmware::FirmwareServices;
use crate::handoff;
use crate::memmap::{get_memory_map, MapFetch};
use crate::mmar::{MapCursor, MmarDesc};
use crate::tracker::PageTracker;

/// Outcome of one scratch-buffer round trip.
enum Attempt {
    Translated(LegacyMap),
    /// Buffer was short; try again with this many bytes.
    Grow(usize),
}

pub struct MemoryManager<F: FirmwareServices> {
    firmware: F,
    config: MmConfig,
    tracker: PageTracker,
    legacy_map: LegacyMap,
    published: bool,
}

impl<F: FirmwareServices> MemoryManager<F> {
    /// Set up the registry and build the first legacy map.
    ///
    /// Failing to get the registry is fatal. Failing to build the map is
    /// not: it is logged and the map stays empty until the next
    /// [`refresh_legacy_map`](Self::refresh_legacy_map).
    pub fn new(firmware: F, config: MmConfig) -> Result<Self> {
        let mut tracker = PageTracker::new(&config);
        tracker.init(&firmware)?;

        let mut mm = Self {
            firmware,
            config,
            tracker,
            legacy_map: LegacyMap::new(),
            published: false,
        };

        if let Err(err) = mm.refresh_legacy_map() {
            warn!("[MEM] initial e820 map unavailable: {}", err);
        }

        Ok(mm)
    }

    /// Re-read the UEFI memory map and rebuild the legacy map from it.
    ///
    /// The scratch buffer is a tracked page allocation below the ceiling. If
    /// the firmware wants more room the buffer is replaced with one of
    /// `required + 2 * descriptor_size` bytes, since allocating the new
    /// buffer can itself split a descriptor.
    pub fn refresh_legacy_map(&mut self) -> Result<&LegacyMap> {
        self.legacy_map.clear();

        let mut bytes = self.config.memory_map_bytes;
        for attempt in 1..=self.config.map_fetch_attempts.max(1) {
            match self.fetch_and_translate(bytes)? {
                Attempt::Translated(map) => {
                    self.legacy_map = map;
                    info!(
                        "[MEM] e820 map: {} entries, {} KB low, {} KB extended",
                        self.legacy_map.len(),
                        self.legacy_map.conventional_kib(),
                        self.legacy_map.extended_kib()
                    );
                    return Ok(&self.legacy_map);
                }
                Attempt::Grow(required) => {
                    debug!(
                        "[MEM] memory map attempt {}: {} bytes short of {}",
                        attempt,
                        required.saturating_sub(bytes),
                        required
                    );
                    bytes = required;
                }
            }
        }

        Err(MmError::BufferTooSmall { required: bytes })
    }

    /// One GetMemoryMap round trip through a fresh scratch buffer.
    fn fetch_and_translate(&mut self, bytes: usize) -> Result<Attempt> {
        let pages = bytes_to_pages(bytes as u64).max(1);
        let base = self.tracker.allocate_pages(&self.firmware, 0, pages)?;
        let len = pages_to_bytes(pages) as usize;

        // SAFETY: `pages` pages at `base` were just allocated for us and are
        // freed below before anything else can see them
        let buffer = unsafe { slice::from_raw_parts_mut(self.firmware.phys_to_ptr(base), len) };

        let outcome = match get_memory_map(&self.firmware, buffer) {
            Ok(MapFetch::Complete(layout)) => {
                let map_len = layout.map_size.min(len);
                LegacyMap::from_efi_map(&buffer[..map_len], layout.descriptor_size)
                    .map(Attempt::Translated)
            }
            Ok(MapFetch::Insufficient(layout)) => Ok(Attempt::Grow(grown_map_size(
                layout.map_size,
                layout.descriptor_size,
            ))),
            Err(err) => Err(err),
        };

        if let Err(err) = self.tracker.free_pages(&self.firmware, base, pages) {
            warn!("[MEM] free memory map buffer {:#x} failed: {}", base, err);
        }

        outcome
    }

    /// Tracked allocation at `address`, or anywhere below the ceiling when
    /// `address` is 0.
    pub fn allocate_pages(&mut self, address: u64, pages: u64) -> Result<u64> {
        self.tracker.allocate_pages(&self.firmware, address, pages)
    }

    /// Tracked allocation anywhere in physical memory.
    pub fn allocate_any_pages(&mut self, pages: u64) -> Result<u64> {
        self.tracker.allocate_any_pages(&self.firmware, pages)
    }

    pub fn free_pages(&mut self, address: u64, pages: u64) -> Result<()> {
        self.tracker.free_pages(&self.firmware, address, pages)
    }

    /// Pool memory. Not tracked; the firmware reclaims pools on its own.
    pub fn allocate_pool(&self, size: usize) -> Result<NonNull<u8>> {
        Ok(self.firmware.allocate_pool(self.config.memory_type, size)?)
    }

    pub fn free_pool(&self, buffer: NonNull<u8>) -> Result<()> {
        Ok(self.firmware.free_pool(buffer)?)
    }

    pub fn legacy_map(&self) -> &LegacyMap {
        &self.legacy_map
    }

    pub fn tracker(&self) -> &PageTracker {
        &self.tracker
    }

    pub fn config(&self) -> &MmConfig {
        &self.config
    }

    pub fn firmware(&self) -> &F {
        &self.firmware
    }

    /// Cursor walk over the current legacy map.
    pub fn next_entry(&self, cursor: MapCursor) -> (MmarDesc, MapCursor) {
        self.legacy_map.next_entry(cursor)
    }

    /// Park the current legacy map in the hand-off slot.
    pub fn publish(&mut self) {
        handoff::publish(&self.legacy_map);
        self.published = true;
    }

    /// Return every tracked range and the registry to the firmware.
    ///
    /// Also clears the hand-off slot if this manager filled it. Runs on drop;
    /// later calls do nothing.
    pub fn teardown(&mut self) {
        if !self.tracker.is_initialized() {
            return;
        }

        self.tracker.teardown(&self.firmware);
        self.legacy_map.clear();
        if core::mem::take(&mut self.published) {
            handoff::clear();
        }
    }
}

/// Scratch size for the next attempt: what the firmware asked for plus room
/// for two more descriptors.
fn grown_map_size(required: usize, descriptor_size: usize) -> usize {
    required.saturating_add(descriptor_size.saturating_mul(2))
}

impl<F: FirmwareServices> Drop for MemoryManager<F> {
    fn drop(&mut self) {
        self.teardown();
    }
}
