//! Page Allocation Tracker
//!
//! Every page range we take from the firmware is written into a fixed-size
//! registry so that teardown can hand all of it back. The registry itself
//! lives in firmware pages allocated at init, and is deliberately not one of
//! its own records.
//!
//! # Layout
//!
//! ```text
//! registry pages (ALLOCATED_PAGES_SIZE bytes, zeroed at init)
//! ┌──────────────┬──────────────┬──────────────┬─────┐
//! │ PageSlot 0   │ PageSlot 1   │ PageSlot 2   │ ... │   capacity = bytes / 24
//! │ Occupied{..} │ Empty        │ Occupied{..} │     │
//! └──────────────┴──────────────┴──────────────┴─────┘
//! ```

use core::mem::size_of;
use core::ptr::{self, NonNull};

use log::{debug, info, warn};

use crate::config::{bytes_to_pages, MmConfig};
use crate::descriptor::EfiMemoryType;
use crate::error::{MmError, Result};
use crate::firmware::{AllocateType, FirmwareServices, Status};

// ═══════════════════════════════════════════════════════════════════════════
// REGISTRY STORAGE
// ═══════════════════════════════════════════════════════════════════════════

/// One registry record.
///
/// All-zero bytes decode as `Empty`, so freshly zeroed storage is an empty
/// registry and a range at physical address 0 is still representable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C, u64)]
pub enum PageSlot {
    #[default]
    Empty,
    Occupied { base: u64, pages: u64 },
}

impl PageSlot {
    pub const fn base(&self) -> Option<u64> {
        match *self {
            PageSlot::Empty => None,
            PageSlot::Occupied { base, .. } => Some(base),
        }
    }

    pub const fn is_empty(&self) -> bool {
        matches!(self, PageSlot::Empty)
    }
}

/// Registry storage obtained from the firmware.
struct Registry {
    base: u64,
    pages: u64,
    slots: NonNull<PageSlot>,
    capacity: usize,
}

impl Registry {
    fn slots(&self) -> &[PageSlot] {
        // SAFETY: `slots` points at `capacity` zero-initialized slots inside
        // pages we own until teardown
        unsafe { core::slice::from_raw_parts(self.slots.as_ptr(), self.capacity) }
    }

    fn slots_mut(&mut self) -> &mut [PageSlot] {
        // SAFETY: as above, and &mut self makes the access exclusive
        unsafe { core::slice::from_raw_parts_mut(self.slots.as_ptr(), self.capacity) }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PAGE TRACKER
// ═══════════════════════════════════════════════════════════════════════════

/// Fixed-capacity record of outstanding page allocations.
pub struct PageTracker {
    registry: Option<Registry>,
    ceiling: u64,
    memory_type: EfiMemoryType,
    registry_bytes: usize,
}

impl PageTracker {
    /// Tracker with no storage yet; call [`init`](Self::init).
    pub const fn new(config: &MmConfig) -> Self {
        Self {
            registry: None,
            ceiling: config.allocation_ceiling,
            memory_type: config.memory_type,
            registry_bytes: config.registry_bytes,
        }
    }

    /// Allocate and zero the registry storage.
    ///
    /// The storage goes through the untracked path, so it never appears in
    /// its own records. Calling this twice is a no-op.
    pub fn init<F: FirmwareServices + ?Sized>(&mut self, firmware: &F) -> Result<()> {
        if self.registry.is_some() {
            return Ok(());
        }

        let pages = bytes_to_pages(self.registry_bytes as u64).max(1);
        let base = self.allocate_untracked(firmware, 0, pages).map_err(|err| {
            warn!("[MEM] cannot allocate page registry: {}", err);
            err
        })?;

        let Some(storage) = NonNull::new(firmware.phys_to_ptr(base)) else {
            if let Err(status) = firmware.free_pages(base, pages) {
                warn!("[MEM] free page registry failed: {}", status);
            }
            return Err(MmError::NotInitialized);
        };

        // SAFETY: the firmware just gave us `pages` pages at `base`
        unsafe { ptr::write_bytes(storage.as_ptr(), 0, self.registry_bytes) };

        let capacity = self.registry_bytes / size_of::<PageSlot>();
        self.registry = Some(Registry {
            base,
            pages,
            slots: storage.cast(),
            capacity,
        });

        info!("[MEM] page registry at {:#x}, {} slots", base, capacity);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.registry.is_some()
    }

    /// Allocate `pages` pages, at `address` or anywhere below the ceiling
    /// when `address` is 0, and record them.
    pub fn allocate_pages<F: FirmwareServices + ?Sized>(
        &mut self,
        firmware: &F,
        address: u64,
        pages: u64,
    ) -> Result<u64> {
        let base = self.allocate_untracked(firmware, address, pages)?;
        self.record(firmware, base, pages)
    }

    /// Allocate `pages` pages anywhere, ceiling not applied, and record them.
    pub fn allocate_any_pages<F: FirmwareServices + ?Sized>(
        &mut self,
        firmware: &F,
        pages: u64,
    ) -> Result<u64> {
        let base = firmware.allocate_pages(AllocateType::AnyPages, self.memory_type, pages)?;
        self.record(firmware, base, pages)
    }

    /// Release a range and drop its record, if there is one.
    ///
    /// The firmware call is made whether or not the range was recorded. A
    /// refused free keeps the record, so teardown still tries it.
    pub fn free_pages<F: FirmwareServices + ?Sized>(
        &mut self,
        firmware: &F,
        address: u64,
        pages: u64,
    ) -> Result<()> {
        firmware.free_pages(address, pages)?;

        if let Some(registry) = self.registry.as_mut() {
            if registry.base != address {
                if let Some(slot) = registry
                    .slots_mut()
                    .iter_mut()
                    .find(|slot| slot.base() == Some(address))
                {
                    *slot = PageSlot::Empty;
                }
            }
        }
        Ok(())
    }

    /// Release every recorded range, then the registry itself.
    ///
    /// Firmware failures are logged and skipped. Safe to call repeatedly.
    pub fn teardown<F: FirmwareServices + ?Sized>(&mut self, firmware: &F) {
        let Some(mut registry) = self.registry.take() else {
            return;
        };

        let mut released = 0usize;
        for slot in registry.slots_mut() {
            if let PageSlot::Occupied { base, pages } = *slot {
                if let Err(status) = firmware.free_pages(base, pages) {
                    warn!("[MEM] free {:#x} ({} pages) failed: {}", base, pages, status);
                }
                *slot = PageSlot::Empty;
                released += 1;
            }
        }

        if let Err(status) = firmware.free_pages(registry.base, registry.pages) {
            warn!("[MEM] free page registry failed: {}", status);
        }

        info!("[MEM] page registry released ({} outstanding ranges)", released);
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.registry.as_ref().map_or(0, |r| r.capacity)
    }

    /// Number of occupied slots.
    pub fn tracked_count(&self) -> usize {
        self.slots().iter().filter(|slot| !slot.is_empty()).count()
    }

    pub fn is_tracked(&self, address: u64) -> bool {
        self.slots().iter().any(|slot| slot.base() == Some(address))
    }

    /// `(base, pages)` of every recorded range, in slot order.
    pub fn tracked(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.slots().iter().filter_map(|slot| match *slot {
            PageSlot::Empty => None,
            PageSlot::Occupied { base, pages } => Some((base, pages)),
        })
    }

    /// `(base, pages)` of the registry storage.
    pub fn registry_range(&self) -> Option<(u64, u64)> {
        self.registry.as_ref().map(|r| (r.base, r.pages))
    }

    fn slots(&self) -> &[PageSlot] {
        match self.registry.as_ref() {
            Some(registry) => registry.slots(),
            None => &[],
        }
    }

    /// Ceiling check plus the page-0 workaround, no bookkeeping.
    fn allocate_untracked<F: FirmwareServices + ?Sized>(
        &self,
        firmware: &F,
        address: u64,
        pages: u64,
    ) -> Result<u64> {
        if address > self.ceiling {
            return Err(MmError::AddressAboveCeiling(address));
        }

        let allocate_type = if address == 0 {
            AllocateType::MaxAddress(self.ceiling)
        } else {
            AllocateType::Address(address)
        };

        let base = firmware.allocate_pages(allocate_type, self.memory_type, pages)?;
        if base != 0 {
            return Ok(base);
        }

        // Page 0 doubles as "no memory" for our callers. Ask again while still
        // holding it so the firmware cannot return it twice.
        debug!("[MEM] firmware returned page 0, reallocating");
        let retry = firmware.allocate_pages(
            AllocateType::MaxAddress(self.ceiling),
            self.memory_type,
            pages,
        );
        if let Err(status) = firmware.free_pages(0, pages) {
            warn!("[MEM] free page 0 failed: {}", status);
        }

        match retry? {
            0 => {
                if let Err(status) = firmware.free_pages(0, pages) {
                    warn!("[MEM] free page 0 failed: {}", status);
                }
                Err(MmError::Firmware(Status::OUT_OF_RESOURCES))
            }
            base => Ok(base),
        }
    }

    fn record<F: FirmwareServices + ?Sized>(
        &mut self,
        firmware: &F,
        base: u64,
        pages: u64,
    ) -> Result<u64> {
        let Some(registry) = self.registry.as_mut() else {
            return Ok(base);
        };

        if let Some(slot) = registry.slots_mut().iter_mut().find(|slot| slot.is_empty()) {
            *slot = PageSlot::Occupied { base, pages };
            return Ok(base);
        }

        warn!(
            "[MEM] too many page allocations ({} slots), releasing {:#x}",
            registry.capacity, base
        );
        if let Err(status) = firmware.free_pages(base, pages) {
            warn!("[MEM] free {:#x} failed: {}", base, status);
        }
        Err(MmError::TooManyAllocations)
    }
}
