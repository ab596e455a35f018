//! Firmware Memory Layer
//!
//! Boot-time physical memory bookkeeping for the pre-EBS half of the
//! bootloader. Two responsibilities:
//!
//! - Every page range we take from UEFI is recorded, so nothing the firmware
//!   handed us is leaked when we tear down.
//! - The UEFI memory map is translated into the coalesced four-type E820 map
//!   a legacy kernel expects at hand-off.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        MemoryManager                             │
//! │                                                                  │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │ PageTracker │   │   memmap    │   │  LegacyMap  │             │
//! │  │ (registry)  │   │ (GetMemMap) │──▶│   (E820)    │──▶ handoff  │
//! │  └──────┬──────┘   └──────┬──────┘   └──────┬──────┘    (mmar)   │
//! │         │                 │                 │                    │
//! └─────────┼─────────────────┼─────────────────┼────────────────────┘
//!           ▼                 ▼                 ▼
//!     ┌─────────────────────────────┐     next_entry(cursor)
//!     │  FirmwareServices (UEFI BS) │
//!     └─────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use morpheus_efimm::{EfiBootServices, MemoryManager, MmConfig};
//!
//! let bs: &EfiBootServices = unsafe { &*system_table.boot_services };
//! let mut mm = MemoryManager::new(bs, MmConfig::default())?;
//!
//! let buffer = mm.allocate_pages(0, 16)?;
//! // ...
//! mm.free_pages(buffer, 16)?;
//!
//! mm.publish();
//! // boot protocol walks the map via handoff::get_mmap_entry()
//!
//! mm.teardown();
//! ```

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod descriptor;
pub mod e820;
pub mod error;
pub mod firmware;
pub mod handoff;
pub mod manager;
pub mod memmap;
pub mod mmar;
pub mod tracker;

pub use config::MmConfig;
pub use descriptor::{DescriptorIter, EfiMemoryType, MemoryDescriptor};
pub use e820::{E820Entry, E820Type, LegacyMap};
pub use error::{MmError, Result};
pub use firmware::{AllocateType, EfiBootServices, FirmwareServices, Status};
pub use manager::MemoryManager;
pub use memmap::{get_memory_map, MapFetch, MapLayout};
pub use mmar::{MapCursor, MmarDesc, MmarWalk};
pub use tracker::{PageSlot, PageTracker};
