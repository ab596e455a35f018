//! Mock boot services for testing without UEFI.
//!
//! Page and pool allocations are carved out of a page-aligned host arena that
//! pretends to live at [`ARENA_BASE`], so code that writes through
//! `phys_to_ptr` (the registry, the map buffer) touches real memory.

use core::cell::RefCell;
use core::ptr::NonNull;

use super::{AllocateType, FirmwareServices, Status};
use crate::config::{bytes_to_pages, PAGE_SIZE};
use crate::descriptor::{EfiMemoryType, MemoryDescriptor};
use crate::memmap::MapLayout;

/// Physical address the arena is presented at.
pub(crate) const ARENA_BASE: u64 = 0x0010_0000;

/// Arena size in pages.
pub(crate) const ARENA_PAGES: usize = 64;

#[repr(C, align(4096))]
#[derive(Clone, Copy)]
struct Page([u8; PAGE_SIZE as usize]);

#[derive(Default)]
struct MockState {
    next_page: usize,
    requests: Vec<AllocateType>,
    live: Vec<(u64, u64)>,
    freed: Vec<(u64, u64)>,
    zero_next: usize,
    fail_allocations: bool,
    pools: Vec<usize>,
    pools_freed: usize,
    map: Vec<u8>,
    descriptor_size: usize,
    map_key: usize,
    map_error: Option<Status>,
    map_calls: usize,
}

pub(crate) struct MockFirmware {
    arena: NonNull<Page>,
    state: RefCell<MockState>,
}

impl MockFirmware {
    pub fn new() -> Self {
        let arena = vec![Page([0; PAGE_SIZE as usize]); ARENA_PAGES].into_boxed_slice();
        // Box<[Page]> is never null
        let arena = NonNull::new(Box::into_raw(arena).cast::<Page>()).unwrap();
        Self {
            arena,
            state: RefCell::new(MockState {
                descriptor_size: MemoryDescriptor::SIZE,
                map_key: 0x1000,
                ..MockState::default()
            }),
        }
    }

    /// Replace the memory map returned by GetMemoryMap.
    pub fn set_memory_map(&self, descriptor_size: usize, entries: &[(u32, u64, u64)]) {
        let mut state = self.state.borrow_mut();
        state.map = build_memory_map(descriptor_size, entries);
        state.descriptor_size = descriptor_size;
        state.map_key += 1;
    }

    pub fn fail_memory_map(&self, status: Status) {
        self.state.borrow_mut().map_error = Some(status);
    }

    /// The next `count` page allocations come back at physical address 0.
    pub fn return_zero_next(&self, count: usize) {
        self.state.borrow_mut().zero_next = count;
    }

    pub fn set_fail_allocations(&self, fail: bool) {
        self.state.borrow_mut().fail_allocations = fail;
    }

    /// Every AllocatePages request, in order.
    pub fn requests(&self) -> Vec<AllocateType> {
        self.state.borrow().requests.clone()
    }

    /// Ranges handed out and not yet freed.
    pub fn live(&self) -> Vec<(u64, u64)> {
        self.state.borrow().live.clone()
    }

    /// FreePages calls, in order.
    pub fn freed(&self) -> Vec<(u64, u64)> {
        self.state.borrow().freed.clone()
    }

    pub fn live_pools(&self) -> usize {
        self.state.borrow().pools.len()
    }

    pub fn pools_freed(&self) -> usize {
        self.state.borrow().pools_freed
    }

    pub fn map_key(&self) -> usize {
        self.state.borrow().map_key
    }

    pub fn map_calls(&self) -> usize {
        self.state.borrow().map_calls
    }

    fn carve(&self, state: &mut MockState, pages: usize) -> Result<u64, Status> {
        if pages == 0 || state.next_page + pages > ARENA_PAGES {
            return Err(Status::OUT_OF_RESOURCES);
        }
        let addr = ARENA_BASE + state.next_page as u64 * PAGE_SIZE;
        state.next_page += pages;
        Ok(addr)
    }
}

impl Drop for MockFirmware {
    fn drop(&mut self) {
        let arena = core::ptr::slice_from_raw_parts_mut(self.arena.as_ptr(), ARENA_PAGES);
        // SAFETY: reconstructs the box leaked in new()
        drop(unsafe { Box::from_raw(arena) });
    }
}

impl FirmwareServices for MockFirmware {
    fn allocate_pages(
        &self,
        allocate_type: AllocateType,
        _memory_type: EfiMemoryType,
        pages: u64,
    ) -> Result<u64, Status> {
        let mut state = self.state.borrow_mut();
        state.requests.push(allocate_type);

        if state.fail_allocations {
            return Err(Status::OUT_OF_RESOURCES);
        }

        if state.zero_next > 0 {
            state.zero_next -= 1;
            state.live.push((0, pages));
            return Ok(0);
        }

        let addr = match allocate_type {
            // Fixed addresses are handed back as-is and are not arena backed
            AllocateType::Address(addr) => addr,
            AllocateType::AnyPages => self.carve(&mut state, pages as usize)?,
            AllocateType::MaxAddress(max) => {
                let next = ARENA_BASE + state.next_page as u64 * PAGE_SIZE;
                if next + (pages * PAGE_SIZE).saturating_sub(1) > max {
                    return Err(Status::OUT_OF_RESOURCES);
                }
                self.carve(&mut state, pages as usize)?
            }
        };

        state.live.push((addr, pages));
        Ok(addr)
    }

    fn free_pages(&self, address: u64, pages: u64) -> Result<(), Status> {
        let mut state = self.state.borrow_mut();
        state.freed.push((address, pages));

        match state.live.iter().position(|&(base, _)| base == address) {
            Some(idx) => {
                state.live.remove(idx);
                Ok(())
            }
            None => Err(Status::NOT_FOUND),
        }
    }

    fn allocate_pool(
        &self,
        _memory_type: EfiMemoryType,
        size: usize,
    ) -> Result<NonNull<u8>, Status> {
        let mut state = self.state.borrow_mut();
        if state.fail_allocations {
            return Err(Status::OUT_OF_RESOURCES);
        }

        let pages = bytes_to_pages(size as u64).max(1) as usize;
        let addr = self.carve(&mut state, pages)?;
        state.pools.push(addr as usize);
        NonNull::new(self.phys_to_ptr(addr)).ok_or(Status::OUT_OF_RESOURCES)
    }

    fn free_pool(&self, buffer: NonNull<u8>) -> Result<(), Status> {
        let offset = buffer.as_ptr() as usize - self.arena.as_ptr() as usize;
        let addr = ARENA_BASE as usize + offset;

        let mut state = self.state.borrow_mut();
        match state.pools.iter().position(|&pool| pool == addr) {
            Some(idx) => {
                state.pools.remove(idx);
                state.pools_freed += 1;
                Ok(())
            }
            None => Err(Status::INVALID_PARAMETER),
        }
    }

    fn get_memory_map(&self, buffer: &mut [u8], layout: &mut MapLayout) -> Status {
        let mut state = self.state.borrow_mut();
        state.map_calls += 1;

        if let Some(status) = state.map_error {
            return status;
        }

        layout.map_key = state.map_key;
        layout.descriptor_size = state.descriptor_size;
        layout.descriptor_version = 1;
        layout.map_size = state.map.len();

        if buffer.len() < state.map.len() {
            return Status::BUFFER_TOO_SMALL;
        }

        buffer[..state.map.len()].copy_from_slice(&state.map);
        Status::SUCCESS
    }

    fn phys_to_ptr(&self, address: u64) -> *mut u8 {
        let end = ARENA_BASE + ARENA_PAGES as u64 * PAGE_SIZE;
        assert!(
            (ARENA_BASE..end).contains(&address),
            "address {:#x} is not arena backed",
            address
        );
        // SAFETY: offset checked against the arena bounds above
        unsafe {
            self.arena
                .as_ptr()
                .cast::<u8>()
                .add((address - ARENA_BASE) as usize)
        }
    }
}

/// Build a raw memory map from `(type, physical_start, pages)` triples.
///
/// Bytes past the v1 fields in each stride are filled with junk so readers
/// that ignore the stride notice.
pub(crate) fn build_memory_map(descriptor_size: usize, entries: &[(u32, u64, u64)]) -> Vec<u8> {
    assert!(descriptor_size >= MemoryDescriptor::SIZE);

    let mut map = vec![0xA5u8; descriptor_size * entries.len()];
    for (chunk, &(raw_type, start, pages)) in map.chunks_exact_mut(descriptor_size).zip(entries) {
        chunk[0..4].copy_from_slice(&raw_type.to_le_bytes());
        chunk[4..8].copy_from_slice(&[0; 4]);
        chunk[8..16].copy_from_slice(&start.to_le_bytes());
        chunk[16..24].copy_from_slice(&start.to_le_bytes());
        chunk[24..32].copy_from_slice(&pages.to_le_bytes());
        chunk[32..40].copy_from_slice(&0xfu64.to_le_bytes());
    }
    map
}
