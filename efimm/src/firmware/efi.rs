//! Raw UEFI boot services binding.

use core::ptr::{self, NonNull};

use super::{AllocateType, FirmwareServices, Status};
use crate::descriptor::EfiMemoryType;
use crate::memmap::MapLayout;

/// Memory-services prefix of `EFI_BOOT_SERVICES`.
///
/// Only ever reached through the pointer in the system table, so declaring
/// the leading fields is enough; the rest of the table is never touched.
#[repr(C)]
pub struct EfiBootServices {
    _header: [u8; 24],
    // Task Priority Services
    _raise_tpl: usize,
    _restore_tpl: usize,
    // Memory Services
    pub allocate_pages: extern "efiapi" fn(
        allocate_type: usize,
        memory_type: usize,
        pages: usize,
        memory: *mut u64,
    ) -> usize,
    pub free_pages: extern "efiapi" fn(memory: u64, pages: usize) -> usize,
    pub get_memory_map: extern "efiapi" fn(
        memory_map_size: *mut usize,
        memory_map: *mut u8,
        map_key: *mut usize,
        descriptor_size: *mut usize,
        descriptor_version: *mut u32,
    ) -> usize,
    pub allocate_pool:
        extern "efiapi" fn(pool_type: usize, size: usize, buffer: *mut *mut u8) -> usize,
    pub free_pool: extern "efiapi" fn(buffer: *mut u8) -> usize,
}

impl FirmwareServices for EfiBootServices {
    fn allocate_pages(
        &self,
        allocate_type: AllocateType,
        memory_type: EfiMemoryType,
        pages: u64,
    ) -> Result<u64, Status> {
        let (raw_type, mut address) = allocate_type.to_raw();
        let status = Status((self.allocate_pages)(
            raw_type,
            memory_type as usize,
            pages as usize,
            &mut address,
        ));
        status.to_result().map(|()| address)
    }

    fn free_pages(&self, address: u64, pages: u64) -> Result<(), Status> {
        Status((self.free_pages)(address, pages as usize)).to_result()
    }

    fn allocate_pool(
        &self,
        memory_type: EfiMemoryType,
        size: usize,
    ) -> Result<NonNull<u8>, Status> {
        let mut buffer = ptr::null_mut();
        Status((self.allocate_pool)(memory_type as usize, size, &mut buffer)).to_result()?;
        NonNull::new(buffer).ok_or(Status::OUT_OF_RESOURCES)
    }

    fn free_pool(&self, buffer: NonNull<u8>) -> Result<(), Status> {
        Status((self.free_pool)(buffer.as_ptr())).to_result()
    }

    fn get_memory_map(&self, buffer: &mut [u8], layout: &mut MapLayout) -> Status {
        layout.map_size = buffer.len();
        let map = if buffer.is_empty() {
            ptr::null_mut()
        } else {
            buffer.as_mut_ptr()
        };

        Status((self.get_memory_map)(
            &mut layout.map_size,
            map,
            &mut layout.map_key,
            &mut layout.descriptor_size,
            &mut layout.descriptor_version,
        ))
    }
}
