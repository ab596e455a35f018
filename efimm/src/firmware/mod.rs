//! Boot services seam.
//!
//! Everything this layer needs from the firmware goes through
//! [`FirmwareServices`]. On real hardware that is [`EfiBootServices`], the
//! memory-services slice of the UEFI boot services table; tests swap in an
//! arena-backed mock.

mod efi;
#[cfg(test)]
pub(crate) mod mock;

use core::fmt;
use core::ptr::NonNull;

use crate::descriptor::EfiMemoryType;
use crate::memmap::MapLayout;

pub use efi::EfiBootServices;

/// UEFI status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Status(pub usize);

impl Status {
    const ERROR_BIT: usize = 1usize << (usize::BITS - 1);

    pub const SUCCESS: Self = Self(0);
    pub const LOAD_ERROR: Self = Self(Self::ERROR_BIT | 1);
    pub const INVALID_PARAMETER: Self = Self(Self::ERROR_BIT | 2);
    pub const UNSUPPORTED: Self = Self(Self::ERROR_BIT | 3);
    pub const BUFFER_TOO_SMALL: Self = Self(Self::ERROR_BIT | 5);
    pub const OUT_OF_RESOURCES: Self = Self(Self::ERROR_BIT | 9);
    pub const NOT_FOUND: Self = Self(Self::ERROR_BIT | 14);

    #[inline]
    pub const fn is_success(self) -> bool {
        self.0 == Self::SUCCESS.0
    }

    #[inline]
    pub const fn is_error(self) -> bool {
        self.0 & Self::ERROR_BIT != 0
    }

    /// `Ok(())` on success, the status itself otherwise.
    #[inline]
    pub fn to_result(self) -> Result<(), Status> {
        if self.is_success() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Status::SUCCESS => "EFI_SUCCESS",
            Status::LOAD_ERROR => "EFI_LOAD_ERROR",
            Status::INVALID_PARAMETER => "EFI_INVALID_PARAMETER",
            Status::UNSUPPORTED => "EFI_UNSUPPORTED",
            Status::BUFFER_TOO_SMALL => "EFI_BUFFER_TOO_SMALL",
            Status::OUT_OF_RESOURCES => "EFI_OUT_OF_RESOURCES",
            Status::NOT_FOUND => "EFI_NOT_FOUND",
            _ => return write!(f, "status {:#x}", self.0),
        };
        f.write_str(name)
    }
}

/// Allocation type - how the firmware chooses the address.
///
/// Mirrors `EFI_ALLOCATE_TYPE`, with the address folded into the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocateType {
    /// Allocate any available pages
    AnyPages,
    /// Allocate at highest available address <= specified
    MaxAddress(u64),
    /// Allocate at exactly the specified address
    Address(u64),
}

impl AllocateType {
    /// Raw `EFI_ALLOCATE_TYPE` value and the in/out address argument.
    pub const fn to_raw(self) -> (usize, u64) {
        match self {
            AllocateType::AnyPages => (0, 0),
            AllocateType::MaxAddress(max) => (1, max),
            AllocateType::Address(addr) => (2, addr),
        }
    }
}

/// The boot services this layer consumes.
///
/// Every call is synchronous and either completes or fails immediately.
pub trait FirmwareServices {
    /// AllocatePages. Returns the physical base of the range.
    fn allocate_pages(
        &self,
        allocate_type: AllocateType,
        memory_type: EfiMemoryType,
        pages: u64,
    ) -> Result<u64, Status>;

    /// FreePages.
    fn free_pages(&self, address: u64, pages: u64) -> Result<(), Status>;

    /// AllocatePool.
    fn allocate_pool(&self, memory_type: EfiMemoryType, size: usize)
        -> Result<NonNull<u8>, Status>;

    /// FreePool.
    fn free_pool(&self, buffer: NonNull<u8>) -> Result<(), Status>;

    /// GetMemoryMap into `buffer`.
    ///
    /// `layout.map_size` is ignored on entry (the buffer length is used) and
    /// holds the written, or required, byte count on return.
    fn get_memory_map(&self, buffer: &mut [u8], layout: &mut MapLayout) -> Status;

    /// Pointer through which a physical address can be accessed.
    ///
    /// Boot services run identity mapped.
    fn phys_to_ptr(&self, address: u64) -> *mut u8 {
        address as usize as *mut u8
    }
}

impl<T: FirmwareServices + ?Sized> FirmwareServices for &T {
    fn allocate_pages(
        &self,
        allocate_type: AllocateType,
        memory_type: EfiMemoryType,
        pages: u64,
    ) -> Result<u64, Status> {
        (**self).allocate_pages(allocate_type, memory_type, pages)
    }

    fn free_pages(&self, address: u64, pages: u64) -> Result<(), Status> {
        (**self).free_pages(address, pages)
    }

    fn allocate_pool(
        &self,
        memory_type: EfiMemoryType,
        size: usize,
    ) -> Result<NonNull<u8>, Status> {
        (**self).allocate_pool(memory_type, size)
    }

    fn free_pool(&self, buffer: NonNull<u8>) -> Result<(), Status> {
        (**self).free_pool(buffer)
    }

    fn get_memory_map(&self, buffer: &mut [u8], layout: &mut MapLayout) -> Status {
        (**self).get_memory_map(buffer, layout)
    }

    fn phys_to_ptr(&self, address: u64) -> *mut u8 {
        (**self).phys_to_ptr(address)
    }
}
