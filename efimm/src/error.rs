//! Error types for the firmware memory layer.

use thiserror::Error;

use crate::firmware::Status;

/// Memory layer errors.
///
/// Nothing here is fatal by itself; the owning boot phase decides whether a
/// failure aborts the boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MmError {
    /// A boot service returned a non-success status.
    #[error("firmware call failed: {0}")]
    Firmware(Status),
    /// Requested fixed address lies above the allocation ceiling.
    #[error("address {0:#x} is above the allocation ceiling")]
    AddressAboveCeiling(u64),
    /// Every registry slot is occupied.
    #[error("too many page allocations")]
    TooManyAllocations,
    /// The E820 table has no room for another entry.
    #[error("too many entries in the memory map")]
    MapFull,
    /// GetMemoryMap kept asking for more room than we were willing to give.
    #[error("memory map buffer too small ({required} bytes required)")]
    BufferTooSmall { required: usize },
    /// Firmware reported a stride shorter than a v1 memory descriptor.
    #[error("descriptor size {0} is smaller than a memory descriptor")]
    InvalidDescriptorSize(usize),
    /// Registry storage has not been allocated yet.
    #[error("page registry not initialized")]
    NotInitialized,
}

/// Result type for memory layer operations.
pub type Result<T> = core::result::Result<T, MmError>;

impl From<Status> for MmError {
    fn from(status: Status) -> Self {
        MmError::Firmware(status)
    }
}
