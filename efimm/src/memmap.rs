//! GetMemoryMap wrapper.
//!
//! One query, three outcomes. Growing the buffer on `Insufficient` is the
//! caller's job (see [`MemoryManager::refresh_legacy_map`]).
//!
//! [`MemoryManager::refresh_legacy_map`]: crate::MemoryManager::refresh_legacy_map

use crate::descriptor::DescriptorIter;
use crate::error::{MmError, Result};
use crate::firmware::{FirmwareServices, Status};

/// What GetMemoryMap reported alongside the descriptors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapLayout {
    /// Bytes written, or bytes required when the buffer was too small.
    pub map_size: usize,
    pub map_key: usize,
    /// Stride between descriptors.
    pub descriptor_size: usize,
    pub descriptor_version: u32,
}

impl MapLayout {
    /// Iterate the descriptors this layout describes within `buffer`.
    pub fn descriptors<'a>(&self, buffer: &'a [u8]) -> Option<DescriptorIter<'a>> {
        let len = self.map_size.min(buffer.len());
        DescriptorIter::new(&buffer[..len], self.descriptor_size)
    }
}

/// Non-error outcomes of a memory map query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapFetch {
    /// The whole map is in the buffer.
    Complete(MapLayout),
    /// The buffer was too small; `map_size` is what the firmware wants.
    Insufficient(MapLayout),
}

/// Query the firmware memory map into `buffer`.
///
/// Map key and descriptor version are always collected into local storage,
/// so the firmware never sees a null out-pointer.
pub fn get_memory_map<F: FirmwareServices + ?Sized>(
    firmware: &F,
    buffer: &mut [u8],
) -> Result<MapFetch> {
    let mut layout = MapLayout::default();

    match firmware.get_memory_map(buffer, &mut layout) {
        Status::SUCCESS => Ok(MapFetch::Complete(layout)),
        Status::BUFFER_TOO_SMALL => Ok(MapFetch::Insufficient(layout)),
        status => Err(MmError::Firmware(status)),
    }
}
