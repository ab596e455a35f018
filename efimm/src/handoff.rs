//! Hand-off slot for the next boot stage.
//!
//! The kernel loader runs after the manager has done its work and only has a
//! cursor to offer, so the finished map is parked here. The lock exists so
//! the static is `Sync`; there is no contention during boot.

use spin::Mutex;

use crate::e820::LegacyMap;
use crate::mmar::{MapCursor, MmarDesc};

static HANDOFF: Mutex<LegacyMap> = Mutex::new(LegacyMap::new());

/// Serializes tests that touch the shared slot.
#[cfg(test)]
pub(crate) static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Replace the published map with a copy of `map`.
pub fn publish(map: &LegacyMap) {
    HANDOFF.lock().clone_from(map);
    log::debug!("[MEM] published {} e820 entries", map.len());
}

/// Forget the published map.
pub fn clear() {
    HANDOFF.lock().clear();
}

/// Number of published entries.
pub fn published_len() -> usize {
    HANDOFF.lock().len()
}

/// Fill `desc` with the published entry at `cursor`.
///
/// # Returns
/// The cursor for the following call, 0 once the last entry was returned.
pub fn get_mmap_entry(desc: &mut MmarDesc, cursor: MapCursor) -> MapCursor {
    let (entry, next) = HANDOFF.lock().next_entry(cursor);
    *desc = entry;
    next
}
