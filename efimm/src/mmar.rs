//! Continuation-token walk over the legacy map.
//!
//! Multiboot-style consumers pull the map one record at a time:
//!
//! ```text
//! cursor 0 ──► entry 0, next 1 ──► entry 1, next 2 ──► ... ──► entry n-1, next 0
//! ```
//!
//! A returned cursor of 0 means the walk is over. An out-of-range cursor
//! yields a zero-length record, which is also how an empty map looks.

use crate::e820::{E820Entry, LegacyMap};

/// Opaque walk position. 0 starts a walk and 0 ends one.
pub type MapCursor = i32;

/// Byte length of the [`MmarDesc`] fields after `desc_len`.
pub const MMAR_DESC_LENGTH: u32 = 20;

/// Memory map record as handed to the legacy consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, packed)]
pub struct MmarDesc {
    /// Always [`MMAR_DESC_LENGTH`] for a real record, 0 for "no record".
    pub desc_len: u32,
    pub addr: u64,
    pub length: u64,
    pub entry_type: u32,
}

impl MmarDesc {
    pub const EMPTY: Self = Self {
        desc_len: 0,
        addr: 0,
        length: 0,
        entry_type: 0,
    };

    pub const fn from_entry(entry: &E820Entry) -> Self {
        Self {
            desc_len: MMAR_DESC_LENGTH,
            addr: entry.addr,
            length: entry.size,
            entry_type: entry.entry_type,
        }
    }

    /// The "no entry" record.
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl Default for MmarDesc {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl LegacyMap {
    /// Record at `cursor` plus the cursor to pass next time.
    pub fn next_entry(&self, cursor: MapCursor) -> (MmarDesc, MapCursor) {
        let entries = self.entries();
        let Some(entry) = usize::try_from(cursor).ok().and_then(|i| entries.get(i)) else {
            return (MmarDesc::EMPTY, 0);
        };

        let next = cursor + 1;
        let next = if next as usize == entries.len() { 0 } else { next };
        (MmarDesc::from_entry(entry), next)
    }

    /// Drive [`next_entry`](Self::next_entry) from cursor 0 to the wrap.
    pub fn walk(&self) -> MmarWalk<'_> {
        MmarWalk::new(self)
    }
}

/// Iterator over the cursor protocol.
///
/// Yields each record once and stops when the cursor wraps to 0. An empty map
/// yields nothing.
#[derive(Debug, Clone)]
pub struct MmarWalk<'a> {
    map: &'a LegacyMap,
    cursor: MapCursor,
    started: bool,
}

impl<'a> MmarWalk<'a> {
    pub fn new(map: &'a LegacyMap) -> Self {
        Self {
            map,
            cursor: 0,
            started: false,
        }
    }
}

impl Iterator for MmarWalk<'_> {
    type Item = MmarDesc;

    fn next(&mut self) -> Option<MmarDesc> {
        if self.started && self.cursor == 0 {
            return None;
        }
        self.started = true;

        let (desc, next) = self.map.next_entry(self.cursor);
        self.cursor = next;
        if desc.is_empty() {
            self.cursor = 0;
            return None;
        }
        Some(desc)
    }
}
