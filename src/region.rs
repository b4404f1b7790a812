//! Byte regions: message-relative (`Region`) and absolute (`MemRegion`).

use crate::tree::TreeError;

/// A range of bytes relative to the start of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    pub offset: usize,
    pub len: usize,
}

impl Region {
    pub fn new(offset: usize, len: usize) -> Self {
        Region { offset, len }
    }

    /// Inclusive `[l, r]` bounds. `None` for an empty region.
    pub fn bounds(&self) -> Option<(usize, usize)> {
        if self.len == 0 {
            None
        } else {
            Some((self.offset, self.offset + self.len - 1))
        }
    }
}

/// A range of bytes in the target's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemRegion {
    pub addr: u32,
    pub len: u32,
}

impl MemRegion {
    pub fn new(addr: u32, len: u32) -> Self {
        MemRegion { addr, len }
    }

    pub fn end(&self) -> u64 {
        self.addr as u64 + self.len as u64
    }

    pub fn contains(&self, other: &MemRegion) -> bool {
        self.addr <= other.addr && self.end() >= other.end()
    }

    /// Translate into a region relative to the start of `container`, failing unless it lies inside it.
    pub fn relative_to(&self, container: &MemRegion) -> Result<Region, TreeError> {
        if !container.contains(self) {
            return Err(TreeError::RegionOutOfRange {
                addr: self.addr,
                len: self.len,
                base: container.addr,
                size: container.len,
            });
        }
        Ok(Region::new(
            (self.addr - container.addr) as usize,
            self.len as usize,
        ))
    }
}
