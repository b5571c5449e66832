use crate::Address;

#[cfg(feature = "use-defmt")]
use defmt::Format;

/// Largest flash write granularity (`NorFlash::WRITE_SIZE`) the bootloader can stage.
pub const MAX_WRITE_SIZE: usize = 32;

/// Contiguous flash range reserved for the application image, `[start, end)`.
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Region {
    /// First address of the image
    pub start: Address,
    /// One past the last address the image may occupy
    pub end: Address,
}

impl Region {
    pub const fn new(start: Address, end: Address) -> Self {
        Self { start, end }
    }

    /// Number of bytes the region can hold. Zero for an inverted region.
    pub const fn capacity(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// A region is usable if it is non-empty and lies within a flash of `flash_capacity` bytes.
    pub fn is_valid_for(&self, flash_capacity: usize) -> bool {
        self.start < self.end && self.end as usize <= flash_capacity
    }

    /// Whether both ends of the region sit on a multiple of `align`
    pub fn is_aligned(&self, align: usize) -> bool {
        align != 0 && self.start as usize % align == 0 && self.end as usize % align == 0
    }

    /// Whether `len` bytes written at `address` stay inside the region.
    pub fn contains_span(&self, address: Address, len: usize) -> bool {
        if address < self.start {
            return false;
        }
        match u32::try_from(len).ok().and_then(|len| address.checked_add(len)) {
            Some(end) => end <= self.end,
            None => false,
        }
    }
}
