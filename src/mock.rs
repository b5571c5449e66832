//! In-memory NOR flash and config store used by the unit tests.

use embedded_storage::nor_flash::{
    check_erase, check_read, check_write, ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash,
};

use crate::state::{ram::RamStore, ConfigKey, ConfigStore};

pub const ERASE_SIZE: usize = 256;

/// NOR flash with `WRITE` and `READ` byte granularity. Misaligned accesses fail like they do
/// on real parts.
pub struct MockFlash<const WRITE: usize = 1, const READ: usize = 1> {
    pub memory: Vec<u8>,
    /// Every successful erase as `(from, to)`
    pub erases: Vec<(u32, u32)>,
    pub writes: usize,
    pub reads: usize,
    pub fail_erase: bool,
    pub fail_reads: bool,
    /// Number of writes that succeed before every further write fails
    pub writes_before_failure: Option<usize>,
}

impl MockFlash {
    pub fn new(capacity: usize) -> Self {
        Self::with_word_sizes(capacity)
    }
}

impl<const WRITE: usize, const READ: usize> MockFlash<WRITE, READ> {
    pub fn with_word_sizes(capacity: usize) -> Self {
        Self {
            memory: vec![0xFF; capacity],
            erases: Vec::new(),
            writes: 0,
            reads: 0,
            fail_erase: false,
            fail_reads: false,
            writes_before_failure: None,
        }
    }

    pub fn bytes(&self, from: u32, len: usize) -> &[u8] {
        &self.memory[from as usize..from as usize + len]
    }

    pub fn flip_bit(&mut self, address: u32, bit: u8) {
        self.memory[address as usize] ^= 1 << bit;
    }
}

impl<const WRITE: usize, const READ: usize> ErrorType for MockFlash<WRITE, READ> {
    type Error = NorFlashErrorKind;
}

impl<const WRITE: usize, const READ: usize> ReadNorFlash for MockFlash<WRITE, READ> {
    const READ_SIZE: usize = READ;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        if self.fail_reads {
            return Err(NorFlashErrorKind::Other);
        }
        check_read(self, offset, bytes.len())?;
        bytes.copy_from_slice(self.bytes(offset, bytes.len()));
        self.reads += 1;
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.memory.len()
    }
}

impl<const WRITE: usize, const READ: usize> NorFlash for MockFlash<WRITE, READ> {
    const WRITE_SIZE: usize = WRITE;
    const ERASE_SIZE: usize = ERASE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if self.fail_erase {
            return Err(NorFlashErrorKind::Other);
        }
        check_erase(self, from, to)?;
        self.memory[from as usize..to as usize].fill(0xFF);
        self.erases.push((from, to));
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if let Some(remaining) = self.writes_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(NorFlashErrorKind::Other);
            }
            *remaining -= 1;
        }
        check_write(self, offset, bytes.len())?;
        // NOR programming only clears bits
        for (cell, byte) in self.memory[offset as usize..].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        self.writes += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreFault;

/// Config store over a [`RamStore`] that can be told to fail.
#[derive(Debug, Default, Clone)]
pub struct MockStore {
    pub inner: RamStore,
    pub writes: usize,
    pub fail_reads: bool,
    /// Number of writes that succeed before every further write fails
    pub writes_before_failure: Option<usize>,
}

impl MockStore {
    pub fn new(inner: RamStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }
}

impl ConfigStore for MockStore {
    type Error = StoreFault;

    fn read(&mut self, key: ConfigKey) -> Result<Option<u32>, Self::Error> {
        if self.fail_reads {
            return Err(StoreFault);
        }
        self.inner.read(key).map_err(|e| match e {})
    }

    fn write(&mut self, key: ConfigKey, value: u32) -> Result<(), Self::Error> {
        if let Some(remaining) = self.writes_before_failure.as_mut() {
            if *remaining == 0 {
                return Err(StoreFault);
            }
            *remaining -= 1;
        }
        self.inner.write(key, value).map_err(|e| match e {})?;
        self.writes += 1;
        Ok(())
    }
}
