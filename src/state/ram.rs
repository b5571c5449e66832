use core::convert::Infallible;

use crate::log;

use super::{ConfigKey, ConfigStore};

/// Configuration kept in RAM. Only survives as long as the RAM does, so a power cycle forgets
/// the committed image. Fine for boards that re-flash over a debugger anyway, and for tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RamStore {
    values: [Option<u32>; ConfigKey::ALL.len()],
}

impl RamStore {
    pub const fn new() -> Self {
        Self {
            values: [None; ConfigKey::ALL.len()],
        }
    }

    /// Builder style variant of [`ConfigStore::write`]
    pub fn with(mut self, key: ConfigKey, value: u32) -> Self {
        self.values[key.index()] = Some(value);
        self
    }

    pub fn get(&self, key: ConfigKey) -> Option<u32> {
        self.values[key.index()]
    }

    /// Forget a key, as if it had never been written
    pub fn clear(&mut self, key: ConfigKey) {
        self.values[key.index()] = None;
    }
}

impl ConfigStore for RamStore {
    type Error = Infallible;

    fn read(&mut self, key: ConfigKey) -> Result<Option<u32>, Self::Error> {
        let value = self.values[key.index()];
        log::trace!("Config read {:?}: {:?}", key, value);
        Ok(value)
    }

    fn write(&mut self, key: ConfigKey, value: u32) -> Result<(), Self::Error> {
        log::trace!("Config write {:?}: {:#x}", key, value);
        self.values[key.index()] = Some(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritten_keys_read_as_none() {
        let mut store = RamStore::new();
        for key in ConfigKey::ALL {
            assert_eq!(store.read(key), Ok(None));
        }
    }

    #[test]
    fn keys_are_disjoint() {
        let mut store = RamStore::new();
        store.write(ConfigKey::RegionStart, 0x1000).unwrap();
        store.write(ConfigKey::RegionEnd, 0x1400).unwrap();

        assert_eq!(store.read(ConfigKey::RegionStart), Ok(Some(0x1000)));
        assert_eq!(store.read(ConfigKey::RegionEnd), Ok(Some(0x1400)));
        assert_eq!(store.read(ConfigKey::Checksum), Ok(None));

        store.clear(ConfigKey::RegionStart);
        assert_eq!(store.get(ConfigKey::RegionStart), None);
    }
}
