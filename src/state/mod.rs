#[cfg(any(test, feature = "ram-store"))]
pub mod ram;

#[cfg(feature = "use-defmt")]
use defmt::Format;

/// Decision making states for the bootloader
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BootloaderState {
    /// No transfer in progress. Initial state and the end of every transfer.
    #[default]
    Idle,
    /// A transfer was started and data packets are being written to flash.
    Receiving,
    /// The received image is being read back and checked. Never observable from outside a call.
    Verifying,
}

/// Outcome of the most recent integrity check.
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageStatus {
    /// Nothing has been verified since the last init
    #[default]
    Unknown,
    Valid,
    /// Checksum mismatch. The stored checksum has been replaced with the invalid marker.
    Invalid,
}

/// Keys of the durable configuration. Each holds a single `u32`.
// Note: with A/B partitions these would need one set of keys per partition.
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    /// CRC of the committed image, or the invalid marker
    Checksum,
    RegionStart,
    RegionEnd,
    /// Length in bytes of the committed image
    RegionSize,
    /// Non-zero if the image must be verified before it is started
    VerifyBeforeJump,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 5] = [
        ConfigKey::Checksum,
        ConfigKey::RegionStart,
        ConfigKey::RegionEnd,
        ConfigKey::RegionSize,
        ConfigKey::VerifyBeforeJump,
    ];

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

/// Hardware abstraction for the durable configuration. Usually backed by a reserved flash page,
/// EEPROM or option bytes. Values must survive a reset.
pub trait ConfigStore {
    type Error;

    /// Read a value. `Ok(None)` means the key was never written.
    fn read(&mut self, key: ConfigKey) -> Result<Option<u32>, Self::Error>;
    /// Durably store a value
    fn write(&mut self, key: ConfigKey, value: u32) -> Result<(), Self::Error>;
}

impl<T: ConfigStore + ?Sized> ConfigStore for &mut T {
    type Error = T::Error;

    fn read(&mut self, key: ConfigKey) -> Result<Option<u32>, Self::Error> {
        (**self).read(key)
    }

    fn write(&mut self, key: ConfigKey, value: u32) -> Result<(), Self::Error> {
        (**self).write(key, value)
    }
}
