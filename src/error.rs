use core::fmt;

use crate::state::ConfigKey;

#[cfg(feature = "use-defmt")]
use defmt::Format;

/// Why a call was rejected as an invalid argument. The host is expected to restart the
/// transfer with a fresh `Start` after any of these.
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// Zero length packet
    Empty,
    /// Packet longer than `MAX_PACKET_SIZE`
    Oversized,
    /// Packet could not be decoded
    Malformed,
    /// Packet is not legal in the current state
    UnexpectedPacket,
    /// Data chunk would cross the end of the region
    OutOfBounds,
    /// `End` arrived before all declared bytes were received
    Incomplete,
    /// `Start` declared an image of zero bytes
    EmptyImage,
    /// Declared image is larger than the region, or the region itself is unusable
    InvalidRegion,
    /// A transfer is in progress
    Busy,
    /// A collaborator reported itself unusable
    Unusable,
}

/// Errors surfaced by the bootloader core.
pub enum Error<FLASH, STORE> {
    /// Malformed call or protocol violation
    InvalidArgument(Violation),
    /// Flash erase, write or read failed
    Flash(FLASH),
    /// Config store read or write failed
    Store(STORE),
    /// A required config key has never been written
    Unset(ConfigKey),
    /// The image does not match its checksum
    ChecksumMismatch,
}

impl<FLASH, STORE> Error<FLASH, STORE> {
    /// Flash and store failures point at the device rather than the transfer.
    pub fn is_device_fault(&self) -> bool {
        matches!(self, Self::Flash(_) | Self::Store(_))
    }

    pub fn violation(&self) -> Option<Violation> {
        match self {
            Self::InvalidArgument(violation) => Some(*violation),
            _ => None,
        }
    }
}

impl<FLASH, STORE> From<Violation> for Error<FLASH, STORE> {
    fn from(violation: Violation) -> Self {
        Self::InvalidArgument(violation)
    }
}

impl<FLASH, STORE> fmt::Debug for Error<FLASH, STORE>
where
    FLASH: fmt::Debug,
    STORE: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(arg0) => f.debug_tuple("InvalidArgument").field(arg0).finish(),
            Self::Flash(arg0) => f.debug_tuple("Flash").field(arg0).finish(),
            Self::Store(arg0) => f.debug_tuple("Store").field(arg0).finish(),
            Self::Unset(arg0) => f.debug_tuple("Unset").field(arg0).finish(),
            Self::ChecksumMismatch => f.write_str("ChecksumMismatch"),
        }
    }
}

impl<FLASH, STORE> PartialEq for Error<FLASH, STORE>
where
    FLASH: PartialEq,
    STORE: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidArgument(a), Self::InvalidArgument(b)) => a == b,
            (Self::Flash(a), Self::Flash(b)) => a == b,
            (Self::Store(a), Self::Store(b)) => a == b,
            (Self::Unset(a), Self::Unset(b)) => a == b,
            (Self::ChecksumMismatch, Self::ChecksumMismatch) => true,
            _ => false,
        }
    }
}

impl<FLASH, STORE> fmt::Display for Error<FLASH, STORE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(violation) => write!(f, "invalid argument: {:?}", violation),
            Self::Flash(_) => f.write_str("flash access failed"),
            Self::Store(_) => f.write_str("config store access failed"),
            Self::Unset(key) => write!(f, "config key {:?} was never written", key),
            Self::ChecksumMismatch => f.write_str("image checksum mismatch"),
        }
    }
}
