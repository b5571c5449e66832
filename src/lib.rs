#![cfg_attr(not(test), no_std)]

pub mod boot;
pub mod error;
pub mod hardware;
pub mod protocol;
pub mod state;
pub mod verify;

#[cfg(test)]
mod mock;

pub use embedded_storage;

pub use boot::{BootAction, BootError, Bootloader};
pub use error::{Error, Violation};
pub use hardware::{Region, MAX_WRITE_SIZE};
pub use protocol::{Packet, MAX_CHUNK_SIZE, MAX_PACKET_SIZE};
pub use state::{BootloaderState, ConfigKey, ConfigStore, ImageStatus};
pub use verify::{checksum, Verdict, INVALID_CHECKSUM};

#[cfg(any(test, feature = "ram-store"))]
pub use state::ram::RamStore;

// Address type in flash and in the config store
pub type Address = u32;

#[cfg(feature = "use-defmt")]
pub(crate) use defmt as log;

#[cfg(all(feature = "use-log", not(feature = "use-defmt")))]
pub(crate) use logger_crate as log;

#[cfg(not(any(feature = "use-log", feature = "use-defmt")))]
pub(crate) mod log {
    macro_rules! info {
        ( $( $x:expr ),* ) => {};
    }
    pub(crate) use info;
    macro_rules! trace {
        ( $( $x:expr ),* ) => {};
    }
    pub(crate) use trace;
    macro_rules! error {
        ( $( $x:expr ),* ) => {};
    }
    pub(crate) use error;
    macro_rules! warner {
        ( $( $x:expr ),* ) => {};
    }
    pub(crate) use warner as warn;
}
