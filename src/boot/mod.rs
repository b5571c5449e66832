mod packet;
mod session;

use embedded_storage::nor_flash::{ErrorType, NorFlash};

use crate::{
    error::{Error, Violation},
    hardware::MAX_WRITE_SIZE,
    log,
    protocol::{Packet, MAX_PACKET_SIZE},
    state::{BootloaderState, ConfigKey, ConfigStore, ImageStatus},
    verify::{self, Verdict},
};

use session::TransferSession;

#[cfg(feature = "use-defmt")]
use defmt::Format;

/// Error type of a [`Bootloader`] over the given flash and config store.
pub type BootError<FLASH, STORE> =
    Error<<FLASH as ErrorType>::Error, <STORE as ConfigStore>::Error>;

/// What the startup code should do after [`Bootloader::run`].
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootAction {
    /// The image may be started
    JumpToApplication,
    /// Stay in the bootloader and wait for a transfer
    AwaitUpdate,
}

/// The update core. Construct it once at startup with the flash holding the application and the
/// durable config store, call [`init`](Self::init) and [`run`](Self::run), then hand it every
/// packet the transport delivers.
///
/// `READ_CHUNK` is the size of the stack buffer used to read the image back during verification.
///
/// Not reentrant: the caller must not overlap calls, the bootloader does no locking.
pub struct Bootloader<FLASH: NorFlash, STORE: ConfigStore, const READ_CHUNK: usize> {
    flash: FLASH,
    store: STORE,
    state: BootloaderState,
    session: Option<TransferSession>,
    image: ImageStatus,
}

impl<FLASH: NorFlash, STORE: ConfigStore, const READ_CHUNK: usize>
    Bootloader<FLASH, STORE, READ_CHUNK>
{
    /// create a new instance of the bootloader
    pub fn new(flash: FLASH, store: STORE) -> Self {
        Self {
            flash,
            store,
            state: BootloaderState::Idle,
            session: None,
            image: ImageStatus::Unknown,
        }
    }

    /// Destroy this instance of the bootloader and return access to the flash and config store
    pub fn destroy(self) -> (FLASH, STORE) {
        (self.flash, self.store)
    }

    /// Reset to `Idle`, dropping any transfer in progress.
    pub fn init(&mut self) -> Result<(), BootError<FLASH, STORE>> {
        if self.session.take().is_some() {
            log::warn!("Dropping transfer in progress on init");
        }
        self.state = BootloaderState::Idle;
        self.image = ImageStatus::Unknown;

        if self.flash.capacity() == 0 || READ_CHUNK == 0 {
            log::error!("Flash reports zero capacity or readback buffer is empty");
            return Err(Violation::Unusable.into());
        }
        if FLASH::WRITE_SIZE == 0
            || FLASH::WRITE_SIZE > MAX_WRITE_SIZE
            || !verify::readback_fits::<FLASH, READ_CHUNK>()
        {
            log::error!(
                "Unsupported flash geometry: write size {}, read size {}, readback buffer {}",
                FLASH::WRITE_SIZE,
                FLASH::READ_SIZE,
                READ_CHUNK
            );
            return Err(Violation::Unusable.into());
        }

        log::info!("Bootloader initialized");
        Ok(())
    }

    /// Decide whether the stored application may be started. Verifies the image first if the
    /// config store asks for it. The jump itself is up to the caller.
    pub fn run(&mut self) -> Result<BootAction, BootError<FLASH, STORE>> {
        if self.state != BootloaderState::Idle {
            log::warn!("run() called in state {:?}", self.state);
            return Err(Violation::Busy.into());
        }

        let verify_first =
            verify::require::<_, FLASH::Error>(&mut self.store, ConfigKey::VerifyBeforeJump)?;
        if verify_first == 0 {
            log::info!("Verification disabled, jumping straight to firmware!");
            return Ok(BootAction::JumpToApplication);
        }

        match self.verify()? {
            Verdict::Valid => {
                log::info!("Image verified, safe to jump");
                Ok(BootAction::JumpToApplication)
            }
            Verdict::Invalid => {
                log::error!("Image invalid, waiting for an update");
                Ok(BootAction::AwaitUpdate)
            }
        }
    }

    /// Handle one packet from the transport. `data` must hold exactly one encoded [`Packet`].
    ///
    /// Rejected packets leave the state unchanged, except for violations inside a transfer
    /// (out of bounds data, premature `End`) and flash or store failures, which abort the
    /// transfer back to `Idle`.
    pub fn process_packet(&mut self, data: &[u8]) -> Result<(), BootError<FLASH, STORE>> {
        if data.is_empty() {
            log::warn!("Rejecting empty packet");
            return Err(Violation::Empty.into());
        }
        if data.len() > MAX_PACKET_SIZE {
            log::warn!("Rejecting packet of {} bytes", data.len());
            return Err(Violation::Oversized.into());
        }
        if self.state == BootloaderState::Verifying {
            log::warn!("Packet received during verification");
            return Err(Violation::UnexpectedPacket.into());
        }

        let packet = Packet::decode(data).map_err(|_| {
            log::warn!("Could not decode packet of {} bytes", data.len());
            Error::InvalidArgument(Violation::Malformed)
        })?;

        match packet {
            Packet::Start { size } => self.handle_start(size),
            Packet::Data(chunk) => self.handle_data(chunk),
            Packet::End { checksum } => self.handle_end(checksum),
            Packet::Abort => self.handle_abort(),
        }
    }

    pub fn get_state(&self) -> BootloaderState {
        self.state
    }

    /// Outcome of the last verification since `init`
    pub fn image_status(&self) -> ImageStatus {
        self.image
    }

    /// Bytes received and bytes declared for the transfer in progress
    pub fn progress(&self) -> Option<(u32, u32)> {
        self.session
            .as_ref()
            .map(|session| (session.received(), session.expected_size()))
    }

    // Run the integrity check over the image recorded in the config store. Always ends in Idle.
    fn verify(&mut self) -> Result<Verdict, BootError<FLASH, STORE>> {
        self.state = BootloaderState::Verifying;
        let result =
            verify::verify_image::<FLASH, STORE, READ_CHUNK>(&mut self.flash, &mut self.store);
        self.state = BootloaderState::Idle;

        let verdict = result?;
        self.image = match verdict {
            Verdict::Valid => ImageStatus::Valid,
            Verdict::Invalid => ImageStatus::Invalid,
        };
        Ok(verdict)
    }

    // Drop the transfer in progress, if any, and go back to Idle
    fn abort_session(&mut self) {
        if let Some(_session) = self.session.take() {
            log::info!(
                "Transfer aborted after {} of {} bytes",
                _session.received(),
                _session.expected_size()
            );
        }
        self.state = BootloaderState::Idle;
    }
}
