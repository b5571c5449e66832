use embedded_storage::nor_flash::NorFlash;

use super::{session::TransferSession, BootError, Bootloader};
use crate::{
    error::{Error, Violation},
    hardware::Region,
    log,
    protocol::MAX_CHUNK_SIZE,
    state::{BootloaderState, ConfigKey, ConfigStore, ImageStatus},
    verify::{self, Checksum, Verdict, INVALID_CHECKSUM},
};

impl<FLASH: NorFlash, STORE: ConfigStore, const READ_CHUNK: usize>
    Bootloader<FLASH, STORE, READ_CHUNK>
{
    // Start a transfer, superseding one that is already in progress
    pub(super) fn handle_start(&mut self, size: u32) -> Result<(), BootError<FLASH, STORE>> {
        let region = self.configured_region()?;

        if !region.is_valid_for(self.flash.capacity()) {
            log::error!(
                "Configured region {:?} does not fit flash of {} bytes",
                region,
                self.flash.capacity()
            );
            return Err(Violation::InvalidRegion.into());
        }
        if !region.is_aligned(FLASH::WRITE_SIZE) || !region.is_aligned(FLASH::READ_SIZE) {
            log::error!(
                "Configured region {:?} is not aligned to write size {} and read size {}",
                region,
                FLASH::WRITE_SIZE,
                FLASH::READ_SIZE
            );
            return Err(Violation::InvalidRegion.into());
        }
        if size == 0 {
            log::warn!("Start of an empty image");
            return Err(Violation::EmptyImage.into());
        }
        if size > region.capacity() {
            log::warn!(
                "Image of {} bytes does not fit region of {} bytes",
                size,
                region.capacity()
            );
            return Err(Violation::InvalidRegion.into());
        }

        if let Some(_previous) = self.session.take() {
            log::warn!(
                "Restarting transfer, dropping {} of {} bytes",
                _previous.received(),
                _previous.expected_size()
            );
        }
        self.state = BootloaderState::Idle;
        // Whatever was verified before no longer survives the erase
        self.image = ImageStatus::Unknown;

        // The committed image is about to be erased
        self.store
            .write(ConfigKey::Checksum, INVALID_CHECKSUM)
            .map_err(|e| {
                log::error!("Failed to invalidate stored checksum");
                Error::Store(e)
            })?;

        log::info!(
            "Erasing region 0x{:x}..0x{:x} for image of {} bytes",
            region.start,
            region.end,
            size
        );
        self.flash.erase(region.start, region.end).map_err(|e| {
            log::error!("Failed to erase region {:?}", region);
            Error::Flash(e)
        })?;

        self.session = Some(TransferSession::new(region, size));
        self.state = BootloaderState::Receiving;
        Ok(())
    }

    // Program the next chunk at the cursor
    pub(super) fn handle_data(&mut self, chunk: &[u8]) -> Result<(), BootError<FLASH, STORE>> {
        let session = match self.session.as_mut() {
            Some(session) if self.state == BootloaderState::Receiving => session,
            _ => {
                log::warn!("Data packet without a transfer in progress");
                return Err(Violation::UnexpectedPacket.into());
            }
        };

        if chunk.len() > MAX_CHUNK_SIZE {
            log::warn!("Rejecting chunk of {} bytes", chunk.len());
            return Err(Violation::Oversized.into());
        }

        if !session.fits(chunk.len()) {
            log::warn!(
                "Chunk of {} bytes at 0x{:x} crosses region end 0x{:x}",
                chunk.len(),
                session.cursor(),
                session.region().end
            );
            self.abort_session();
            return Err(Violation::OutOfBounds.into());
        }

        if chunk.is_empty() {
            return Ok(());
        }

        log::trace!("Writing {} bytes at 0x{:x}", chunk.len(), session.cursor());
        match session.program(&mut self.flash, chunk) {
            Ok(()) => Ok(()),
            Err(e) => {
                // Never retried, the cells may already be partially programmed
                log::error!("Flash write failed, aborting transfer");
                self.abort_session();
                Err(Error::Flash(e))
            }
        }
    }

    // Close the transfer, commit it to the config store and verify it
    pub(super) fn handle_end(&mut self, claimed: Checksum) -> Result<(), BootError<FLASH, STORE>> {
        let mut session = match self.session.take() {
            Some(session) if self.state == BootloaderState::Receiving => session,
            other => {
                self.session = other;
                log::warn!("End packet without a transfer in progress");
                return Err(Violation::UnexpectedPacket.into());
            }
        };
        self.state = BootloaderState::Idle;

        if session.received() != session.expected_size() {
            log::warn!(
                "End after {} of {} bytes, aborting transfer",
                session.received(),
                session.expected_size()
            );
            return Err(Violation::Incomplete.into());
        }

        session.flush(&mut self.flash).map_err(|e| {
            log::error!("Failed to program the final word, aborting transfer");
            Error::Flash(e)
        })?;

        let region = session.region();
        let size = session.expected_size();
        let running = session.finish();
        if running != claimed {
            log::error!(
                "Received image checksum 0x{:x} does not match claimed 0x{:x}",
                running,
                claimed
            );
            return Err(Error::ChecksumMismatch);
        }

        self.commit(region, size, running)?;

        match self.verify()? {
            Verdict::Valid => {
                log::info!("Update of {} bytes complete", size);
                Ok(())
            }
            Verdict::Invalid => Err(Error::ChecksumMismatch),
        }
    }

    pub(super) fn handle_abort(&mut self) -> Result<(), BootError<FLASH, STORE>> {
        if self.session.is_none() {
            log::trace!("Abort without a transfer in progress");
        }
        self.abort_session();
        Ok(())
    }

    fn configured_region(&mut self) -> Result<Region, BootError<FLASH, STORE>> {
        Ok(Region::new(
            verify::require::<_, FLASH::Error>(&mut self.store, ConfigKey::RegionStart)?,
            verify::require::<_, FLASH::Error>(&mut self.store, ConfigKey::RegionEnd)?,
        ))
    }

    // Record the received image. The checksum goes last so an interrupted commit still reads
    // as invalid.
    fn commit(
        &mut self,
        region: Region,
        size: u32,
        checksum: Checksum,
    ) -> Result<(), BootError<FLASH, STORE>> {
        let values = [
            (ConfigKey::RegionStart, region.start),
            (ConfigKey::RegionEnd, region.end),
            (ConfigKey::RegionSize, size),
            (ConfigKey::Checksum, checksum),
        ];

        for (key, value) in values {
            self.store.write(key, value).map_err(|e| {
                log::error!("Failed to store {:?}", key);
                Error::Store(e)
            })?;
        }

        log::info!(
            "Committed image of {} bytes with checksum 0x{:x}",
            size,
            checksum
        );
        Ok(())
    }
}
