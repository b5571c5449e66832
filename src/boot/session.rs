use crc::Digest;
use embedded_storage::nor_flash::NorFlash;

use crate::{
    hardware::{Region, MAX_WRITE_SIZE},
    verify,
    verify::Checksum,
    Address,
};

/// Progress of the transfer in flight. Lives only while the bootloader is receiving and is
/// never persisted, so a reset always requires a fresh `Start`.
///
/// Flash is only programmed in whole `WRITE_SIZE` words. Bytes of a partial word are held in
/// `pending` until the next chunk completes the word, or until `flush` pads it with 0xFF.
pub(crate) struct TransferSession {
    region: Region,
    /// Address right after the last byte received. Only moves forward, never leaves the region.
    cursor: Address,
    /// Next word aligned address to program. `cursor - programmed` bytes are pending.
    programmed: Address,
    pending: [u8; MAX_WRITE_SIZE],
    pending_len: usize,
    expected_size: u32,
    digest: Digest<'static, Checksum>,
}

impl TransferSession {
    pub(crate) fn new(region: Region, expected_size: u32) -> Self {
        Self {
            region,
            cursor: region.start,
            programmed: region.start,
            pending: [0xFF; MAX_WRITE_SIZE],
            pending_len: 0,
            expected_size,
            digest: verify::digest(),
        }
    }

    pub(crate) fn region(&self) -> Region {
        self.region
    }

    pub(crate) fn cursor(&self) -> Address {
        self.cursor
    }

    pub(crate) fn expected_size(&self) -> u32 {
        self.expected_size
    }

    pub(crate) fn received(&self) -> u32 {
        self.cursor - self.region.start
    }

    /// Whether `len` more bytes fit between the cursor and the end of the region
    pub(crate) fn fits(&self, len: usize) -> bool {
        self.region.contains_span(self.cursor, len)
    }

    /// Program a chunk at the cursor. Whole words go to flash, a trailing partial word is
    /// kept back. The region must be aligned to `F::WRITE_SIZE`, which must not exceed
    /// [`MAX_WRITE_SIZE`].
    pub(crate) fn program<F: NorFlash>(
        &mut self,
        flash: &mut F,
        chunk: &[u8],
    ) -> Result<(), F::Error> {
        debug_assert!(self.fits(chunk.len()));
        let word = F::WRITE_SIZE;
        let mut rest = chunk;

        if self.pending_len > 0 {
            let take = (word - self.pending_len).min(rest.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&rest[..take]);
            self.pending_len += take;
            rest = &rest[take..];

            if self.pending_len == word {
                flash.write(self.programmed, &self.pending[..word])?;
                self.programmed += word as Address;
                self.pending_len = 0;
            }
        }

        let aligned = rest.len() - rest.len() % word;
        if aligned > 0 {
            flash.write(self.programmed, &rest[..aligned])?;
            self.programmed += aligned as Address;
            rest = &rest[aligned..];
        }

        // pending is empty whenever bytes are left over here
        if !rest.is_empty() {
            self.pending[..rest.len()].copy_from_slice(rest);
            self.pending_len = rest.len();
        }

        self.cursor += chunk.len() as Address;
        self.digest.update(chunk);
        Ok(())
    }

    /// Program the held back partial word, padded with the erased value.
    pub(crate) fn flush<F: NorFlash>(&mut self, flash: &mut F) -> Result<(), F::Error> {
        if self.pending_len == 0 {
            return Ok(());
        }
        let word = F::WRITE_SIZE;
        self.pending[self.pending_len..word].fill(0xFF);
        flash.write(self.programmed, &self.pending[..word])?;
        self.programmed += word as Address;
        self.pending_len = 0;
        Ok(())
    }

    /// Close the transfer, yielding the checksum over everything received
    pub(crate) fn finish(self) -> Checksum {
        self.digest.finalize()
    }
}
