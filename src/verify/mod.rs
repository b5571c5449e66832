use crc::{Crc, Digest, CRC_32_ISO_HDLC};
use embedded_storage::nor_flash::NorFlash;

use crate::{
    error::{Error, Violation},
    hardware::Region,
    log,
    state::{ConfigKey, ConfigStore},
    Address,
};

#[cfg(feature = "use-defmt")]
use defmt::Format;

/// Type used to store the image checksum
pub type Checksum = u32;

/// Stored in place of the checksum once an image failed verification. This is the erased NVM
/// pattern, so a store that was never programmed also reads as invalid.
pub const INVALID_CHECKSUM: Checksum = 0xFFFF_FFFF;

static CRC: Crc<Checksum> = Crc::<Checksum>::new(&CRC_32_ISO_HDLC);

/// CRC-32 of a complete image, as the host computes it for `End`.
pub fn checksum(bytes: &[u8]) -> Checksum {
    CRC.checksum(bytes)
}

/// Fresh running checksum, seeded with the algorithm's initial value.
pub(crate) fn digest() -> Digest<'static, Checksum> {
    CRC.digest()
}

/// Result of an integrity check
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    /// The stored checksum has been replaced with [`INVALID_CHECKSUM`]
    Invalid,
}

pub(crate) fn require<STORE: ConfigStore, FE>(
    store: &mut STORE,
    key: ConfigKey,
) -> Result<u32, Error<FE, STORE::Error>> {
    store
        .read(key)
        .map_err(Error::Store)?
        .ok_or(Error::Unset(key))
}

/// Whether a `READ_CHUNK` byte buffer can be filled with whole `READ_SIZE` reads
pub(crate) fn readback_fits<FLASH: NorFlash, const READ_CHUNK: usize>() -> bool {
    READ_CHUNK != 0 && FLASH::READ_SIZE != 0 && READ_CHUNK % FLASH::READ_SIZE == 0
}

/// Check the committed image against the checksum in the config store.
///
/// Region bounds, size and checksum are all taken from the store. The image is read back in
/// chunks of `READ_CHUNK` bytes, which must be a multiple of the flash read size. On a mismatch
/// the stored checksum is overwritten with [`INVALID_CHECKSUM`] so later boots see the image as
/// invalid without reading it again. A checksum that already is the marker is left alone.
pub fn verify_image<FLASH, STORE, const READ_CHUNK: usize>(
    flash: &mut FLASH,
    store: &mut STORE,
) -> Result<Verdict, Error<FLASH::Error, STORE::Error>>
where
    FLASH: NorFlash,
    STORE: ConfigStore,
{
    if !readback_fits::<FLASH, READ_CHUNK>() {
        return Err(Error::InvalidArgument(Violation::Unusable));
    }

    let region = Region::new(
        require::<_, FLASH::Error>(store, ConfigKey::RegionStart)?,
        require::<_, FLASH::Error>(store, ConfigKey::RegionEnd)?,
    );
    let size = require::<_, FLASH::Error>(store, ConfigKey::RegionSize)?;
    let expected = require::<_, FLASH::Error>(store, ConfigKey::Checksum)?;

    log::info!(
        "Verifying {} bytes at 0x{:x}, expecting checksum 0x{:x}",
        size,
        region.start,
        expected
    );

    if expected == INVALID_CHECKSUM {
        log::warn!("Image is already marked invalid");
        return Ok(Verdict::Invalid);
    }

    if size == 0
        || !region.is_valid_for(flash.capacity())
        || !region.is_aligned(FLASH::READ_SIZE)
        || !region.contains_span(region.start, size as usize)
    {
        log::error!(
            "Stored layout is inconsistent: region {:?}, size {}",
            region,
            size
        );
        return mark_invalid(store);
    }

    let actual = readback_checksum::<FLASH, STORE::Error, READ_CHUNK>(flash, region.start, size)?;

    if actual == expected {
        log::info!("Image checksum matches");
        Ok(Verdict::Valid)
    } else {
        log::error!(
            "Image checksum mismatch! stored 0x{:x} vs computed 0x{:x}",
            expected,
            actual
        );
        mark_invalid(store)
    }
}

fn readback_checksum<FLASH: NorFlash, SE, const READ_CHUNK: usize>(
    flash: &mut FLASH,
    start: Address,
    size: u32,
) -> Result<Checksum, Error<FLASH::Error, SE>> {
    let mut buf = [0_u8; READ_CHUNK];
    let mut digest = digest();

    let mut address = start;
    let mut remaining = size as usize;
    while remaining > 0 {
        let len = remaining.min(READ_CHUNK);
        // the tail is read up to the next read boundary, the padding is not digested
        let padded = len.div_ceil(FLASH::READ_SIZE) * FLASH::READ_SIZE;
        flash
            .read(address, &mut buf[..padded])
            .map_err(Error::Flash)?;
        log::trace!("Readback: {} bytes at 0x{:x}", len, address);
        digest.update(&buf[..len]);
        address += len as Address;
        remaining -= len;
    }

    Ok(digest.finalize())
}

fn mark_invalid<STORE: ConfigStore, FE>(
    store: &mut STORE,
) -> Result<Verdict, Error<FE, STORE::Error>> {
    store
        .write(ConfigKey::Checksum, INVALID_CHECKSUM)
        .map_err(Error::Store)?;
    Ok(Verdict::Invalid)
}
