//! Wire format of the packets the transport hands to the bootloader.
//!
//! Each packet is one `postcard` encoded [`Packet`]. The variant index comes first as a varint
//! (`Start` = 0, `Data` = 1, `End` = 2, `Abort` = 3), followed by the payload: varint integers
//! for `Start` and `End`, a varint length prefix and the raw bytes for `Data`.
//! Framing and error correction are the transport's job, one call carries exactly one packet.

use serde::{Deserialize, Serialize};

#[cfg(feature = "use-defmt")]
use defmt::Format;

/// Largest firmware chunk a single `Data` packet may carry.
pub const MAX_CHUNK_SIZE: usize = 1024;

/// Largest encoded packet accepted. Room for a full chunk plus variant index and length prefix.
pub const MAX_PACKET_SIZE: usize = MAX_CHUNK_SIZE + 8;

/// Operations of the update protocol
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Packet<'a> {
    /// Begin a transfer of an image of `size` bytes. Erases the whole region.
    Start { size: u32 },
    /// Next chunk of the image, written right after the previous one
    Data(&'a [u8]),
    /// All bytes sent. `checksum` is the CRC of the complete image.
    End { checksum: u32 },
    /// Drop the transfer in progress
    Abort,
}

impl<'a> Packet<'a> {
    /// Decode a packet, borrowing `Data` payloads from `bytes`.
    pub fn decode(bytes: &'a [u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }

    /// Encode into `buf`, returning the used part of it.
    pub fn encode<'b>(&self, buf: &'b mut [u8]) -> Result<&'b mut [u8], postcard::Error> {
        postcard::to_slice(self, buf)
    }
}
