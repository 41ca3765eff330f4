//! Ch10 packet header and optional secondary header.
//!
//! Every multi-byte field on the wire is little-endian, including the
//! sync pattern itself, so this module decodes by explicit
//! `u16`/`u32::from_le_bytes` reads and manual mask/shift on the single
//! flags byte -- it does not lean on any language's native bitfield
//! layout (big-endian, little-endian, or otherwise), matching
//! `SPEC_FULL.md` §9's design note on that point.

use crate::element::ByteCursor;
use crate::error::{Ch10Error, HeaderErrorKind, Result};

/// The fixed 16-bit Ch10 packet sync pattern, little-endian on the wire.
pub const SYNC_PATTERN: u16 = 0xEB25;

/// Packet header size in bytes.
pub const HEADER_SIZE: usize = 24;

/// Optional secondary header size in bytes.
pub const SECONDARY_HEADER_SIZE: usize = 12;

/// Checksum mode carried in the packet flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumMode {
    /// No checksum present.
    None,
    /// 8-bit unsigned sum of the header bytes preceding the checksum field.
    Sum8,
    /// 16-bit unsigned sum of the header bytes preceding the checksum field.
    Sum16,
    /// CRC-16 of the header bytes preceding the checksum field.
    Crc16,
}

impl ChecksumMode {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => ChecksumMode::None,
            1 => ChecksumMode::Sum8,
            2 => ChecksumMode::Sum16,
            _ => ChecksumMode::Crc16,
        }
    }
}

/// Flags-byte bit positions (byte 14 of the header), MSB first:
/// `secondary_header_present(1) | time_fmt(1) | ipts_source(2) |
/// checksum_mode(2) | overflow(1) | reserved(1)`. Single-byte fields
/// have no endianness of their own; this layout is this crate's own
/// choice, unlike the little-endian multi-byte fields around it.
mod flags {
    pub const SECONDARY_HEADER_PRESENT: u8 = 0b1000_0000;
    pub const IPTS_SOURCE_SHIFT: u8 = 4;
    pub const IPTS_SOURCE_MASK: u8 = 0b11;
    pub const CHECKSUM_MODE_SHIFT: u8 = 2;
    pub const CHECKSUM_MODE_MASK: u8 = 0b11;
}

/// Decoded, validated Ch10 packet header.
#[derive(Debug, Clone, Copy)]
pub struct PacketHeader {
    pub channel_id: u16,
    pub packet_length: u32,
    pub data_length: u32,
    pub header_version: u8,
    pub sequence_number: u8,
    pub secondary_header_present: bool,
    pub ipts_source: u8,
    pub checksum_mode: ChecksumMode,
    pub data_type: u8,
    pub rtc_low: u32,
    pub rtc_high: u16,
    /// Absolute byte offset of the first header byte within the worker's
    /// chunk, recorded so resync/error reporting can point back to it.
    pub location: u64,
}

/// Decoded optional secondary header.
#[derive(Debug, Clone, Copy)]
pub struct SecondaryHeader {
    pub time_low: u32,
    pub time_high: u32,
}

fn sum8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

fn sum16(bytes: &[u8]) -> u16 {
    bytes
        .chunks(2)
        .map(|c| {
            if c.len() == 2 {
                u16::from_le_bytes([c[0], c[1]])
            } else {
                c[0] as u16
            }
        })
        .fold(0u16, |acc, w| acc.wrapping_add(w))
}

const CRC16: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_IBM_3740);

fn crc16(bytes: &[u8]) -> u16 {
    CRC16.checksum(bytes)
}

/// Verify a header's checksum field against `checksum_mode`, given the raw
/// header bytes excluding the trailing 2-byte checksum field itself.
fn verify_checksum(mode: ChecksumMode, body: &[u8], recorded: u16) -> bool {
    match mode {
        ChecksumMode::None => true,
        ChecksumMode::Sum8 => sum8(body) as u16 == recorded,
        ChecksumMode::Sum16 => sum16(body) == recorded,
        ChecksumMode::Crc16 => crc16(body) == recorded,
    }
}

/// Attempt to decode a [`PacketHeader`] from exactly [`HEADER_SIZE`] bytes
/// starting at `location`. Does not itself advance any cursor; callers
/// (the dispatcher's `SeekSync` state) pass in a candidate window.
///
/// Returns `None` (not an error) when the sync pattern does not match --
/// the caller advances by one byte and retries. Returns
/// `Err(HeaderError::ChecksumMismatch)` when the sync matched but the
/// checksum did not.
pub fn try_decode_header(bytes: &[u8; HEADER_SIZE], location: u64) -> Result<Option<PacketHeader>> {
    let mut cursor = ByteCursor::new(bytes);
    let sync = cursor.read_le_u16()?;
    if sync != SYNC_PATTERN {
        return Ok(None);
    }

    let channel_id = cursor.read_le_u16()?;
    let packet_length = cursor.read_le_u32()?;
    let data_length = cursor.read_le_u32()?;
    let header_version = cursor.read_u8()?;
    let sequence_number = cursor.read_u8()?;
    let flags_byte = cursor.read_u8()?;
    let secondary_header_present = flags_byte & flags::SECONDARY_HEADER_PRESENT != 0;
    let ipts_source = (flags_byte >> flags::IPTS_SOURCE_SHIFT) & flags::IPTS_SOURCE_MASK;
    let checksum_mode = ChecksumMode::from_bits(flags_byte >> flags::CHECKSUM_MODE_SHIFT);
    let data_type = cursor.read_u8()?;
    let rtc_low = cursor.read_le_u32()?;
    let rtc_high = cursor.read_le_u16()?;
    let recorded = cursor.read_le_u16()?;

    if !verify_checksum(checksum_mode, &bytes[..HEADER_SIZE - 2], recorded) {
        return Err(Ch10Error::HeaderError(HeaderErrorKind::ChecksumMismatch {
            location,
            data_type,
        }));
    }

    Ok(Some(PacketHeader {
        channel_id,
        packet_length,
        data_length,
        header_version,
        sequence_number,
        secondary_header_present,
        ipts_source,
        checksum_mode,
        data_type,
        rtc_low,
        rtc_high,
        location,
    }))
}

/// Decode a secondary header from exactly [`SECONDARY_HEADER_SIZE`] bytes.
/// Checksum verification follows the same `checksum_mode` as the primary
/// header.
pub fn try_decode_secondary_header(
    bytes: &[u8; SECONDARY_HEADER_SIZE],
    checksum_mode: ChecksumMode,
    location: u64,
) -> Result<SecondaryHeader> {
    let mut cursor = ByteCursor::new(bytes);
    let time_low = cursor.read_le_u32()?;
    let time_high = cursor.read_le_u32()?;
    let _reserved = cursor.read_le_u16()?;
    let recorded = cursor.read_le_u16()?;
    if !verify_checksum(checksum_mode, &bytes[..SECONDARY_HEADER_SIZE - 2], recorded) {
        return Err(Ch10Error::HeaderError(HeaderErrorKind::ChecksumMismatch {
            location,
            data_type: 0,
        }));
    }
    Ok(SecondaryHeader { time_low, time_high })
}

/// `header.packet_length` must exceed the header size, and the declared
/// data length must fit within the packet after subtracting the header
/// (and optional secondary header) size.
pub fn is_internally_consistent(header: &PacketHeader) -> bool {
    let fixed_size = HEADER_SIZE as u32
        + if header.secondary_header_present {
            SECONDARY_HEADER_SIZE as u32
        } else {
            0
        };
    header.packet_length > HEADER_SIZE as u32 && header.data_length <= header.packet_length.saturating_sub(fixed_size)
}

/// Build a complete, checksum-consistent 24-byte header for testing
/// (both this module's own unit tests and the crate's `tests/`
/// integration suite, which has no other way to produce raw header
/// bytes with a specific checksum already baked in).
#[doc(hidden)]
#[allow(clippy::too_many_arguments)]
pub fn build_header_bytes(
    channel_id: u16,
    packet_length: u32,
    data_length: u32,
    sequence_number: u8,
    checksum_mode: ChecksumMode,
    data_type: u8,
    rtc_low: u32,
    rtc_high: u16,
) -> [u8; HEADER_SIZE] {
    let checksum_bits: u8 = match checksum_mode {
        ChecksumMode::None => 0,
        ChecksumMode::Sum8 => 1,
        ChecksumMode::Sum16 => 2,
        ChecksumMode::Crc16 => 3,
    };

    let mut bytes = [0u8; HEADER_SIZE];
    bytes[0..2].copy_from_slice(&SYNC_PATTERN.to_le_bytes());
    bytes[2..4].copy_from_slice(&channel_id.to_le_bytes());
    bytes[4..8].copy_from_slice(&packet_length.to_le_bytes());
    bytes[8..12].copy_from_slice(&data_length.to_le_bytes());
    bytes[12] = 0x42;
    bytes[13] = sequence_number;
    bytes[14] = checksum_bits << flags::CHECKSUM_MODE_SHIFT;
    bytes[15] = data_type;
    bytes[16..20].copy_from_slice(&rtc_low.to_le_bytes());
    bytes[20..22].copy_from_slice(&rtc_high.to_le_bytes());

    let recorded: u16 = match checksum_mode {
        ChecksumMode::None => 0,
        ChecksumMode::Sum8 => sum8(&bytes[..HEADER_SIZE - 2]) as u16,
        ChecksumMode::Sum16 => sum16(&bytes[..HEADER_SIZE - 2]),
        ChecksumMode::Crc16 => crc16(&bytes[..HEADER_SIZE - 2]),
    };
    bytes[HEADER_SIZE - 2..].copy_from_slice(&recorded.to_le_bytes());
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header_bytes(checksum_mode: u8) -> [u8; HEADER_SIZE] {
        let mode = ChecksumMode::from_bits(checksum_mode);
        build_header_bytes(7, HEADER_SIZE as u32 + 4, 4, 1, mode, 0x19, 0x1122_3344, 0x5566)
    }

    #[test]
    fn rejects_bad_sync() {
        let mut bytes = sample_header_bytes(0);
        bytes[0] ^= 0xFF;
        let decoded = try_decode_header(&bytes, 0).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn accepts_checksum_none() {
        let bytes = sample_header_bytes(0);
        let decoded = try_decode_header(&bytes, 0).unwrap();
        assert!(decoded.is_some());
        let header = decoded.unwrap();
        assert_eq!(header.channel_id, 7);
        assert_eq!(header.data_type, 0x19);
        assert!(is_internally_consistent(&header));
    }

    #[test]
    fn combine_rtc_matches_spec_formula() {
        let bytes = sample_header_bytes(0);
        let header = try_decode_header(&bytes, 0).unwrap().unwrap();
        let combined = crate::time::combine_rtc(header.rtc_low, header.rtc_high as u32);
        assert_eq!(combined, ((header.rtc_high as u64) << 32) | header.rtc_low as u64);
    }
}
