//! Spectral scan packet layouts and header parsing
//!
//! Every packet starts with a 3-byte header followed by a fixed block of
//! fields and the raw FFT magnitudes. All multi-byte fields are big-endian.
//!
//! ## Packet Layouts
//!
//! | type | length | fields (bytes) | magnitudes |
//! |------|--------|----------------|------------|
//! | 1 (HT20) | 73 | 17 | 56 × u8 |
//! | 2 (HT40) | 152 | 24 | 128 × u8 |
//! | 3 (ath10k) | 90 | unsupported | |
//!
//! `length` counts the bytes after the header, so a complete packet occupies
//! `HEADER_SIZE + length` bytes of the buffer.

use crate::types::PacketKind;
use crate::{Result, ScanError};

/// Size of the `type:u8, length:u16` packet header
pub const HEADER_SIZE: usize = 3;
/// Size of the HT20 field block following the header
pub const HT20_FIELDS_SIZE: usize = 17;
/// Size of the HT40 field block following the header
pub const HT40_FIELDS_SIZE: usize = 24;
/// HT20 sub-carrier magnitudes per packet
pub const HT20_BINS: usize = 56;
/// HT40 sub-carrier magnitudes per packet
pub const HT40_BINS: usize = 128;
/// Spacing between adjacent sub-carriers in MHz
pub const SUBCARRIER_SPACING_MHZ: f64 = 0.3125;
/// Offset of HT20 sub-carrier 0 below the channel centre (28 bins)
pub const HT20_FIRST_SUBCARRIER_OFFSET_MHZ: f64 = 8.75;
/// Offset of HT40 sub-carrier 0 below the channel centre (64 bins)
pub const HT40_FIRST_SUBCARRIER_OFFSET_MHZ: f64 = 20.0;

/// Packet header: `type: u8` then `length: u16` big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub kind: u8,
    pub length: u16,
}

impl PacketHeader {
    /// Parse a header from the front of `data`; `None` if fewer than 3 bytes remain.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (bytes, _) = data.split_first_chunk::<HEADER_SIZE>()?;
        Some(Self { kind: bytes[0], length: u16::from_be_bytes([bytes[1], bytes[2]]) })
    }

    /// Total bytes occupied by the packet, header included
    pub fn packet_size(&self) -> usize {
        HEADER_SIZE + self.length as usize
    }

    /// Classify the header.
    ///
    /// - `Ok(Some(kind))` for an exact supported `(type, length)` pair
    /// - `Ok(None)` for any other pair: the rest of the buffer is malformed
    /// - `Err(UnsupportedPacket)` for a well-formed ath10k header `(3, 90)`
    pub fn classify(&self) -> Result<Option<PacketKind>> {
        match PacketKind::from_type(self.kind) {
            Some(PacketKind::Ath10k) if self.length == PacketKind::Ath10k.declared_length() => {
                Err(ScanError::unsupported_packet(self.kind, self.length))
            }
            Some(kind) if kind.declared_length() == self.length => Ok(Some(kind)),
            _ => Ok(None),
        }
    }
}

/// HT20 field block (17 bytes after the header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ht20Fields {
    pub max_exp: u8,
    pub freq: u16,
    pub rssi: i8,
    pub noise: i8,
    pub max_mag: u16,
    pub max_index: u8,
    pub bitmap_weight: u8,
    pub tsf: u64,
}

impl Ht20Fields {
    pub fn parse(bytes: &[u8; HT20_FIELDS_SIZE]) -> Self {
        // offset: 0 max_exp, 1 freq, 3 rssi, 4 noise, 5 max_mag, 7 max_index, 8 hweight, 9 tsf
        Self {
            max_exp: bytes[0],
            freq: be_u16(bytes, 1),
            rssi: bytes[3] as i8,
            noise: bytes[4] as i8,
            max_mag: be_u16(bytes, 5),
            max_index: bytes[7],
            bitmap_weight: bytes[8],
            tsf: be_u64(bytes, 9),
        }
    }
}

/// HT40 field block (24 bytes after the header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ht40Fields {
    pub chantype: u8,
    pub freq: u16,
    pub lower_rssi: i8,
    pub upper_rssi: i8,
    pub tsf: u64,
    pub lower_noise: i8,
    pub upper_noise: i8,
    pub lower_max_mag: u16,
    pub upper_max_mag: u16,
    pub lower_max_index: i8,
    pub upper_max_index: i8,
    pub lower_bitmap_weight: i8,
    pub upper_bitmap_weight: i8,
    pub max_exp: i8,
}

impl Ht40Fields {
    pub fn parse(bytes: &[u8; HT40_FIELDS_SIZE]) -> Self {
        Self {
            chantype: bytes[0],
            freq: be_u16(bytes, 1),
            lower_rssi: bytes[3] as i8,
            upper_rssi: bytes[4] as i8,
            tsf: be_u64(bytes, 5),
            lower_noise: bytes[13] as i8,
            upper_noise: bytes[14] as i8,
            lower_max_mag: be_u16(bytes, 15),
            upper_max_mag: be_u16(bytes, 17),
            lower_max_index: bytes[19] as i8,
            upper_max_index: bytes[20] as i8,
            lower_bitmap_weight: bytes[21] as i8,
            upper_bitmap_weight: bytes[22] as i8,
            max_exp: bytes[23] as i8,
        }
    }
}

fn be_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn be_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_be_bytes(bytes)
}
