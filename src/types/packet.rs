//! Spectral packet classification

use crate::codec::format::{HT20_BINS, HT40_BINS};
use crate::{Result, ScanError};

/// Packet variants emitted by the spectral scan hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    /// ath9k HT20: 56 sub-carriers
    Ht20 = 1,
    /// ath9k HT40: 128 sub-carriers split into lower/upper halves
    Ht40 = 2,
    /// ath10k: declared but not decodable
    Ath10k = 3,
}

impl PacketKind {
    /// Declared payload length (excluding the 3-byte header) for this kind
    pub const fn declared_length(self) -> u16 {
        match self {
            PacketKind::Ht20 => 73,
            PacketKind::Ht40 => 152,
            PacketKind::Ath10k => 90,
        }
    }

    /// Number of sub-carrier magnitude bytes in the payload
    pub const fn bins(self) -> usize {
        match self {
            PacketKind::Ht20 => HT20_BINS,
            PacketKind::Ht40 => HT40_BINS,
            PacketKind::Ath10k => 64,
        }
    }

    pub fn from_type(kind: u8) -> Option<Self> {
        match kind {
            1 => Some(PacketKind::Ht20),
            2 => Some(PacketKind::Ht40),
            3 => Some(PacketKind::Ath10k),
            _ => None,
        }
    }
}

/// HT40 extension channel position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    /// HT40-: extension channel below the control channel
    Lower,
    /// HT40+: extension channel above the control channel
    Upper,
}

impl ChannelType {
    /// Offset applied to the reported control frequency to get the HT40 centre
    pub const fn offset_mhz(self) -> i32 {
        match self {
            ChannelType::Lower => -10,
            ChannelType::Upper => 10,
        }
    }
}

impl TryFrom<u8> for ChannelType {
    type Error = ScanError;

    fn try_from(chantype: u8) -> Result<Self> {
        match chantype {
            2 => Ok(ChannelType::Lower),
            3 => Ok(ChannelType::Upper),
            _ => Err(ScanError::UnknownChannelType { chantype }),
        }
    }
}
