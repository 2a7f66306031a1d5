//! Packet builders for tests and benchmarks
//!
//! Builds byte-exact HT20/HT40 spectral packets so codec, pool and hub tests
//! can run without radio hardware.

#![cfg(any(test, feature = "benchmark"))]

use crate::codec::format::{HT20_BINS, HT40_BINS};
use crate::types::PacketKind;

/// Builder for one HT20 (type 1) packet.
#[derive(Debug, Clone)]
pub struct Ht20Packet {
    pub max_exp: u8,
    pub freq: u16,
    pub rssi: i8,
    pub noise: i8,
    pub max_mag: u16,
    pub max_index: u8,
    pub bitmap_weight: u8,
    pub tsf: u64,
    pub magnitudes: [u8; HT20_BINS],
}

impl Default for Ht20Packet {
    fn default() -> Self {
        Self {
            max_exp: 0,
            freq: 2437,
            rssi: 20,
            noise: -95,
            max_mag: 0,
            max_index: 0,
            bitmap_weight: 0,
            tsf: 0,
            magnitudes: [10; HT20_BINS],
        }
    }
}

impl Ht20Packet {
    pub fn with_tsf(mut self, tsf: u64) -> Self {
        self.tsf = tsf;
        self
    }

    pub fn with_magnitudes(mut self, magnitudes: [u8; HT20_BINS]) -> Self {
        self.magnitudes = magnitudes;
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + PacketKind::Ht20.declared_length() as usize);
        out.push(PacketKind::Ht20 as u8);
        out.extend_from_slice(&PacketKind::Ht20.declared_length().to_be_bytes());
        out.push(self.max_exp);
        out.extend_from_slice(&self.freq.to_be_bytes());
        out.push(self.rssi as u8);
        out.push(self.noise as u8);
        out.extend_from_slice(&self.max_mag.to_be_bytes());
        out.push(self.max_index);
        out.push(self.bitmap_weight);
        out.extend_from_slice(&self.tsf.to_be_bytes());
        out.extend_from_slice(&self.magnitudes);
        out
    }
}

/// Builder for one HT40 (type 2) packet.
#[derive(Debug, Clone)]
pub struct Ht40Packet {
    pub chantype: u8,
    pub freq: u16,
    pub lower_rssi: i8,
    pub upper_rssi: i8,
    pub tsf: u64,
    pub lower_noise: i8,
    pub upper_noise: i8,
    pub max_exp: i8,
    pub magnitudes: [u8; HT40_BINS],
}

impl Default for Ht40Packet {
    fn default() -> Self {
        Self {
            chantype: 3,
            freq: 5180,
            lower_rssi: 10,
            upper_rssi: 14,
            tsf: 0,
            lower_noise: -96,
            upper_noise: -92,
            max_exp: 0,
            magnitudes: [20; HT40_BINS],
        }
    }
}

impl Ht40Packet {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(3 + PacketKind::Ht40.declared_length() as usize);
        out.push(PacketKind::Ht40 as u8);
        out.extend_from_slice(&PacketKind::Ht40.declared_length().to_be_bytes());
        out.push(self.chantype);
        out.extend_from_slice(&self.freq.to_be_bytes());
        out.push(self.lower_rssi as u8);
        out.push(self.upper_rssi as u8);
        out.extend_from_slice(&self.tsf.to_be_bytes());
        out.push(self.lower_noise as u8);
        out.push(self.upper_noise as u8);
        // max_mag lower/upper, max_index lower/upper, bitmap weight lower/upper
        out.extend_from_slice(&[0u8; 8]);
        out.push(self.max_exp as u8);
        out.extend_from_slice(&self.magnitudes);
        out
    }
}

/// Concatenate encoded packets into one driver-aligned buffer
pub fn frame_of(packets: &[Vec<u8>]) -> Vec<u8> {
    packets.concat()
}

/// A frame of `count` HT20 packets with ascending TSF starting at `first_tsf`
pub fn ht20_frame(first_tsf: u64, count: usize) -> Vec<u8> {
    (0..count as u64)
        .map(|i| Ht20Packet::default().with_tsf(first_tsf + i).encode())
        .collect::<Vec<_>>()
        .concat()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::format::HEADER_SIZE;

    #[test]
    fn encoded_sizes_match_declared_lengths() {
        assert_eq!(Ht20Packet::default().encode().len(), HEADER_SIZE + 73);
        assert_eq!(Ht40Packet::default().encode().len(), HEADER_SIZE + 152);
        assert_eq!(ht20_frame(0, 3).len(), 3 * (HEADER_SIZE + 73));
    }
}
