//! Lazy spectral packet decoder
//!
//! [`decode`] scans a driver-aligned buffer from offset 0 and yields one
//! [`DecodedSample`] per packet. The sequence ends when fewer than a header's
//! worth of bytes remain, when the trailing packet is incomplete, or when a
//! header declares an unknown `(type, length)` pair. Packets whose band power
//! sums to zero are dropped and decoding carries on. Unsupported packet types
//! and unknown HT40 channel types are yielded as errors and end the sequence.

use chrono::{DateTime, Utc};
use std::iter::FusedIterator;
use tracing::{debug, trace, warn};

use super::format::{
    HEADER_SIZE, HT20_FIELDS_SIZE, HT20_FIRST_SUBCARRIER_OFFSET_MHZ, HT40_FIELDS_SIZE,
    HT40_FIRST_SUBCARRIER_OFFSET_MHZ, Ht20Fields, Ht40Fields, PacketHeader, SUBCARRIER_SPACING_MHZ,
};
use crate::types::{ChannelType, DecodedSample, PacketKind, PowerSpectrum, RawFrame};
use crate::{Result, ScanError};

// HT40 half-band power totals: bins 63 and 127 are left out of their totals
const HT40_LOWER_TOTAL_BINS: std::ops::RangeInclusive<usize> = 0..=62;
const HT40_UPPER_TOTAL_BINS: std::ops::RangeInclusive<usize> = 64..=126;
const HT40_HALF: usize = PacketKind::Ht40.bins() / 2;

/// Decode all packets in `buffer`, stamping samples with the current host time.
pub fn decode(buffer: &[u8], emit_power: bool) -> Decode<'_> {
    Decode::new(buffer, emit_power, Utc::now())
}

/// Decode all packets in a raw frame, stamping samples with the frame's read time.
pub fn decode_frame(frame: &RawFrame, emit_power: bool) -> Decode<'_> {
    Decode::new(frame.as_bytes(), emit_power, frame.received_at)
}

/// Lazy, finite, non-restartable sequence of decoded samples over one buffer.
#[derive(Debug)]
pub struct Decode<'a> {
    data: &'a [u8],
    pos: usize,
    emit_power: bool,
    timestamp: DateTime<Utc>,
    finished: bool,
    stats: DecodeStats,
}

/// What happened while decoding one buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Samples yielded
    pub samples: u64,
    /// Packets dropped because a band carried zero power
    pub dropped: u64,
    /// Decoding stopped at a malformed header
    pub malformed: bool,
    /// Bytes left undecoded at the tail of the buffer
    pub trailing_bytes: usize,
}

impl<'a> Decode<'a> {
    pub fn new(data: &'a [u8], emit_power: bool, timestamp: DateTime<Utc>) -> Self {
        Self { data, pos: 0, emit_power, timestamp, finished: false, stats: DecodeStats::default() }
    }

    /// Counters for the part of the buffer consumed so far
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    fn finish(&mut self) {
        self.finished = true;
        self.stats.trailing_bytes = self.data.len() - self.pos;
    }

    fn decode_packet(&self, kind: PacketKind, body: &[u8]) -> Result<Option<DecodedSample>> {
        match kind {
            PacketKind::Ht20 => Ok(self.decode_ht20(body)),
            PacketKind::Ht40 => self.decode_ht40(body),
            PacketKind::Ath10k => {
                Err(ScanError::unsupported_packet(kind as u8, kind.declared_length()))
            }
        }
    }

    fn decode_ht20(&self, body: &[u8]) -> Option<DecodedSample> {
        let (fields, magnitudes) = body.split_first_chunk::<HT20_FIELDS_SIZE>()?;
        let fields = Ht20Fields::parse(fields);
        let noise = i32::from(fields.noise);
        let rssi = i32::from(fields.rssi);

        let power = if self.emit_power {
            let bins = PacketKind::Ht20.bins();
            let samples = squared_magnitudes(&magnitudes[..bins], i32::from(fields.max_exp));
            let total_db = band_total_db(&samples)?;
            let mean = mean(&samples);
            let sub_0 = f64::from(fields.freq) - HT20_FIRST_SUBCARRIER_OFFSET_MHZ;

            let mut power = PowerSpectrum::with_capacity(bins);
            for (i, &sample) in samples.iter().enumerate() {
                power.push(
                    subcarrier_freq(sub_0, i),
                    bin_power_dbm(sample, mean, noise + rssi, total_db),
                );
            }
            power
        } else {
            PowerSpectrum::new()
        };

        Some(DecodedSample {
            timestamp: self.timestamp,
            tsf: fields.tsf,
            center_freq_mhz: u32::from(fields.freq),
            noise_floor_dbm: noise,
            rssi,
            power,
        })
    }

    fn decode_ht40(&self, body: &[u8]) -> Result<Option<DecodedSample>> {
        let Some((fields, magnitudes)) = body.split_first_chunk::<HT40_FIELDS_SIZE>() else {
            return Ok(None);
        };
        let fields = Ht40Fields::parse(fields);
        let chantype = ChannelType::try_from(fields.chantype)?;
        let center_freq = (i32::from(fields.freq) + chantype.offset_mhz()).max(0) as u32;

        let lower_noise = i32::from(fields.lower_noise);
        let upper_noise = i32::from(fields.upper_noise);
        let lower_rssi = i32::from(fields.lower_rssi);
        let upper_rssi = i32::from(fields.upper_rssi);

        let power = if self.emit_power {
            let bins = PacketKind::Ht40.bins();
            let samples = squared_magnitudes(&magnitudes[..bins], i32::from(fields.max_exp));
            let Some(lower_db) = band_total_db(&samples[HT40_LOWER_TOTAL_BINS]) else {
                return Ok(None);
            };
            let Some(upper_db) = band_total_db(&samples[HT40_UPPER_TOTAL_BINS]) else {
                return Ok(None);
            };
            let mean = mean(&samples);
            let sub_0 = f64::from(center_freq) - HT40_FIRST_SUBCARRIER_OFFSET_MHZ;

            let mut power = PowerSpectrum::with_capacity(bins);
            for (i, &sample) in samples.iter().enumerate() {
                let (offset_db, total_db) = if i < HT40_HALF {
                    (lower_noise + lower_rssi, lower_db)
                } else {
                    (upper_noise + upper_rssi, upper_db)
                };
                power.push(subcarrier_freq(sub_0, i), bin_power_dbm(sample, mean, offset_db, total_db));
            }
            power
        } else {
            PowerSpectrum::new()
        };

        Ok(Some(DecodedSample {
            timestamp: self.timestamp,
            tsf: fields.tsf,
            center_freq_mhz: center_freq,
            noise_floor_dbm: (lower_noise + upper_noise) / 2,
            rssi: (lower_rssi + upper_rssi) / 2,
            power,
        }))
    }
}

impl Iterator for Decode<'_> {
    type Item = Result<DecodedSample>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let remaining = &self.data[self.pos..];
            let Some(header) = PacketHeader::parse(remaining) else {
                self.finish();
                break;
            };

            let kind = match header.classify() {
                Ok(Some(kind)) => kind,
                Ok(None) => {
                    warn!(
                        kind = header.kind,
                        length = header.length,
                        pos = self.pos,
                        "Skipping malformed packet"
                    );
                    self.stats.malformed = true;
                    self.finish();
                    break;
                }
                Err(e) => {
                    self.finish();
                    return Some(Err(e));
                }
            };

            let size = header.packet_size();
            if remaining.len() < size {
                debug!(
                    ?kind,
                    pos = self.pos,
                    available = remaining.len(),
                    size,
                    "Incomplete packet at end of buffer"
                );
                self.finish();
                break;
            }

            let body = &remaining[HEADER_SIZE..size];
            let packet_pos = self.pos;
            self.pos += size;

            match self.decode_packet(kind, body) {
                Ok(Some(sample)) => {
                    self.stats.samples += 1;
                    return Some(Ok(sample));
                }
                Ok(None) => {
                    trace!(?kind, pos = packet_pos, "Dropped zero-power packet");
                    self.stats.dropped += 1;
                }
                Err(e) => {
                    self.finish();
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

impl FusedIterator for Decode<'_> {}

/// `(m << max_exp)^2` for every magnitude byte.
///
/// Computed in f64: exact for every value below 2^53 and free of overflow for
/// any exponent the hardware can report.
fn squared_magnitudes(magnitudes: &[u8], max_exp: i32) -> Vec<f64> {
    let scale = 2f64.powi(max_exp);
    magnitudes
        .iter()
        .map(|&m| {
            let value = f64::from(m) * scale;
            value * value
        })
        .collect()
}

/// `10·log10(Σ samples)`, or `None` for an all-zero band
fn band_total_db(samples: &[f64]) -> Option<f64> {
    let total: f64 = samples.iter().sum();
    (total > 0.0).then(|| 10.0 * total.log10())
}

fn mean(samples: &[f64]) -> f64 {
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Power of one bin; zero bins take the packet mean so the logarithm stays defined.
fn bin_power_dbm(sample: f64, mean: f64, offset_db: i32, total_db: f64) -> f64 {
    let sample = if sample == 0.0 { mean } else { sample };
    f64::from(offset_db) + 10.0 * sample.log10() - total_db
}

fn subcarrier_freq(sub_0: f64, index: usize) -> f64 {
    sub_0 + index as f64 * SUBCARRIER_SPACING_MHZ
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::format::{HT20_BINS, HT40_BINS};
    use crate::test_utils::{Ht20Packet, Ht40Packet, frame_of};
    use proptest::prelude::*;

    fn decode_all(buffer: &[u8]) -> Vec<DecodedSample> {
        decode(buffer, true).collect::<Result<Vec<_>>>().unwrap()
    }

    fn assert_spacing(sample: &DecodedSample, bins: usize, first: f64) {
        assert_eq!(sample.power.len(), bins);
        let freqs: Vec<f64> = sample.power.frequencies().collect();
        assert_eq!(freqs[0], first);
        for pair in freqs.windows(2) {
            assert!((pair[1] - pair[0] - SUBCARRIER_SPACING_MHZ).abs() < 1e-9);
        }
    }

    #[test]
    fn ht20_zero_bin_uses_mean() {
        let mut magnitudes = [10u8; HT20_BINS];
        magnitudes[17] = 0;
        let packet = Ht20Packet::default().with_magnitudes(magnitudes).encode();

        let samples = decode_all(&packet);
        assert_eq!(samples.len(), 1);
        let sample = &samples[0];
        assert_eq!(sample.center_freq_mhz, 2437);
        assert_eq!(sample.noise_floor_dbm, -95);
        assert_eq!(sample.rssi, 20);
        assert_spacing(sample, HT20_BINS, 2428.25);
        assert_eq!(sample.power.as_slice().last().unwrap().freq_mhz, 2445.4375);

        // 55 bins of 100 plus one zero bin
        let total_db = 10.0 * 5500f64.log10();
        let expected = -75.0 + 10.0 * 100f64.log10() - total_db;
        let substituted = -75.0 + 10.0 * (5500.0f64 / 56.0).log10() - total_db;
        let powers: Vec<f64> = sample.power.powers().collect();
        assert!((powers[0] - expected).abs() < 1e-9);
        assert!((powers[17] - substituted).abs() < 1e-9);
        assert!(powers.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn ht20_exponent_scales_samples_uniformly() {
        let mut packet = Ht20Packet::default();
        let base = decode_all(&packet.encode()).remove(0);
        packet.max_exp = 3;
        let scaled = decode_all(&packet.encode()).remove(0);
        // Relative power is invariant to the shared exponent
        for (a, b) in base.power.powers().zip(scaled.power.powers()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn all_zero_ht20_is_dropped() {
        let buffer = Ht20Packet::default().with_magnitudes([0; HT20_BINS]).encode();
        let mut decoder = decode(&buffer, true);
        assert!(decoder.next().is_none());
        assert_eq!(decoder.stats().dropped, 1);
        assert_eq!(decoder.stats().samples, 0);
    }

    #[test]
    fn dropped_packet_does_not_stop_the_buffer() {
        let buffer = frame_of(&[
            Ht20Packet::default().with_magnitudes([0; HT20_BINS]).encode(),
            Ht20Packet::default().with_tsf(7).encode(),
        ]);
        let samples = decode_all(&buffer);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].tsf, 7);
    }

    #[test]
    fn no_power_mode_keeps_metadata() {
        let buffer = Ht20Packet::default().with_tsf(99).with_magnitudes([0; HT20_BINS]).encode();
        let samples: Vec<_> = decode(&buffer, false).collect::<Result<_>>().unwrap();
        assert_eq!(samples.len(), 1);
        assert!(samples[0].power.is_empty());
        assert_eq!(samples[0].tsf, 99);
        assert_eq!(samples[0].center_freq_mhz, 2437);
    }

    #[test]
    fn back_to_back_packets_in_order() {
        let buffer = frame_of(&[
            Ht20Packet::default().with_tsf(1).encode(),
            Ht20Packet::default().with_tsf(2).encode(),
        ]);
        let tsfs: Vec<u64> = decode_all(&buffer).iter().map(|s| s.tsf).collect();
        assert_eq!(tsfs, vec![1, 2]);
    }

    #[test]
    fn malformed_header_truncates_silently() {
        let mut buffer = vec![1u8, 0, 74];
        buffer.extend_from_slice(&[0u8; 74]);
        let mut decoder = decode(&buffer, true);
        assert!(decoder.next().is_none());
        assert!(decoder.stats().malformed);
        assert_eq!(decoder.stats().trailing_bytes, buffer.len());
    }

    #[test]
    fn malformed_header_after_valid_packet() {
        let mut buffer = Ht20Packet::default().with_tsf(5).encode();
        buffer.extend_from_slice(&[9, 0, 1, 0]);
        buffer.extend_from_slice(&Ht20Packet::default().encode());
        let samples = decode_all(&buffer);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].tsf, 5);
    }

    #[test]
    fn incomplete_tail_is_not_emitted() {
        let mut buffer = Ht20Packet::default().with_tsf(1).encode();
        let second = Ht20Packet::default().with_tsf(2).encode();
        buffer.extend_from_slice(&second[..40]);
        let mut decoder = decode(&buffer, true);
        assert_eq!(decoder.next().unwrap().unwrap().tsf, 1);
        assert!(decoder.next().is_none());
        assert_eq!(decoder.stats().trailing_bytes, 40);
    }

    #[test]
    fn short_buffers_yield_nothing() {
        assert_eq!(decode(&[], true).count(), 0);
        assert_eq!(decode(&[1, 0], true).count(), 0);
    }

    #[test]
    fn type3_fails_explicitly() {
        let mut buffer = Ht20Packet::default().with_tsf(1).encode();
        buffer.extend_from_slice(&[3, 0, 90]);
        buffer.extend_from_slice(&[0u8; 90]);
        let mut decoder = decode(&buffer, true);
        assert!(decoder.next().unwrap().is_ok());
        assert!(matches!(decoder.next(), Some(Err(ScanError::UnsupportedPacket { kind: 3, .. }))));
        assert!(decoder.next().is_none());
    }

    #[test]
    fn type3_with_unexpected_length_is_malformed() {
        let mut buffer = Ht20Packet::default().with_tsf(1).encode();
        buffer.extend_from_slice(&[3, 0, 12]);
        buffer.extend_from_slice(&[0u8; 12]);
        let samples = decode_all(&buffer);
        assert_eq!(samples.len(), 1);

        let mut decoder = decode(&[3, 0, 12, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], true);
        assert!(decoder.next().is_none());
        assert!(decoder.stats().malformed);
    }

    #[test]
    fn ht40_no_power_mode_averages_metadata() {
        let packet = Ht40Packet { chantype: 2, freq: 5200, tsf: 42, ..Default::default() };
        let samples: Vec<_> = decode(&packet.encode(), false).collect::<Result<_>>().unwrap();
        assert_eq!(samples.len(), 1);
        let sample = &samples[0];
        assert!(sample.power.is_empty());
        assert_eq!(sample.tsf, 42);
        assert_eq!(sample.center_freq_mhz, 5190);
        assert_eq!(sample.noise_floor_dbm, -94);
        assert_eq!(sample.rssi, 12);
    }

    #[test]
    fn unknown_chantype_fails_explicitly() {
        for emit_power in [true, false] {
            let buffer = Ht40Packet { chantype: 1, ..Default::default() }.encode();
            let result: Result<Vec<_>> = decode(&buffer, emit_power).collect();
            assert!(matches!(result, Err(ScanError::UnknownChannelType { chantype: 1 })));
        }
    }

    #[test]
    fn ht40_channel_types_shift_centre() {
        let upper = decode_all(&Ht40Packet { chantype: 3, freq: 5180, ..Default::default() }.encode());
        assert_eq!(upper[0].center_freq_mhz, 5190);
        assert_spacing(&upper[0], HT40_BINS, 5170.0);

        let lower = decode_all(&Ht40Packet { chantype: 2, freq: 5200, ..Default::default() }.encode());
        assert_eq!(lower[0].center_freq_mhz, 5190);
        assert_spacing(&lower[0], HT40_BINS, 5170.0);
    }

    #[test]
    fn ht40_halves_use_their_own_band() {
        let packet = Ht40Packet::default();
        let sample = decode_all(&packet.encode()).remove(0);
        assert_eq!(sample.noise_floor_dbm, -94);
        assert_eq!(sample.rssi, 12);

        // 63 bins of 400 in each half-band total
        let total_db = 10.0 * (63.0f64 * 400.0).log10();
        let lower = -86.0 + 10.0 * 400f64.log10() - total_db;
        let upper = -78.0 + 10.0 * 400f64.log10() - total_db;
        let powers: Vec<f64> = sample.power.powers().collect();
        assert!((powers[0] - lower).abs() < 1e-9);
        assert!((powers[63] - lower).abs() < 1e-9);
        assert!((powers[64] - upper).abs() < 1e-9);
        assert!((powers[127] - upper).abs() < 1e-9);
    }

    #[test]
    fn ht40_zero_half_band_drops_packet() {
        let mut lower_zero = [20u8; HT40_BINS];
        lower_zero[..63].fill(0);
        let buffer = Ht40Packet { magnitudes: lower_zero, ..Default::default() }.encode();
        assert_eq!(decode(&buffer, true).count(), 0);

        let mut upper_zero = [20u8; HT40_BINS];
        upper_zero[64..127].fill(0);
        let buffer = Ht40Packet { magnitudes: upper_zero, ..Default::default() }.encode();
        assert_eq!(decode(&buffer, true).count(), 0);
    }

    #[test]
    fn ht40_excluded_bins_do_not_rescue_a_band() {
        // Only bins 63 and 127 carry energy: both totals are still zero
        let mut magnitudes = [0u8; HT40_BINS];
        magnitudes[63] = 50;
        magnitudes[127] = 50;
        let buffer = Ht40Packet { magnitudes, ..Default::default() }.encode();
        let mut decoder = decode(&buffer, true);
        assert!(decoder.next().is_none());
        assert_eq!(decoder.stats().dropped, 1);
    }

    proptest! {
        #[test]
        fn ht20_nonzero_yields_56_ascending_bins(
            magnitudes in prop::array::uniform32(any::<u8>()),
            tail in prop::array::uniform24(any::<u8>()),
            freq in 2400u16..2500,
            max_exp in 0u8..8,
        ) {
            let mut all = [0u8; HT20_BINS];
            all[..32].copy_from_slice(&magnitudes);
            all[32..].copy_from_slice(&tail);
            prop_assume!(all.iter().any(|&m| m != 0));

            let packet = Ht20Packet { freq, max_exp, magnitudes: all, ..Default::default() };
            let samples = decode_all(&packet.encode());
            prop_assert_eq!(samples.len(), 1);
            let freqs: Vec<f64> = samples[0].power.frequencies().collect();
            prop_assert_eq!(freqs.len(), HT20_BINS);
            prop_assert_eq!(freqs[0], f64::from(freq) - 8.75);
            for pair in freqs.windows(2) {
                prop_assert!((pair[1] - pair[0] - 0.3125).abs() < 1e-9);
            }
            prop_assert!(samples[0].power.powers().all(f64::is_finite));
        }

        #[test]
        fn ht40_nonzero_yields_128_ascending_bins(
            upper in any::<bool>(),
            freq in 5150u16..5900,
            magnitude in 1u8..,
            max_exp in -4i8..8,
        ) {
            let chantype = if upper { 3 } else { 2 };
            let packet = Ht40Packet {
                chantype,
                freq,
                max_exp,
                magnitudes: [magnitude; HT40_BINS],
                ..Default::default()
            };
            let samples = decode_all(&packet.encode());
            prop_assert_eq!(samples.len(), 1);

            let center = if upper { f64::from(freq) + 10.0 } else { f64::from(freq) - 10.0 };
            prop_assert_eq!(f64::from(samples[0].center_freq_mhz), center);
            let freqs: Vec<f64> = samples[0].power.frequencies().collect();
            prop_assert_eq!(freqs.len(), HT40_BINS);
            prop_assert_eq!(freqs[0], center - 20.0);
            for pair in freqs.windows(2) {
                prop_assert!((pair[1] - pair[0] - 0.3125).abs() < 1e-9);
            }
            prop_assert!(samples[0].power.powers().all(f64::is_finite));
        }

        #[test]
        fn corrupt_type3_headers_never_error(length in any::<u16>(), pad in 0usize..256) {
            prop_assume!(length != 90);
            let mut buffer = vec![3u8];
            buffer.extend_from_slice(&length.to_be_bytes());
            buffer.resize(3 + pad, 0);
            prop_assert_eq!(decode(&buffer, true).count(), 0);
        }

        #[test]
        fn unknown_header_pairs_never_error(kind in 4u8.., length in any::<u16>(), pad in 0usize..256) {
            let mut buffer = vec![kind];
            buffer.extend_from_slice(&length.to_be_bytes());
            buffer.resize(3 + pad, 0xaa);
            prop_assert_eq!(decode(&buffer, true).count(), 0);
        }
    }
}
