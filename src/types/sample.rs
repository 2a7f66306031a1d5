//! Decoded spectral sample types

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Power reading for one sub-carrier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubCarrier {
    /// Sub-carrier centre frequency in MHz
    pub freq_mhz: f64,
    /// Received power in dBm
    pub power_dbm: f64,
}

/// Ordered sub-carrier frequency to power mapping.
///
/// Entries are kept in ascending sub-carrier index order, which is also
/// ascending frequency. Consumers plotting left to right rely on that order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PowerSpectrum {
    bins: Vec<SubCarrier>,
}

impl PowerSpectrum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { bins: Vec::with_capacity(capacity) }
    }

    /// Append the next sub-carrier. Callers push in ascending index order.
    pub fn push(&mut self, freq_mhz: f64, power_dbm: f64) {
        self.bins.push(SubCarrier { freq_mhz, power_dbm });
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SubCarrier> {
        self.bins.iter()
    }

    /// Power at an exact sub-carrier frequency, if present
    pub fn get(&self, freq_mhz: f64) -> Option<f64> {
        self.bins.iter().find(|bin| bin.freq_mhz == freq_mhz).map(|bin| bin.power_dbm)
    }

    pub fn frequencies(&self) -> impl Iterator<Item = f64> + '_ {
        self.bins.iter().map(|bin| bin.freq_mhz)
    }

    pub fn powers(&self) -> impl Iterator<Item = f64> + '_ {
        self.bins.iter().map(|bin| bin.power_dbm)
    }

    pub fn as_slice(&self) -> &[SubCarrier] {
        &self.bins
    }
}

impl<'a> IntoIterator for &'a PowerSpectrum {
    type Item = &'a SubCarrier;
    type IntoIter = std::slice::Iter<'a, SubCarrier>;

    fn into_iter(self) -> Self::IntoIter {
        self.bins.iter()
    }
}

/// One decoded spectral scan packet.
///
/// Created by the codec from exactly one packet and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedSample {
    /// Host time at which the containing frame was read
    pub timestamp: DateTime<Utc>,
    /// Radio TSF counter
    pub tsf: u64,
    /// Channel centre frequency in MHz (HT40: adjusted for the extension channel)
    pub center_freq_mhz: u32,
    /// Noise floor in dBm
    pub noise_floor_dbm: i32,
    /// Relative signal strength
    pub rssi: i32,
    /// Per sub-carrier power; empty when power decoding is disabled
    pub power: PowerSpectrum,
}
