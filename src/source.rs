//! Live spectral data source abstraction

use serde::Serialize;
use std::collections::BTreeMap;
use std::io;

use crate::Result;

/// Trait for live spectral data sources
///
/// A live source wraps the radio driver's spectral data stream. Each read
/// returns what the driver had buffered, which is always zero or more
/// complete packets. The hub owns the source on its background thread, so
/// implementations must be `Send`.
pub trait LiveSource: Send + 'static {
    /// Read the currently available spectral data
    ///
    /// Returns:
    /// - `Ok(Some(bytes))` - One driver-aligned read
    /// - `Ok(None)` - Nothing available right now (not end of stream)
    /// - `Err(e)` - The device could not be read
    fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>>;

    /// Report the scanner configuration to seed the capture metadata
    fn config(&self) -> Result<ScannerConfig>;
}

impl<S: LiveSource + ?Sized> LiveSource for Box<S> {
    fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        (**self).read_frame()
    }

    fn config(&self) -> Result<ScannerConfig> {
        (**self).config()
    }
}

/// Scanner configuration as reported by the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScannerConfig {
    /// Configuration file name to last observed value
    pub files: BTreeMap<String, String>,
    /// Driver name, e.g. `ath9k`
    pub driver: String,
    /// Tuned frequency in MHz, `-1` when unknown
    pub frequency: i64,
}

impl ScannerConfig {
    pub fn new(driver: impl Into<String>) -> Self {
        Self { files: BTreeMap::new(), driver: driver.into(), frequency: -1 }
    }

    pub fn with_file(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.files.insert(name.into(), value.into());
        self
    }

    pub fn with_frequency(mut self, frequency: i64) -> Self {
        self.frequency = frequency;
        self
    }
}
