//! Live source over the ath9k/ath10k debugfs spectral interface
//!
//! The driver exposes spectral data through a relay file named
//! `spectral_scan0` next to its `spectral_*` configuration files:
//!
//! ```text
//! /sys/kernel/debug/ieee80211/<phy>/<driver>/
//!     spectral_scan0          relay data file
//!     spectral_scan_ctl       mode: disable, background, manual, chanscan, trigger
//!     spectral_count
//!     spectral_fft_period
//!     spectral_period
//!     spectral_short_repeat
//! ```
//!
//! This source only reads. Putting the radio into a scan mode and tuning it
//! are left to the caller.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::source::{LiveSource, ScannerConfig};
use crate::{Result, ScanError};

/// Default debugfs root for mac80211 devices
pub const DEBUGFS_ROOT: &str = "/sys/kernel/debug/ieee80211";
/// Relay file carrying spectral samples
pub const DATA_FILE: &str = "spectral_scan0";
/// File whose presence marks a spectral capable driver directory
pub const CONTROL_FILE: &str = "spectral_scan_ctl";
/// Configuration files reported in the capture metadata
pub const CONFIG_FILES: [&str; 5] = [
    "spectral_count",
    "spectral_fft_period",
    "spectral_period",
    "spectral_scan_ctl",
    "spectral_short_repeat",
];

/// Spectral scanner backed by a debugfs driver directory.
#[derive(Debug)]
pub struct DebugfsScanner {
    directory: PathBuf,
    driver: String,
    data: File,
    frequency: i64,
}

impl DebugfsScanner {
    /// Open the spectral interface of a driver directory
    pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();

        let control = directory.join(CONTROL_FILE);
        fs::metadata(&control).map_err(|e| ScanError::file_error(&control, e))?;

        let data_path = directory.join(DATA_FILE);
        let data = File::open(&data_path).map_err(|e| ScanError::file_error(&data_path, e))?;

        let driver = directory
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        info!(%driver, directory = %directory.display(), "Opened spectral interface");
        Ok(Self { directory, driver, data, frequency: -1 })
    }

    /// Find and open the spectral interface of `phy` (e.g. `phy0`)
    pub fn discover(phy: &str) -> Result<Self> {
        Self::discover_in(DEBUGFS_ROOT, phy)
    }

    /// Find and open the spectral interface of `phy` below a debugfs root
    pub fn discover_in<P: AsRef<Path>>(root: P, phy: &str) -> Result<Self> {
        let phy_dir = root.as_ref().join(phy);
        let entries = fs::read_dir(&phy_dir).map_err(|e| ScanError::file_error(&phy_dir, e))?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.join(CONTROL_FILE).is_file() {
                debug!(phy, path = %path.display(), "Spectral interface found");
                return Self::open(path);
            }
        }

        Err(ScanError::invalid_input(format!(
            "no '{}' below {}; check debugfs is mounted and readable",
            CONTROL_FILE,
            phy_dir.display()
        )))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn data_path(&self) -> PathBuf {
        self.directory.join(DATA_FILE)
    }

    /// Record the frequency the radio was tuned to, for the capture metadata
    pub fn set_frequency(&mut self, frequency_mhz: i64) {
        self.frequency = frequency_mhz;
    }

    pub fn frequency(&self) -> i64 {
        self.frequency
    }
}

impl LiveSource for DebugfsScanner {
    fn read_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        // The relay file reports end of data once its buffers are drained
        let mut buffer = Vec::new();
        self.data.read_to_end(&mut buffer)?;
        Ok((!buffer.is_empty()).then_some(buffer))
    }

    fn config(&self) -> Result<ScannerConfig> {
        let mut config = ScannerConfig::new(self.driver.clone()).with_frequency(self.frequency);
        for name in CONFIG_FILES {
            let path = self.directory.join(name);
            let value = fs::read_to_string(&path).map_err(|e| ScanError::file_error(&path, e))?;
            config.files.insert(name.to_string(), value.trim().to_string());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn fake_debugfs() -> TempDir {
        let root = tempfile::tempdir().unwrap();
        let driver = root.path().join("phy0").join("ath9k");
        fs::create_dir_all(&driver).unwrap();
        for (name, value) in [
            ("spectral_count", "8\n"),
            ("spectral_fft_period", "15\n"),
            ("spectral_period", "255\n"),
            ("spectral_scan_ctl", "disable\n"),
            ("spectral_short_repeat", "1\n"),
        ] {
            fs::write(driver.join(name), value).unwrap();
        }
        File::create(driver.join(DATA_FILE)).unwrap();
        root
    }

    #[test]
    fn discover_finds_driver_directory() {
        let root = fake_debugfs();
        let scanner = DebugfsScanner::discover_in(root.path(), "phy0").unwrap();
        assert_eq!(scanner.driver(), "ath9k");
        assert_eq!(scanner.data_path(), root.path().join("phy0/ath9k/spectral_scan0"));
    }

    #[test]
    fn discover_unknown_phy_fails() {
        let root = fake_debugfs();
        let err = DebugfsScanner::discover_in(root.path(), "phy7").unwrap_err();
        assert!(matches!(err, ScanError::File { .. }));
    }

    #[test]
    fn open_without_control_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join(DATA_FILE)).unwrap();
        let err = DebugfsScanner::open(dir.path()).unwrap_err();
        match err {
            ScanError::File { path, .. } => assert!(path.ends_with(CONTROL_FILE)),
            other => panic!("expected File error, got {other:?}"),
        }
    }

    #[test]
    fn config_reports_trimmed_values() {
        let root = fake_debugfs();
        let mut scanner = DebugfsScanner::open(root.path().join("phy0/ath9k")).unwrap();
        scanner.set_frequency(2437);

        let config = scanner.config().unwrap();
        assert_eq!(config.driver, "ath9k");
        assert_eq!(config.frequency, 2437);
        assert_eq!(config.files.len(), CONFIG_FILES.len());
        assert_eq!(config.files["spectral_scan_ctl"], "disable");
        assert_eq!(config.files["spectral_period"], "255");
    }

    #[test]
    fn reads_appended_data_then_reports_empty() {
        let root = fake_debugfs();
        let dir = root.path().join("phy0/ath9k");
        let mut scanner = DebugfsScanner::open(&dir).unwrap();
        assert_eq!(scanner.read_frame().unwrap(), None);

        let mut writer = fs::OpenOptions::new().append(true).open(dir.join(DATA_FILE)).unwrap();
        writer.write_all(&[1, 2, 3]).unwrap();
        writer.flush().unwrap();

        assert_eq!(scanner.read_frame().unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(scanner.read_frame().unwrap(), None);
    }
}
