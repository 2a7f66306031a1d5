//! Capture metadata sidecar
//!
//! A live capture written to `capture.bin` is described by `capture.bin.json`:
//!
//! ```json
//! {"spectral_count":"8","spectral_scan_ctl":"background","driver":"ath9k",
//!  "frequency":2437,"start_time":"2026-10-15 09:30:00","end_time":"2026-10-15 09:35:12"}
//! ```
//!
//! Keys besides `driver`, `frequency`, `start_time` and `end_time` are the
//! driver's configuration file names.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::source::ScannerConfig;
use crate::{Result, ScanError};

/// Timestamp layout used in the sidecar, in host local time
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Provenance of one capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    /// Configuration file name to value at capture start
    #[serde(flatten)]
    pub config: BTreeMap<String, String>,
    pub driver: String,
    pub frequency: i64,
    pub start_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

impl CaptureMetadata {
    /// Metadata for a capture starting now
    pub fn begin(config: ScannerConfig) -> Self {
        Self::begin_at(config, Local::now())
    }

    pub fn begin_at(config: ScannerConfig, start: DateTime<Local>) -> Self {
        Self {
            config: config.files,
            driver: config.driver,
            frequency: config.frequency,
            start_time: format_timestamp(start),
            end_time: None,
        }
    }

    /// Stamp the end of the capture with the current time
    pub fn finish(&mut self) {
        self.finish_at(Local::now());
    }

    pub fn finish_at(&mut self, end: DateTime<Local>) {
        self.end_time = Some(format_timestamp(end));
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| ScanError::file_error(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)
            .map_err(|e| ScanError::Metadata { path: path.to_path_buf(), source: e })?;
        writer.flush().map_err(|e| ScanError::file_error(path, e))
    }

    pub fn read_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ScanError::file_error(path, e))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| ScanError::Metadata { path: path.to_path_buf(), source: e })
    }
}

/// Sidecar location for a capture file: the full file name with `.json` appended
pub fn sidecar_path<P: AsRef<Path>>(dump: P) -> PathBuf {
    let mut name = OsString::from(dump.as_ref().as_os_str());
    name.push(".json");
    PathBuf::from(name)
}

pub fn format_timestamp(time: DateTime<Local>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_config() -> ScannerConfig {
        ScannerConfig::new("ath9k")
            .with_file("spectral_count", "8")
            .with_file("spectral_scan_ctl", "background")
            .with_frequency(2437)
    }

    #[test]
    fn sidecar_appends_json_suffix() {
        assert_eq!(sidecar_path("/tmp/capture.bin"), PathBuf::from("/tmp/capture.bin.json"));
        assert_eq!(sidecar_path("dump"), PathBuf::from("dump.json"));
    }

    #[test]
    fn timestamps_use_sidecar_layout() {
        let time = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(format_timestamp(time), "2026-03-04 05:06:07");
    }

    #[test]
    fn json_is_a_flat_object() {
        let start = Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let mut metadata = CaptureMetadata::begin_at(sample_config(), start);
        let open: serde_json::Value = serde_json::to_value(&metadata).unwrap();
        assert!(open.get("end_time").is_none());

        metadata.finish_at(start + chrono::Duration::seconds(90));
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value["spectral_count"], "8");
        assert_eq!(value["spectral_scan_ctl"], "background");
        assert_eq!(value["driver"], "ath9k");
        assert_eq!(value["frequency"], 2437);
        assert_eq!(value["start_time"], "2026-01-02 03:04:05");
        assert_eq!(value["end_time"], "2026-01-02 03:05:35");
    }

    #[test]
    fn written_sidecar_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = sidecar_path(dir.path().join("capture.bin"));
        let mut metadata = CaptureMetadata::begin(sample_config());
        metadata.finish();
        metadata.write_to(&path).unwrap();
        assert_eq!(CaptureMetadata::read_from(&path).unwrap(), metadata);
    }
}
