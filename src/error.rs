//! Error types for spectral scan acquisition and decoding.
//!
//! All errors implement `std::error::Error` and carry enough structured context to
//! tell a configuration mistake apart from a firmware/format mismatch.
//!
//! ## Error Categories
//!
//! - **Configuration Errors**: invalid source combination, invalid pipeline settings
//! - **File Errors**: input or output paths that cannot be opened, read or written
//! - **Format Errors**: packet types or channel types this decoder cannot interpret
//! - **Queue Errors**: the other side of a pipeline queue has gone away
//!
//! Malformed packet headers and all-zero power readings are *not* reported through
//! this type. They are expected hardware artifacts: the decoder logs them, counts them
//! and carries on.
//!
//! ```rust
//! use athspectral::ScanError;
//!
//! let error = ScanError::unsupported_packet(3, 90);
//! assert!(error.is_fatal());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for spectral scan operations.
pub type Result<T, E = ScanError> = std::result::Result<T, E>;

/// Main error type for spectral scan operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ScanError {
    #[error("Invalid input configuration: {reason}")]
    InvalidInput { reason: String },

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported spectral packet (type={kind}, length={length})")]
    UnsupportedPacket { kind: u8, length: u16 },

    #[error("Unknown HT40 channel type {chantype}")]
    UnknownChannelType { chantype: u8 },

    #[error("Configuration error: {details}")]
    Config { details: String },

    #[error("Capture metadata error: {path}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid state: {details}")]
    State { details: String },

    #[error("The {queue} queue is closed")]
    QueueClosed { queue: &'static str },
}

impl ScanError {
    /// Returns whether this error can never succeed on retry.
    ///
    /// Fatal errors are configuration problems surfaced at construction and format
    /// errors that mean the hardware speaks a dialect the codec does not know.
    pub fn is_fatal(&self) -> bool {
        match self {
            ScanError::InvalidInput { .. } => true,
            ScanError::File { .. } => true,
            ScanError::UnsupportedPacket { .. } => true,
            ScanError::UnknownChannelType { .. } => true,
            ScanError::Config { .. } => true,
            ScanError::Metadata { .. } => false,
            ScanError::State { .. } => false,
            ScanError::QueueClosed { .. } => false,
        }
    }

    /// Returns whether the failed operation may succeed if attempted again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScanError::State { .. } | ScanError::Metadata { .. })
    }

    /// Returns whether this error came out of the packet codec.
    pub fn is_format_error(&self) -> bool {
        matches!(self, ScanError::UnsupportedPacket { .. } | ScanError::UnknownChannelType { .. })
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            ScanError::InvalidInput { .. } => vec![
                "Configure exactly one input: a live source or a recorded dump",
                "Check the pipeline settings passed to the builder",
            ],
            ScanError::File { .. } => vec![
                "Check the file exists and is readable",
                "Check the output directory exists and is writable",
                "Debugfs usually requires root or relaxed permissions on /sys/kernel/debug",
            ],
            ScanError::UnsupportedPacket { .. } => vec![
                "Only HT20 and HT40 ath9k spectral packets are supported",
                "Do not route ath10k spectral data through this decoder",
            ],
            ScanError::UnknownChannelType { .. } => vec![
                "Verify the radio is configured for HT40+ or HT40-",
                "Check driver and firmware versions",
            ],
            ScanError::Config { .. } => vec![
                "Check the YAML syntax of the pipeline configuration",
                "Worker count, queue capacities and block size must be non-zero",
            ],
            ScanError::Metadata { .. } => vec![
                "Check the dump directory is writable",
                "Check the scanner reported valid configuration values",
            ],
            ScanError::State { .. } => vec![
                "Call stop() before starting the hub again",
                "Build a new hub for each capture",
            ],
            ScanError::QueueClosed { .. } => vec![
                "Keep the decode pool alive while the hub is running",
                "Keep at least one sample receiver alive while decoding",
            ],
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScanError::File { path: path.into(), source }
    }

    /// Helper constructor for input configuration errors.
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        ScanError::InvalidInput { reason: reason.into() }
    }

    /// Helper constructor for unsupported packet formats.
    pub fn unsupported_packet(kind: u8, length: u16) -> Self {
        ScanError::UnsupportedPacket { kind, length }
    }

    /// Helper constructor for pipeline configuration errors.
    pub fn config(details: impl Into<String>) -> Self {
        ScanError::Config { details: details.into() }
    }

    /// Helper constructor for lifecycle misuse.
    pub fn state(details: impl Into<String>) -> Self {
        ScanError::State { details: details.into() }
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        ScanError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<serde_yaml_ng::Error> for ScanError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        ScanError::Config { details: err.to_string() }
    }
}
