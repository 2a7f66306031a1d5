//! Pipeline configuration
//!
//! All settings have working defaults, so an empty document is a valid
//! configuration:
//!
//! ```yaml
//! decoder:
//!   workers: 1
//!   input_capacity: 1024
//!   output_capacity: 8192
//!   poll_timeout_ms: 1000
//!   emit_power: true
//! hub:
//!   idle_pause_ms: 100
//!   replay_block_size: 1048576
//!   flush_on_start: true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{Result, ScanError};

/// Complete pipeline configuration
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    pub decoder: DecoderConfig,
    pub hub: HubConfig,
}

impl PipelineConfig {
    /// Parse and validate a YAML configuration document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let yaml = std::fs::read_to_string(&path)
            .map_err(|e| ScanError::file_error(path.as_ref(), e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        self.decoder.validate()?;
        self.hub.validate()
    }
}

/// Decode worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DecoderConfig {
    /// Number of decode workers. Only a single worker keeps samples in submission order.
    pub workers: usize,
    /// Raw frames buffered ahead of the workers
    pub input_capacity: usize,
    /// Decoded samples buffered for the consumer
    pub output_capacity: usize,
    /// Queue poll interval; bounds how long a worker takes to notice shutdown
    pub poll_timeout_ms: u64,
    /// Compute the per sub-carrier power spectrum
    pub emit_power: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            input_capacity: 1024,
            output_capacity: 8192,
            poll_timeout_ms: 1000,
            emit_power: true,
        }
    }
}

impl DecoderConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_emit_power(mut self, emit_power: bool) -> Self {
        self.emit_power = emit_power;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ScanError::config("decoder.workers must be at least 1"));
        }
        if self.input_capacity == 0 || self.output_capacity == 0 {
            return Err(ScanError::config("decoder queue capacities must be at least 1"));
        }
        if self.poll_timeout_ms == 0 {
            return Err(ScanError::config("decoder.poll_timeout_ms must be at least 1"));
        }
        Ok(())
    }
}

/// Stream distributor settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HubConfig {
    /// Pause after an empty live read
    pub idle_pause_ms: u64,
    /// Bytes read per block when replaying a capture
    pub replay_block_size: usize,
    /// Discard data already pending in the live source when starting
    pub flush_on_start: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { idle_pause_ms: 100, replay_block_size: 1024 * 1024, flush_on_start: true }
    }
}

impl HubConfig {
    pub fn idle_pause(&self) -> Duration {
        Duration::from_millis(self.idle_pause_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.replay_block_size == 0 {
            return Err(ScanError::config("hub.replay_block_size must be at least 1"));
        }
        Ok(())
    }
}
