//! Streaming decoder and capture pipeline for Atheros spectral scan data.
//!
//! ath9k radios can report FFT-based spectral scans through debugfs: short
//! binary packets carrying per sub-carrier magnitudes plus signal and noise
//! metadata for the scanned channel. This crate turns that byte stream, live
//! or replayed from a capture file, into strongly typed power spectra.
//!
//! # Pipeline
//!
//! ```text
//! debugfs / capture ──► DataHub ──► capture file
//!                          │
//!                          └──► DecodePool ──► DecodedSample queue / SampleStream
//! ```
//!
//! - [`codec`]: pure packet decoder and power-spectrum math
//! - [`DecodePool`]: worker threads over bounded queues
//! - [`DataHub`]: single-input distributor to a capture file and/or the pool
//! - [`container`]: the length-prefixed capture format
//!
//! # Example (capture replay)
//!
//! ```rust,no_run
//! use athspectral::{DataHub, DecodePool, DecoderConfig};
//! use std::time::Duration;
//!
//! fn main() -> athspectral::Result<()> {
//!     let pool = DecodePool::spawn(&DecoderConfig::default())?;
//!     let mut hub = DataHub::builder()
//!         .recorded("capture.bin")
//!         .decode_into(pool.submitter())
//!         .build()?;
//!     hub.start()?;
//!
//!     loop {
//!         let done = !hub.is_running() && pool.is_finished();
//!         for sample in pool.samples().try_iter() {
//!             println!("{} tsf={} {} bins", sample.center_freq_mhz, sample.tsf, sample.power.len());
//!         }
//!         if done {
//!             break;
//!         }
//!         std::thread::sleep(Duration::from_millis(10));
//!     }
//!     hub.stop()
//! }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Decoding
pub mod codec;
pub mod pool;
pub mod stream;

// Acquisition and capture files
pub mod container;
pub mod hub;
pub mod metadata;
pub mod providers;
pub mod source;

pub mod config;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use codec::{decode, decode_frame};
pub use config::{DecoderConfig, HubConfig, PipelineConfig};
pub use container::{ChunkReader, ChunkWriter};
pub use hub::{DataHub, DataHubBuilder, HubStats};
pub use metadata::CaptureMetadata;
pub use pool::{DecodePool, FrameSubmitter, PoolStats, PoolStatsSnapshot};
pub use providers::DebugfsScanner;
pub use source::{LiveSource, ScannerConfig};
pub use stream::SampleStream;
