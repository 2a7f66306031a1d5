//! Spectral scan packet codec
//!
//! Turns driver-aligned byte buffers into [`DecodedSample`](crate::DecodedSample)s.
//! The codec is pure and never blocks: it works on an in-memory buffer only.
//!
//! ```rust
//! use athspectral::codec::decode;
//!
//! # fn main() -> athspectral::Result<()> {
//! let buffer: &[u8] = &[];
//! for sample in decode(buffer, true) {
//!     let sample = sample?;
//!     println!("{} MHz: {} bins", sample.center_freq_mhz, sample.power.len());
//! }
//! # Ok(())
//! # }
//! ```

mod decoder;
pub mod format;

pub use decoder::{Decode, DecodeStats, decode, decode_frame};
