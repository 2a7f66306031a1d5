//! Core types for spectral scan data.
//!
//! - [`RawFrame`] is one read of the input source, shared zero-copy between sinks
//! - [`PacketKind`] and [`ChannelType`] classify the hardware packet variants
//! - [`DecodedSample`] is the strongly typed result of decoding one packet
//! - [`PowerSpectrum`] keeps the per sub-carrier power in ascending frequency order

mod frame;
mod packet;
mod sample;

pub use frame::RawFrame;
pub use packet::{ChannelType, PacketKind};
pub use sample::{DecodedSample, PowerSpectrum, SubCarrier};
