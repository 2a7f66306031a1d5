//! Raw frame type flowing from the input source to the decoders

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// One read of the input source, exactly as the driver produced it.
///
/// Live reads are driver-aligned: a frame starts on a packet boundary and never
/// ends in a partial packet. Frames rebuilt from a recorded dump keep that
/// property because each chunk was captured verbatim from a live read.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Packet bytes (zero-copy via Arc so the dump and decode sinks share them)
    pub data: Arc<[u8]>,

    /// Host time at which the frame was read
    pub received_at: DateTime<Utc>,
}

impl RawFrame {
    /// Create a frame stamped with the current host time
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self::with_timestamp(data, Utc::now())
    }

    /// Create a frame with an explicit read timestamp
    pub fn with_timestamp(data: impl Into<Arc<[u8]>>, received_at: DateTime<Utc>) -> Self {
        Self { data: data.into(), received_at }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl From<Vec<u8>> for RawFrame {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}
