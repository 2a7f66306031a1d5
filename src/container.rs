//! Length-prefixed capture container
//!
//! A capture file is a flat sequence of chunks, each holding the bytes of one
//! live read:
//!
//! ```text
//! file  := chunk*
//! chunk := length:u32 (little-endian) payload:u8[length]
//! ```
//!
//! There is no header, separator or trailing index. End of file is the only
//! terminator, so a capture cut short by a crash still replays up to its last
//! complete chunk.

use std::fs::File;
use std::io::{self, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use tracing::{debug, trace, warn};

use crate::{Result, ScanError};

/// Size of the chunk length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Writes raw frames as container chunks.
#[derive(Debug)]
pub struct ChunkWriter<W: Write> {
    inner: W,
    chunks: u64,
    bytes: u64,
}

impl ChunkWriter<BufWriter<File>> {
    /// Create (or truncate) a capture file
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(&path).map_err(|e| ScanError::file_error(path.as_ref(), e))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> ChunkWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, chunks: 0, bytes: 0 }
    }

    /// Append one chunk: the payload length as u32 LE, then the payload.
    pub fn write_chunk(&mut self, payload: &[u8]) -> io::Result<()> {
        let length = u32::try_from(payload.len()).map_err(|_| {
            io::Error::new(
                ErrorKind::InvalidInput,
                format!("chunk of {} bytes exceeds the u32 length prefix", payload.len()),
            )
        })?;
        self.inner.write_all(&length.to_le_bytes())?;
        self.inner.write_all(payload)?;
        self.chunks += 1;
        self.bytes += (LENGTH_PREFIX_SIZE + payload.len()) as u64;
        trace!(chunk = self.chunks, bytes = payload.len(), "Wrote chunk");
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    /// Chunks written so far
    pub fn chunks_written(&self) -> u64 {
        self.chunks
    }

    /// Bytes written so far, length prefixes included
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads container chunks back in recording order.
///
/// The source is read in blocks into an internal buffer and chunks are cut
/// from its front. A chunk whose payload is not fully buffered yet waits for
/// the next block. Read errors end the sequence like end of file does.
#[derive(Debug)]
pub struct ChunkReader<R: Read> {
    inner: R,
    block_size: usize,
    buffer: Vec<u8>,
    position: usize,
    eof: bool,
    chunks: u64,
}

impl ChunkReader<File> {
    /// Open a capture file for replay
    pub fn open<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Self> {
        let file = File::open(&path).map_err(|e| ScanError::file_error(path.as_ref(), e))?;
        Ok(Self::new(file, block_size))
    }
}

impl<R: Read> ChunkReader<R> {
    pub fn new(inner: R, block_size: usize) -> Self {
        Self {
            inner,
            block_size: block_size.max(1),
            buffer: Vec::new(),
            position: 0,
            eof: false,
            chunks: 0,
        }
    }

    /// Next complete chunk payload, or `None` at end of data.
    pub fn next_chunk(&mut self) -> Option<Vec<u8>> {
        loop {
            if let Some(chunk) = self.take_buffered_chunk() {
                self.chunks += 1;
                return Some(chunk);
            }
            if self.eof {
                let leftover = self.buffer.len() - self.position;
                if leftover > 0 {
                    debug!(leftover, "Capture ends with an incomplete chunk");
                }
                return None;
            }
            self.fill();
        }
    }

    /// Chunks returned so far
    pub fn chunks_read(&self) -> u64 {
        self.chunks
    }

    fn take_buffered_chunk(&mut self) -> Option<Vec<u8>> {
        let available = &self.buffer[self.position..];
        let (prefix, rest) = available.split_first_chunk::<LENGTH_PREFIX_SIZE>()?;
        let length = u32::from_le_bytes(*prefix) as usize;
        if rest.len() < length {
            return None;
        }
        let chunk = rest[..length].to_vec();
        self.position += LENGTH_PREFIX_SIZE + length;
        Some(chunk)
    }

    fn fill(&mut self) {
        // Drop consumed bytes before growing the buffer
        if self.position > 0 {
            self.buffer.drain(..self.position);
            self.position = 0;
        }

        let filled = self.buffer.len();
        self.buffer.resize(filled + self.block_size, 0);
        loop {
            match self.inner.read(&mut self.buffer[filled..]) {
                Ok(0) => {
                    self.eof = true;
                    self.buffer.truncate(filled);
                    return;
                }
                Ok(n) => {
                    self.buffer.truncate(filled + n);
                    return;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Capture read failed, treating as end of data");
                    self.eof = true;
                    self.buffer.truncate(filled);
                    return;
                }
            }
        }
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn write_all(frames: &[Vec<u8>]) -> Vec<u8> {
        let mut writer = ChunkWriter::new(Vec::new());
        for frame in frames {
            writer.write_chunk(frame).unwrap();
        }
        writer.into_inner()
    }

    #[test]
    fn chunk_layout_is_le_length_then_payload() {
        let bytes = write_all(&[vec![0xaa, 0xbb, 0xcc]]);
        assert_eq!(bytes, vec![3, 0, 0, 0, 0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn writer_counts_chunks_and_bytes() {
        let mut writer = ChunkWriter::new(Vec::new());
        writer.write_chunk(&[1, 2]).unwrap();
        writer.write_chunk(&[]).unwrap();
        assert_eq!(writer.chunks_written(), 2);
        assert_eq!(writer.bytes_written(), 10);
    }

    #[test]
    fn chunk_spanning_blocks_waits_for_more_input() {
        let frames = vec![vec![7u8; 100], vec![8u8; 5]];
        let bytes = write_all(&frames);
        let mut reader = ChunkReader::new(Cursor::new(bytes), 3);
        assert_eq!(reader.next_chunk(), Some(frames[0].clone()));
        assert_eq!(reader.next_chunk(), Some(frames[1].clone()));
        assert_eq!(reader.next_chunk(), None);
        assert_eq!(reader.chunks_read(), 2);
    }

    #[test]
    fn truncated_tail_is_not_returned() {
        let mut bytes = write_all(&[vec![1, 2, 3]]);
        bytes.extend_from_slice(&10u32.to_le_bytes());
        bytes.extend_from_slice(&[9, 9]);
        let chunks: Vec<_> = ChunkReader::new(Cursor::new(bytes), 4096).collect();
        assert_eq!(chunks, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn empty_source_yields_nothing() {
        assert_eq!(ChunkReader::new(Cursor::new(Vec::new()), 16).count(), 0);
    }

    struct FailAfter {
        data: Cursor<Vec<u8>>,
        reads_left: usize,
    }

    impl Read for FailAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.reads_left == 0 {
                return Err(io::Error::other("device gone"));
            }
            self.reads_left -= 1;
            self.data.read(buf)
        }
    }

    #[test]
    fn read_error_ends_the_sequence() {
        let bytes = write_all(&[vec![1; 4], vec![2; 4]]);
        // One 8-byte read holds exactly the first chunk
        let source = FailAfter { data: Cursor::new(bytes), reads_left: 1 };
        let chunks: Vec<_> = ChunkReader::new(source, 8).collect();
        assert_eq!(chunks, vec![vec![1; 4]]);
    }

    #[test]
    fn open_missing_file_reports_path() {
        let err = ChunkReader::open("/nonexistent/capture.bin", 1024).unwrap_err();
        match err {
            ScanError::File { path, .. } => assert_eq!(path, Path::new("/nonexistent/capture.bin")),
            other => panic!("expected File error, got {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn replay_reconstructs_recorded_frames(
            frames in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..300), 0..20),
            block_size in 1usize..512,
        ) {
            let bytes = write_all(&frames);
            let replayed: Vec<_> = ChunkReader::new(Cursor::new(bytes), block_size).collect();
            prop_assert_eq!(replayed, frames);
        }
    }
}
