//! Stream distributor
//!
//! A [`DataHub`] owns exactly one input, either a live spectral source or a
//! recorded capture, and fans every frame it reads out to the configured
//! sinks: a capture file and/or a decode pool.
//!
//! ```text
//!   live source ──┐                  ┌──► capture file (length-prefixed chunks)
//!                 ├──► hub thread ───┤
//!   capture file ─┘                  └──► decode pool input queue
//! ```
//!
//! Live reads are driver-aligned and go to the decode pool as they are.
//! Replayed chunks reproduce the boundaries of the original live reads.
//!
//! ```rust,no_run
//! use athspectral::{DataHub, DebugfsScanner, DecodePool, DecoderConfig};
//!
//! # fn main() -> athspectral::Result<()> {
//! let pool = DecodePool::spawn(&DecoderConfig::default())?;
//! let mut hub = DataHub::builder()
//!     .live(DebugfsScanner::discover("phy0")?)
//!     .dump_to("capture.bin")
//!     .decode_into(pool.submitter())
//!     .build()?;
//!
//! hub.start()?;
//! // ... consume pool.samples() ...
//! hub.stop()?;
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::HubConfig;
use crate::container::{ChunkReader, ChunkWriter};
use crate::metadata::{CaptureMetadata, sidecar_path};
use crate::pool::FrameSubmitter;
use crate::source::LiveSource;
use crate::types::RawFrame;
use crate::{Result, ScanError};

/// Distributor counters (atomic for access from any thread)
#[derive(Debug, Default)]
pub struct HubStats {
    pub frames_read: AtomicU64,
    pub bytes_read: AtomicU64,
    pub chunks_written: AtomicU64,
    pub frames_submitted: AtomicU64,
    pub read_errors: AtomicU64,
}

enum Input {
    Live(Box<dyn LiveSource>),
    Recorded { path: PathBuf, reader: ChunkReader<File> },
}

struct Dump {
    path: PathBuf,
    writer: ChunkWriter<BufWriter<File>>,
}

/// Everything the background loop owns while running
struct Parts {
    input: Input,
    dump: Option<Dump>,
    decoder: Option<FrameSubmitter>,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<(Parts, Option<ScanError>)>,
}

enum State {
    Ready(Parts),
    Running(Running),
    Stopped,
}

/// Builder for [`DataHub`]
#[derive(Default)]
pub struct DataHubBuilder {
    live: Option<Box<dyn LiveSource>>,
    recorded: Option<PathBuf>,
    dump: Option<PathBuf>,
    decoder: Option<FrameSubmitter>,
    config: HubConfig,
}

impl DataHubBuilder {
    /// Read from a live spectral source
    pub fn live<S: LiveSource>(mut self, source: S) -> Self {
        self.live = Some(Box::new(source));
        self
    }

    /// Replay a recorded capture file
    pub fn recorded<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.recorded = Some(path.into());
        self
    }

    /// Write every frame to a capture file
    pub fn dump_to<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.dump = Some(path.into());
        self
    }

    /// Submit every frame to a decode pool
    pub fn decode_into(mut self, submitter: FrameSubmitter) -> Self {
        self.decoder = Some(submitter);
        self
    }

    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the input combination and open all files
    pub fn build(self) -> Result<DataHub> {
        self.config.validate()?;

        let input = match (self.live, self.recorded) {
            (Some(_), Some(_)) => {
                return Err(ScanError::invalid_input(
                    "both a live source and a recorded capture are configured",
                ));
            }
            (None, None) => {
                return Err(ScanError::invalid_input(
                    "no input configured: need a live source or a recorded capture",
                ));
            }
            (Some(source), None) => Input::Live(source),
            (None, Some(path)) => {
                let reader = ChunkReader::open(&path, self.config.replay_block_size)?;
                Input::Recorded { path, reader }
            }
        };

        let dump = match self.dump {
            Some(path) => Some(Dump { writer: ChunkWriter::create(&path)?, path }),
            None => None,
        };

        match &input {
            Input::Live(_) => debug!("Hub input: live source"),
            Input::Recorded { path, .. } => debug!(path = %path.display(), "Hub input: recording"),
        }

        Ok(DataHub {
            state: State::Ready(Parts { input, dump, decoder: self.decoder }),
            config: self.config,
            stats: Arc::new(HubStats::default()),
            metadata: None,
            sidecar: None,
        })
    }
}

/// Background distributor for one capture or replay.
pub struct DataHub {
    state: State,
    config: HubConfig,
    stats: Arc<HubStats>,
    metadata: Option<CaptureMetadata>,
    /// Set for live captures with a dump
    sidecar: Option<PathBuf>,
}

impl DataHub {
    pub fn builder() -> DataHubBuilder {
        DataHubBuilder::default()
    }

    /// Start the background loop.
    ///
    /// For a live source, data already pending in the device is discarded
    /// first and the capture metadata is stamped with the start time.
    pub fn start(&mut self) -> Result<()> {
        let mut parts = match std::mem::replace(&mut self.state, State::Stopped) {
            State::Ready(parts) => parts,
            running @ State::Running(_) => {
                self.state = running;
                return Err(ScanError::state("hub is already running"));
            }
            State::Stopped => {
                return Err(ScanError::state("hub has been stopped; build a new hub"));
            }
        };

        if let Input::Live(source) = &mut parts.input {
            if self.config.flush_on_start {
                flush_stale(source.as_mut());
            }
            match source.config() {
                Ok(config) => {
                    let metadata = CaptureMetadata::begin(config);
                    info!(start_time = %metadata.start_time, "Live capture started");
                    self.metadata = Some(metadata);
                }
                Err(e) => {
                    self.state = State::Ready(parts);
                    return Err(e);
                }
            }
            self.sidecar = parts.dump.as_ref().map(|dump| sidecar_path(&dump.path));
        }

        let cancel = CancellationToken::new();
        let distributor = Distributor {
            cancel: cancel.clone(),
            stats: Arc::clone(&self.stats),
            config: self.config.clone(),
        };
        let handle = thread::Builder::new()
            .name("spectral-hub".to_string())
            .spawn(move || distributor.run(parts))
            .map_err(|e| ScanError::state(format!("failed to spawn hub thread: {}", e)))?;

        self.state = State::Running(Running { cancel, handle });
        Ok(())
    }

    /// Stop the loop, wait for it to exit and close all files.
    ///
    /// A live capture with a dump gets its metadata sidecar written here.
    /// Errors from the loop (e.g. a failed dump write) are reported now.
    pub fn stop(&mut self) -> Result<()> {
        let running = match std::mem::replace(&mut self.state, State::Stopped) {
            State::Running(running) => running,
            other => {
                self.state = other;
                return Ok(());
            }
        };

        running.cancel.cancel();
        let (mut parts, loop_error) = running
            .handle
            .join()
            .map_err(|_| ScanError::state("hub thread panicked"))?;

        let mut result = loop_error.map_or(Ok(()), Err);

        if let Some(dump) = parts.dump.as_mut() {
            match dump.writer.flush() {
                Ok(()) => info!(
                    path = %dump.path.display(),
                    chunks = dump.writer.chunks_written(),
                    bytes = dump.writer.bytes_written(),
                    "Capture file closed"
                ),
                Err(e) => {
                    error!(path = %dump.path.display(), error = %e, "Failed to flush capture file");
                    result = result.and(Err(ScanError::file_error(&dump.path, e)));
                }
            }
        }

        if let (Some(metadata), Some(path)) = (self.metadata.as_mut(), self.sidecar.as_ref()) {
            metadata.finish();
            if let Err(e) = metadata.write_to(path) {
                error!(error = %e, "Failed to write capture metadata");
                result = result.and(Err(e));
            }
        }

        let stats = &self.stats;
        info!(
            frames = stats.frames_read.load(Ordering::Relaxed),
            bytes = stats.bytes_read.load(Ordering::Relaxed),
            chunks = stats.chunks_written.load(Ordering::Relaxed),
            submitted = stats.frames_submitted.load(Ordering::Relaxed),
            "Hub stopped"
        );

        // Dropping the parts closes the input and dump files
        drop(parts);
        result
    }

    /// True while the background loop is alive. A replay ends on its own at end of file.
    pub fn is_running(&self) -> bool {
        matches!(&self.state, State::Running(running) if !running.handle.is_finished())
    }

    pub fn stats(&self) -> &HubStats {
        &self.stats
    }

    /// Metadata of the current live capture
    pub fn metadata(&self) -> Option<&CaptureMetadata> {
        self.metadata.as_ref()
    }

    /// Where the sidecar of the current live capture is written
    pub fn sidecar_path(&self) -> Option<&Path> {
        self.sidecar.as_deref()
    }
}

impl Drop for DataHub {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "Hub stopped with error");
        }
    }
}

/// Drain data the device buffered before the capture began
fn flush_stale(source: &mut dyn LiveSource) {
    let mut bytes = 0usize;
    loop {
        match source.read_frame() {
            Ok(Some(frame)) => bytes += frame.len(),
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Flushing live source failed");
                break;
            }
        }
    }
    if bytes > 0 {
        debug!(bytes, "Discarded stale spectral data");
    }
}

/// The background loop
struct Distributor {
    cancel: CancellationToken,
    stats: Arc<HubStats>,
    config: HubConfig,
}

impl Distributor {
    fn run(self, mut parts: Parts) -> (Parts, Option<ScanError>) {
        let error = match &mut parts.input {
            Input::Live(source) => {
                info!("Hub thread started (live)");
                self.run_live(source.as_mut(), &mut parts.dump, &mut parts.decoder)
            }
            Input::Recorded { path, reader } => {
                info!(path = %path.display(), "Hub thread started (replay)");
                self.run_replay(reader, &mut parts.dump, &mut parts.decoder)
            }
        };
        info!(frames = self.stats.frames_read.load(Ordering::Relaxed), "Hub thread ended");
        (parts, error.err())
    }

    fn run_live(
        &self,
        source: &mut dyn LiveSource,
        dump: &mut Option<Dump>,
        decoder: &mut Option<FrameSubmitter>,
    ) -> Result<()> {
        // Check for cancellation between reads
        while !self.cancel.is_cancelled() {
            match source.read_frame() {
                Ok(Some(bytes)) => self.distribute(RawFrame::new(bytes), dump, decoder)?,
                Ok(None) => thread::sleep(self.config.idle_pause()),
                Err(e) => {
                    self.stats.read_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "Live read failed");
                    thread::sleep(self.config.idle_pause());
                }
            }
        }
        debug!("Live loop cancelled");
        Ok(())
    }

    fn run_replay(
        &self,
        reader: &mut ChunkReader<File>,
        dump: &mut Option<Dump>,
        decoder: &mut Option<FrameSubmitter>,
    ) -> Result<()> {
        while !self.cancel.is_cancelled() {
            let Some(chunk) = reader.next_chunk() else {
                info!(chunks = reader.chunks_read(), "Replay reached end of capture");
                return Ok(());
            };
            self.distribute(RawFrame::new(chunk), dump, decoder)?;
        }
        debug!("Replay cancelled");
        Ok(())
    }

    /// Fan one frame out to the configured sinks
    fn distribute(
        &self,
        frame: RawFrame,
        dump: &mut Option<Dump>,
        decoder: &mut Option<FrameSubmitter>,
    ) -> Result<()> {
        self.stats.frames_read.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes_read.fetch_add(frame.len() as u64, Ordering::Relaxed);
        trace!(bytes = frame.len(), "Distributing frame");

        if let Some(dump) = dump.as_mut() {
            dump.writer.write_chunk(frame.as_bytes()).map_err(|e| {
                error!(path = %dump.path.display(), error = %e, "Failed to write capture file");
                ScanError::file_error(&dump.path, e)
            })?;
            self.stats.chunks_written.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(submitter) = decoder.as_ref() {
            match submitter.submit_cancellable(frame, &self.cancel) {
                Ok(true) => {
                    self.stats.frames_submitted.fetch_add(1, Ordering::Relaxed);
                }
                Ok(false) => debug!("Frame not submitted: hub stopping"),
                Err(e) => {
                    warn!(error = %e, "Decode sink detached");
                    *decoder = None;
                }
            }
        }
        Ok(())
    }
}
