//! Decode worker pool
//!
//! A fixed set of worker threads pulls [`RawFrame`]s from a bounded input
//! queue, runs the packet codec over each and publishes the decoded samples
//! to a bounded output queue. Both queues apply back-pressure: producers
//! block while a queue is full.
//!
//! ## Ordering
//!
//! With a single worker (the default) samples leave the pool in submission
//! order, frame by frame and packet by packet. With more workers frames are
//! decoded concurrently and consumers that need time order must sort by
//! `tsf` themselves.
//!
//! ## Shutdown
//!
//! [`DecodePool::shutdown`] cancels the workers. A worker finishes the frame
//! it is decoding unless it is blocked on a full output queue, in which case
//! the rest of that frame is abandoned. Frames still queued are discarded.
//!
//! ```rust,no_run
//! use athspectral::{DecodePool, DecoderConfig, RawFrame};
//!
//! # fn main() -> athspectral::Result<()> {
//! let mut pool = DecodePool::spawn(&DecoderConfig::default())?;
//! pool.submit(RawFrame::new(std::fs::read("frame.bin")?))?;
//! while !pool.is_finished() {
//!     if let Ok(sample) = pool.samples().recv_timeout(std::time::Duration::from_millis(100)) {
//!         println!("tsf={} freq={}", sample.tsf, sample.center_freq_mhz);
//!     }
//! }
//! pool.shutdown();
//! # Ok(())
//! # }
//! ```

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::codec::decode_frame;
use crate::config::DecoderConfig;
use crate::stream::SampleStream;
use crate::types::{DecodedSample, RawFrame};
use crate::{Result, ScanError};

/// Decode pool counters (atomic for access from any thread)
#[derive(Debug, Default)]
pub struct PoolStats {
    pub frames_submitted: AtomicU64,
    pub frames_decoded: AtomicU64,
    /// Frames discarded unstarted at shutdown
    pub frames_discarded: AtomicU64,
    pub samples_emitted: AtomicU64,
    /// Frames whose decoding stopped at a malformed header
    pub malformed_frames: AtomicU64,
    /// Packets dropped for zero band power
    pub dropped_packets: AtomicU64,
    /// Frames abandoned on an unsupported packet or channel type
    pub failed_frames: AtomicU64,
}

/// Point-in-time copy of [`PoolStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    pub frames_submitted: u64,
    pub frames_decoded: u64,
    pub frames_discarded: u64,
    pub samples_emitted: u64,
    pub malformed_frames: u64,
    pub dropped_packets: u64,
    pub failed_frames: u64,
}

impl PoolStats {
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            frames_submitted: self.frames_submitted.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
            samples_emitted: self.samples_emitted.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            dropped_packets: self.dropped_packets.load(Ordering::Relaxed),
            failed_frames: self.failed_frames.load(Ordering::Relaxed),
        }
    }
}

/// State shared by the pool handle, its submitters and its workers
#[derive(Debug)]
struct Shared {
    cancel: CancellationToken,
    stats: PoolStats,
    /// Frames submitted and not yet decoded or discarded
    pending: AtomicUsize,
    poll_timeout: Duration,
}

impl Shared {
    fn frame_done(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Cloneable handle for feeding frames into a [`DecodePool`].
#[derive(Debug, Clone)]
pub struct FrameSubmitter {
    input: Sender<RawFrame>,
    shared: Arc<Shared>,
}

impl FrameSubmitter {
    /// Queue a frame, blocking while the input queue is full.
    ///
    /// Fails with [`ScanError::QueueClosed`] once the pool is shut down.
    pub fn submit(&self, frame: RawFrame) -> Result<()> {
        self.send(frame, None).map(|_| ())
    }

    /// Queue a frame unless `cancel` fires while waiting for queue space.
    ///
    /// Returns `Ok(false)` when the frame was not queued because of `cancel`.
    pub fn submit_cancellable(&self, frame: RawFrame, cancel: &CancellationToken) -> Result<bool> {
        self.send(frame, Some(cancel))
    }

    pub fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    fn send(&self, frame: RawFrame, cancel: Option<&CancellationToken>) -> Result<bool> {
        if self.shared.cancel.is_cancelled() {
            return Err(ScanError::QueueClosed { queue: "input" });
        }

        // Count before queueing so a worker can never observe the frame uncounted
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        let mut frame = frame;
        loop {
            match self.input.send_timeout(frame, self.shared.poll_timeout) {
                Ok(()) => {
                    self.shared.stats.frames_submitted.fetch_add(1, Ordering::Relaxed);
                    return Ok(true);
                }
                Err(SendTimeoutError::Timeout(returned)) => {
                    if self.shared.cancel.is_cancelled() {
                        self.shared.frame_done();
                        return Err(ScanError::QueueClosed { queue: "input" });
                    }
                    if cancel.is_some_and(CancellationToken::is_cancelled) {
                        self.shared.frame_done();
                        return Ok(false);
                    }
                    trace!("input queue full, waiting");
                    frame = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    self.shared.frame_done();
                    return Err(ScanError::QueueClosed { queue: "input" });
                }
            }
        }
    }
}

/// Fixed-size pool of decode worker threads.
pub struct DecodePool {
    submitter: FrameSubmitter,
    /// Second handle on the input queue, used to discard queued frames at shutdown
    queued: Receiver<RawFrame>,
    output: Receiver<DecodedSample>,
    workers: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl DecodePool {
    /// Start `config.workers` decode workers
    pub fn spawn(config: &DecoderConfig) -> Result<Self> {
        config.validate()?;

        let (input_tx, input_rx) = bounded::<RawFrame>(config.input_capacity);
        let (output_tx, output_rx) = bounded::<DecodedSample>(config.output_capacity);
        let shared = Arc::new(Shared {
            cancel: CancellationToken::new(),
            stats: PoolStats::default(),
            pending: AtomicUsize::new(0),
            poll_timeout: config.poll_timeout(),
        });

        let mut workers = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            let worker = Worker {
                id,
                input: input_rx.clone(),
                output: output_tx.clone(),
                shared: Arc::clone(&shared),
                emit_power: config.emit_power,
            };
            let spawned = thread::Builder::new()
                .name(format!("spectral-decode-{}", id))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    shared.cancel.cancel();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(ScanError::state(format!("failed to spawn decode worker: {}", e)));
                }
            }
        }

        info!(
            workers = config.workers,
            input_capacity = config.input_capacity,
            output_capacity = config.output_capacity,
            emit_power = config.emit_power,
            "Decode pool started"
        );

        let submitter = FrameSubmitter { input: input_tx, shared: Arc::clone(&shared) };
        Ok(Self { submitter, queued: input_rx, output: output_rx, workers, shared })
    }

    /// Queue a raw frame for decoding, blocking while the input queue is full
    pub fn submit(&self, frame: RawFrame) -> Result<()> {
        self.submitter.submit(frame)
    }

    /// Handle for submitting from other threads (e.g. a [`DataHub`](crate::DataHub))
    pub fn submitter(&self) -> FrameSubmitter {
        self.submitter.clone()
    }

    /// The output queue. Each sample is delivered to exactly one receiver.
    pub fn samples(&self) -> &Receiver<DecodedSample> {
        &self.output
    }

    /// Decoded samples as an async stream that ends after shutdown
    pub fn subscribe(&self) -> SampleStream {
        SampleStream::spawn(
            self.output.clone(),
            self.shared.cancel.clone(),
            self.shared.poll_timeout,
        )
    }

    /// True when the input queue is empty right now.
    ///
    /// A frame may still be in the middle of decoding; see [`is_finished`](Self::is_finished).
    pub fn is_idle(&self) -> bool {
        self.queued.is_empty()
    }

    /// True once shut down, or when every submitted frame has been fully decoded
    pub fn is_finished(&self) -> bool {
        self.shared.cancel.is_cancelled() || self.shared.pending.load(Ordering::Acquire) == 0
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub fn stats(&self) -> &PoolStats {
        &self.shared.stats
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop the workers, discard queued frames and wait for the threads to exit.
    ///
    /// Samples already in the output queue remain available. Calling this
    /// more than once is harmless.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() && self.shared.cancel.is_cancelled() {
            return;
        }
        info!("Shutting down decode pool");
        self.shared.cancel.cancel();

        let mut discarded = self.discard_queued();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("decode worker panicked");
            }
        }
        discarded += self.discard_queued();

        let stats = self.shared.stats.snapshot();
        info!(
            frames = stats.frames_decoded,
            samples = stats.samples_emitted,
            discarded,
            "Decode pool stopped"
        );
    }

    fn discard_queued(&self) -> u64 {
        let mut discarded = 0;
        while let Ok(_frame) = self.queued.try_recv() {
            self.shared.frame_done();
            discarded += 1;
        }
        self.shared.stats.frames_discarded.fetch_add(discarded, Ordering::Relaxed);
        discarded
    }
}

impl Drop for DecodePool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DecodePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodePool")
            .field("workers", &self.workers.len())
            .field("pending", &self.shared.pending.load(Ordering::Relaxed))
            .field("shutdown", &self.shared.cancel.is_cancelled())
            .finish()
    }
}

struct Worker {
    id: usize,
    input: Receiver<RawFrame>,
    output: Sender<DecodedSample>,
    shared: Arc<Shared>,
    emit_power: bool,
}

/// Outcome of publishing one sample
enum Publish {
    Sent,
    Cancelled,
    Closed,
}

impl Worker {
    fn run(self) {
        debug!(worker = self.id, "Decode worker started");
        let mut frames = 0u64;

        loop {
            // Check for cancellation between frames
            if self.shared.cancel.is_cancelled() {
                break;
            }

            let frame = match self.input.recv_timeout(self.shared.poll_timeout) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    debug!(worker = self.id, "Input queue closed");
                    break;
                }
            };

            // Frames picked up after cancellation were never started
            if self.shared.cancel.is_cancelled() {
                self.shared.stats.frames_discarded.fetch_add(1, Ordering::Relaxed);
                self.shared.frame_done();
                break;
            }

            let keep_running = self.decode(&frame);
            self.shared.frame_done();
            frames += 1;
            if !keep_running {
                break;
            }
        }

        debug!(worker = self.id, frames, "Decode worker stopped");
    }

    /// Decode one frame into the output queue; false when the worker must stop
    fn decode(&self, frame: &RawFrame) -> bool {
        let stats = &self.shared.stats;
        let mut samples = decode_frame(frame, self.emit_power);

        for item in samples.by_ref() {
            match item {
                Ok(sample) => match self.publish(sample) {
                    Publish::Sent => {
                        stats.samples_emitted.fetch_add(1, Ordering::Relaxed);
                    }
                    Publish::Cancelled => {
                        debug!(worker = self.id, "Abandoning frame at shutdown");
                        return false;
                    }
                    Publish::Closed => {
                        warn!(worker = self.id, "Output queue closed");
                        return false;
                    }
                },
                Err(e) => {
                    // Remaining bytes of this frame cannot be interpreted
                    error!(worker = self.id, bytes = frame.len(), error = %e, "Abandoning frame");
                    stats.failed_frames.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        let outcome = samples.stats();
        if outcome.malformed {
            stats.malformed_frames.fetch_add(1, Ordering::Relaxed);
        }
        stats.dropped_packets.fetch_add(outcome.dropped, Ordering::Relaxed);
        stats.frames_decoded.fetch_add(1, Ordering::Relaxed);
        trace!(worker = self.id, samples = outcome.samples, "Frame decoded");
        true
    }

    fn publish(&self, sample: DecodedSample) -> Publish {
        let mut sample = sample;
        loop {
            match self.output.send_timeout(sample, self.shared.poll_timeout) {
                Ok(()) => return Publish::Sent,
                Err(SendTimeoutError::Timeout(returned)) => {
                    if self.shared.cancel.is_cancelled() {
                        return Publish::Cancelled;
                    }
                    sample = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Publish::Closed,
            }
        }
    }
}
