//! Async access to decoded samples

use crossbeam_channel::{Receiver, RecvTimeoutError};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::types::DecodedSample;

/// Samples buffered between the pool's output queue and the async consumer
const STREAM_BUFFER: usize = 256;

/// Stream of decoded samples fed from a decode pool's output queue.
///
/// A forwarding thread moves samples from the pool into a tokio channel.
/// The stream ends once the pool is shut down and its output queue is empty,
/// or when the forwarding thread cannot be started.
pub struct SampleStream {
    inner: ReceiverStream<DecodedSample>,
}

impl SampleStream {
    pub(crate) fn spawn(
        samples: Receiver<DecodedSample>,
        cancel: CancellationToken,
        poll_timeout: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        let forwarder = move || {
            let mut forwarded = 0u64;
            loop {
                match samples.recv_timeout(poll_timeout) {
                    Ok(sample) => {
                        // Blocks while the consumer is behind; fails once the stream is dropped
                        if tx.blocking_send(sample).is_err() {
                            break;
                        }
                        forwarded += 1;
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if cancel.is_cancelled() || tx.is_closed() {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!(forwarded, "Sample stream closed");
        };

        // On failure the sender is dropped with the closure and the stream ends immediately
        if let Err(e) = thread::Builder::new().name("spectral-stream".to_string()).spawn(forwarder)
        {
            warn!(error = %e, "Failed to start sample stream");
        }

        Self { inner: ReceiverStream::new(rx) }
    }
}

impl Stream for SampleStream {
    type Item = DecodedSample;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl std::fmt::Debug for SampleStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleStream").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::ht20_frame;
    use crate::{DecodePool, DecoderConfig, RawFrame};
    use futures::StreamExt;
    use std::time::Duration;

    fn fast_config() -> DecoderConfig {
        DecoderConfig::default().with_poll_timeout(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn stream_yields_samples_in_order() {
        let pool = DecodePool::spawn(&fast_config()).unwrap();
        let stream = pool.subscribe();
        pool.submit(RawFrame::new(ht20_frame(10, 2))).unwrap();
        pool.submit(RawFrame::new(ht20_frame(20, 2))).unwrap();

        let tsfs: Vec<u64> = tokio::time::timeout(
            Duration::from_secs(5),
            stream.take(4).map(|sample| sample.tsf).collect::<Vec<u64>>(),
        )
        .await
        .expect("samples within timeout");
        assert_eq!(tsfs, vec![10, 11, 20, 21]);
    }

    #[tokio::test]
    async fn stream_ends_after_shutdown() {
        let mut pool = DecodePool::spawn(&fast_config()).unwrap();
        let mut stream = pool.subscribe();
        pool.submit(RawFrame::new(ht20_frame(0, 1))).unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), stream.next()).await.unwrap();
        assert_eq!(first.map(|sample| sample.tsf), Some(0));

        pool.shutdown();
        let end = tokio::time::timeout(Duration::from_secs(5), stream.next()).await.unwrap();
        assert!(end.is_none());
    }
}
