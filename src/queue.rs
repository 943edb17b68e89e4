//! Bounded hand-off queue between the capture callback and the serializer.
//!
//! The queue is a lock-free single-producer/single-consumer ring (`ringbuf`). The producer
//! half lives inside the capture callback, so it must never block: [`IngestProducer::try_enqueue`]
//! either places the sample or drops it (drop-newest) and returns `false`. The consumer
//! half suspends on a [`Notify`] until a sample arrives.
//!
//! Payload buffers travel back from the consumer to the producer through a second ring,
//! so a steady-state producer reuses pre-sized buffers instead of allocating in the
//! driver's receive context.
//!
//! # Ordering
//! Samples come out in the order they were accepted. Rejected samples are simply absent.

use crate::sample::CsiSample;
use crate::stats::PipelineCounters;
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use std::sync::Arc;
use tokio::sync::Notify;

/// Reference queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// A bounded CSI queue, split into its two halves before use.
pub struct CsiIngestQueue {
    producer: IngestProducer,
    consumer: IngestConsumer,
}

/// Writing half. Owned by the capture callback adapter.
pub struct IngestProducer {
    samples: HeapProducer<CsiSample>,
    free: HeapConsumer<Vec<i8>>,
    spare: Option<Vec<i8>>,
    payload_capacity: usize,
    ready: Arc<Notify>,
    counters: Arc<PipelineCounters>,
}

/// Reading half. Owned by the serializer task.
pub struct IngestConsumer {
    samples: HeapConsumer<CsiSample>,
    free: HeapProducer<Vec<i8>>,
    ready: Arc<Notify>,
    counters: Arc<PipelineCounters>,
}

impl CsiIngestQueue {
    /// Create a queue holding at most `capacity` samples.
    ///
    /// `payload_capacity` is the largest payload a sample can carry; recycled buffers are
    /// allocated to that size up front. A zero capacity is raised to one.
    pub fn new(capacity: usize, payload_capacity: usize, counters: Arc<PipelineCounters>) -> Self {
        let capacity = capacity.max(1);
        let (samples_tx, samples_rx) = HeapRb::<CsiSample>::new(capacity).split();

        // One buffer per slot plus the one the serializer is holding.
        let pool = capacity + 1;
        let (mut free_tx, free_rx) = HeapRb::<Vec<i8>>::new(pool).split();
        for _ in 0..pool {
            if free_tx.push(Vec::with_capacity(payload_capacity)).is_err() {
                break;
            }
        }

        let ready = Arc::new(Notify::new());
        Self {
            producer: IngestProducer {
                samples: samples_tx,
                free: free_rx,
                spare: None,
                payload_capacity,
                ready: ready.clone(),
                counters: counters.clone(),
            },
            consumer: IngestConsumer {
                samples: samples_rx,
                free: free_tx,
                ready,
                counters,
            },
        }
    }

    /// Maximum number of samples held at once.
    pub fn capacity(&self) -> usize {
        self.producer.capacity()
    }

    /// Separate the writing and reading halves.
    pub fn split(self) -> (IngestProducer, IngestConsumer) {
        (self.producer, self.consumer)
    }
}

impl IngestProducer {
    /// Place `sample` at the back of the queue without blocking.
    ///
    /// Returns `false` and discards the sample when the queue is full. Samples already
    /// queued are untouched.
    pub fn try_enqueue(&mut self, sample: CsiSample) -> bool {
        match self.samples.push(sample) {
            Ok(()) => {
                self.counters.record_enqueued();
                self.ready.notify_one();
                true
            }
            Err(rejected) => {
                self.counters.record_dropped();
                // Keep the buffer for the next frame rather than freeing it here.
                self.spare = Some(rejected.into_payload());
                false
            }
        }
    }

    /// An empty payload buffer, reused when one is available.
    pub fn take_buffer(&mut self) -> Vec<i8> {
        let mut buffer = self
            .spare
            .take()
            .or_else(|| self.free.pop())
            .unwrap_or_else(|| Vec::with_capacity(self.payload_capacity));
        buffer.clear();
        buffer
    }

    /// Number of samples waiting.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples are waiting.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether the next `try_enqueue` would be rejected.
    pub fn is_full(&self) -> bool {
        self.samples.is_full()
    }

    /// Maximum number of samples held at once.
    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    pub(crate) fn counters(&self) -> &PipelineCounters {
        &self.counters
    }
}

impl IngestConsumer {
    /// Remove the oldest sample, suspending until one is available.
    pub async fn dequeue(&mut self) -> CsiSample {
        loop {
            if let Some(sample) = self.try_dequeue() {
                return sample;
            }
            // notify_one stores a permit when nobody is waiting, so a push between the
            // check above and this await still wakes us.
            self.ready.notified().await;
        }
    }

    /// Block the current thread until a sample is available.
    ///
    /// For plain threads only; inside a Tokio runtime use [`IngestConsumer::dequeue`].
    pub fn dequeue_blocking(&mut self) -> CsiSample {
        futures::executor::block_on(self.dequeue())
    }

    /// Remove the oldest sample if there is one.
    pub fn try_dequeue(&mut self) -> Option<CsiSample> {
        let sample = self.samples.pop()?;
        self.counters.record_delivered();
        Some(sample)
    }

    /// Return a finished sample's buffer to the producer.
    pub fn recycle(&mut self, sample: CsiSample) {
        // A full pool means the buffer is surplus; letting it drop is fine here.
        let _ = self.free.push(sample.into_payload());
    }

    /// Number of samples waiting.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no samples are waiting.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample(timestamp: i64, len: usize) -> CsiSample {
        CsiSample::new(-40, 11, 6, 0, timestamp, vec![1; len])
    }

    fn queue(capacity: usize) -> (IngestProducer, IngestConsumer, Arc<PipelineCounters>) {
        let counters = Arc::new(PipelineCounters::default());
        let (tx, rx) = CsiIngestQueue::new(capacity, 128, counters.clone()).split();
        (tx, rx, counters)
    }

    #[test]
    fn overflow_drops_newest_and_keeps_oldest_in_order() {
        let (mut tx, mut rx, counters) = queue(10);

        let accepted = (1..=12)
            .map(|ts| tx.try_enqueue(sample(ts, 5)))
            .filter(|ok| *ok)
            .count();
        assert_eq!(accepted, 10);
        assert!(tx.is_full());
        assert_eq!(counters.dropped(), 2);

        let drained: Vec<i64> = std::iter::from_fn(|| rx.try_dequeue())
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(drained, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let q = CsiIngestQueue::new(0, 16, Arc::default());
        assert_eq!(q.capacity(), 1);
    }

    #[test]
    fn recycled_buffers_come_back_empty() {
        let (mut tx, mut rx, _) = queue(2);
        let mut buffer = tx.take_buffer();
        buffer.extend_from_slice(&[3, 4, 5]);
        assert!(tx.try_enqueue(CsiSample::new(0, 0, 1, 0, 1, buffer)));

        let got = rx.try_dequeue().unwrap();
        rx.recycle(got);

        for _ in 0..4 {
            let reused = tx.take_buffer();
            assert!(reused.is_empty());
            assert!(reused.capacity() >= 3);
        }
    }

    #[test]
    fn rejected_sample_buffer_is_kept_as_spare() {
        let (mut tx, _rx, _) = queue(1);
        assert!(tx.try_enqueue(sample(1, 4)));

        let mut big = Vec::with_capacity(512);
        big.extend_from_slice(&[7; 8]);
        assert!(!tx.try_enqueue(CsiSample::new(0, 0, 1, 0, 2, big)));

        let spare = tx.take_buffer();
        assert!(spare.is_empty());
        assert!(spare.capacity() >= 512);
    }

    #[tokio::test]
    async fn dequeue_waits_for_producer() {
        let (mut tx, mut rx, _) = queue(4);
        let consumer = tokio::spawn(async move { rx.dequeue().await.timestamp });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!consumer.is_finished());

        std::thread::spawn(move || {
            assert!(tx.try_enqueue(sample(42, 3)));
            // Keep the producer alive until the consumer has read the sample.
            std::thread::sleep(Duration::from_millis(50));
        });

        let ts = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ts, 42);
    }

    #[test]
    fn blocking_dequeue_preserves_order_across_threads() {
        let (mut tx, mut rx, _) = queue(10);
        let producer = std::thread::spawn(move || {
            let mut sent = 0;
            let mut ts = 0;
            while sent < 100 {
                if tx.try_enqueue(sample(ts, 2)) {
                    sent += 1;
                    ts += 1;
                } else {
                    std::thread::yield_now();
                }
            }
        });

        let received: Vec<i64> = (0..100).map(|_| rx.dequeue_blocking().timestamp).collect();
        producer.join().unwrap();
        assert_eq!(received, (0..100).collect::<Vec<_>>());
    }
}
