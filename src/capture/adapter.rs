//! Capture callback adapter.
//!
//! The driver calls back once per received frame carrying CSI. The adapter turns that
//! borrowed, driver-owned report into an owned [`CsiSample`] and pushes it into the ingest
//! queue without blocking. It holds the queue producer itself; nothing is registered
//! globally.
//!
//! Per frame:
//! 1. read the monotonic clock,
//! 2. copy metadata and at most `max_csi_len` payload bytes into a recycled buffer,
//! 3. `try_enqueue`, ignoring the result (a full queue drops the frame).

use crate::hardware::{CsiCallback, RawCsiFrame};
use crate::queue::IngestProducer;
use crate::sample::CsiSample;
use std::time::Instant;

/// Source of monotonic microsecond timestamps.
pub trait MonotonicClock: Send + 'static {
    /// Microseconds elapsed since boot.
    fn now_micros(&self) -> i64;
}

/// Clock anchored at the moment it was created.
#[derive(Debug, Clone, Copy)]
pub struct BootClock {
    origin: Instant,
}

impl BootClock {
    /// Start counting from now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Count from an earlier boot instant.
    pub fn since(origin: Instant) -> Self {
        Self { origin }
    }
}

impl Default for BootClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for BootClock {
    fn now_micros(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_micros()).unwrap_or(i64::MAX)
    }
}

/// Owns the queue producer and converts driver reports into samples.
pub struct CaptureCallbackAdapter<C: MonotonicClock = BootClock> {
    producer: IngestProducer,
    clock: C,
    max_csi_len: usize,
}

impl CaptureCallbackAdapter<BootClock> {
    /// Adapter stamping samples with a clock started now.
    pub fn new(producer: IngestProducer, max_csi_len: usize) -> Self {
        Self::with_clock(producer, max_csi_len, BootClock::new())
    }
}

impl<C: MonotonicClock> CaptureCallbackAdapter<C> {
    /// Adapter with an explicit clock.
    pub fn with_clock(producer: IngestProducer, max_csi_len: usize, clock: C) -> Self {
        Self {
            producer,
            clock,
            max_csi_len,
        }
    }

    /// Handle one driver report.
    ///
    /// Runs in the driver's receive context: no locks, no logging, no awaiting. The copy
    /// is bounded by the stated length, the buffer actually supplied and `max_csi_len`,
    /// whichever is smallest.
    pub fn on_frame(&mut self, frame: &RawCsiFrame<'_>) {
        let timestamp = self.clock.now_micros();

        let stated = usize::from(frame.len);
        let copy_len = stated.min(frame.buf.len()).min(self.max_csi_len);
        if copy_len < stated {
            self.producer.counters().record_truncated();
        }

        let mut payload = self.producer.take_buffer();
        payload.extend_from_slice(&frame.buf[..copy_len]);

        let rx = frame.rx_ctrl;
        let sample = CsiSample::new(
            rx.rssi,
            rx.rate,
            rx.channel,
            rx.bandwidth,
            timestamp,
            payload,
        );
        let _ = self.producer.try_enqueue(sample);
    }

    /// Move the adapter into a boxed driver callback.
    pub fn into_callback(mut self) -> CsiCallback {
        Box::new(move |frame: &RawCsiFrame<'_>| self.on_frame(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::RxControl;
    use crate::queue::{CsiIngestQueue, IngestConsumer};
    use crate::stats::PipelineCounters;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    /// Clock that advances by one millisecond per reading.
    struct StepClock(AtomicI64);

    impl MonotonicClock for StepClock {
        fn now_micros(&self) -> i64 {
            self.0.fetch_add(1_000, Ordering::Relaxed)
        }
    }

    fn adapter(
        capacity: usize,
        max_len: usize,
    ) -> (
        CaptureCallbackAdapter<StepClock>,
        IngestConsumer,
        Arc<PipelineCounters>,
    ) {
        let counters = Arc::new(PipelineCounters::default());
        let (tx, rx) = CsiIngestQueue::new(capacity, max_len, counters.clone()).split();
        let adapter = CaptureCallbackAdapter::with_clock(tx, max_len, StepClock(AtomicI64::new(0)));
        (adapter, rx, counters)
    }

    fn frame(buf: &[i8], len: u16) -> RawCsiFrame<'_> {
        RawCsiFrame {
            rx_ctrl: RxControl {
                rssi: -52,
                rate: 11,
                channel: 6,
                bandwidth: 1,
            },
            len,
            buf,
        }
    }

    #[test]
    fn copies_metadata_payload_and_timestamp() {
        let (mut adapter, mut rx, _) = adapter(4, 64);
        let buf = [1i8, -2, 3, -4];
        adapter.on_frame(&frame(&buf, 4));
        adapter.on_frame(&frame(&buf, 4));

        let first = rx.try_dequeue().unwrap();
        assert_eq!(first.rssi, -52);
        assert_eq!(first.rate, 11);
        assert_eq!(first.channel, 6);
        assert_eq!(first.bandwidth, 1);
        assert_eq!(first.payload(), &buf);
        assert_eq!(first.timestamp, 0);

        let second = rx.try_dequeue().unwrap();
        assert_eq!(second.timestamp, 1_000);
    }

    #[test]
    fn stated_length_beyond_maximum_is_truncated() {
        let (mut adapter, mut rx, counters) = adapter(4, 8);
        let buf = [5i8; 32];
        adapter.on_frame(&frame(&buf, 32));

        let sample = rx.try_dequeue().unwrap();
        assert_eq!(sample.len(), 8);
        assert_eq!(counters.snapshot().truncated, 1);
    }

    #[test]
    fn stated_length_beyond_buffer_is_clamped() {
        let (mut adapter, mut rx, counters) = adapter(4, 64);
        let buf = [9i8; 3];
        adapter.on_frame(&frame(&buf, 40));

        assert_eq!(rx.try_dequeue().unwrap().payload(), &buf);
        assert_eq!(counters.snapshot().truncated, 1);
    }

    #[test]
    fn full_queue_drops_silently() {
        let (adapter, mut rx, counters) = adapter(2, 16);
        let mut callback = adapter.into_callback();
        let buf = [0i8; 5];
        for _ in 0..5 {
            callback(&frame(&buf, 5));
        }

        assert_eq!(rx.len(), 2);
        assert_eq!(counters.snapshot().dropped, 3);
        assert_eq!(rx.try_dequeue().unwrap().timestamp, 0);
        assert_eq!(rx.try_dequeue().unwrap().timestamp, 1_000);
    }

    #[test]
    fn boot_clock_is_monotonic() {
        let clock = BootClock::new();
        let a = clock.now_micros();
        let b = clock.now_micros();
        assert!(b >= a);
    }
}
