//! Pipeline counters.
//!
//! Every stage bumps a shared set of relaxed atomics so drops and write failures are
//! visible without the producer ever taking a lock. `snapshot()` gives a serializable
//! copy for status output.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters for the whole ingest pipeline.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    truncated: AtomicU64,
    delivered: AtomicU64,
    written: AtomicU64,
    write_errors: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time copy of [`PipelineCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Samples accepted by the ingest queue
    pub enqueued: u64,
    /// Samples rejected because the queue was full
    pub dropped: u64,
    /// Samples whose payload was cut to the maximum CSI length
    pub truncated: u64,
    /// Samples handed to the serializer
    pub delivered: u64,
    /// Records fully written to the output stream
    pub written: u64,
    /// Records lost to output write failures
    pub write_errors: u64,
    /// Link losses that triggered a reconnect
    pub reconnects: u64,
}

impl PipelineCounters {
    pub(crate) fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_truncated(&self) {
        self.truncated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_written(&self) {
        self.written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Samples dropped on a full queue so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Copy all counters.
    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            truncated: self.truncated.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}
