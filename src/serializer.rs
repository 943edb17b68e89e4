//! Record serializer task.
//!
//! Drains the ingest queue forever and writes one self-framed text record per sample:
//!
//! ```text
//! CSI_START{"rssi":-52,"rate":11,"channel":6,"bandwidth":0,"len":3,"timestamp":1200,"csi_data":[1,-2,3]}CSI_END
//! ```
//!
//! Each record goes out as a single `write_all` followed by `flush`, so a reader never
//! sees half a record from this writer. A failed write loses that record only; it is
//! logged, counted, and the loop moves on to the next sample.

use crate::queue::IngestConsumer;
use crate::sample::CsiSample;
use crate::stats::PipelineCounters;
use std::fmt::{self, Write as _};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

/// Opening delimiter of a record.
pub const RECORD_START: &str = "CSI_START";

/// Closing delimiter of a record.
pub const RECORD_END: &str = "CSI_END";

/// Wire rendering of one sample. Field order is fixed.
#[derive(Debug, Clone, Copy)]
pub struct WireRecord<'a>(pub &'a CsiSample);

impl fmt::Display for WireRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sample = self.0;
        write!(
            f,
            "{RECORD_START}{{\"rssi\":{},\"rate\":{},\"channel\":{},\"bandwidth\":{},\"len\":{},\"timestamp\":{},\"csi_data\":[",
            sample.rssi,
            sample.rate,
            sample.channel,
            sample.bandwidth,
            sample.len(),
            sample.timestamp,
        )?;
        for (i, value) in sample.payload().iter().enumerate() {
            if i > 0 {
                f.write_char(',')?;
            }
            write!(f, "{value}")?;
        }
        writeln!(f, "]}}{RECORD_END}")
    }
}

/// Render a sample as a complete record, trailing newline included.
pub fn format_record(sample: &CsiSample) -> String {
    WireRecord(sample).to_string()
}

/// Consumer task writing records to an async output stream.
pub struct CsiSerializer<W> {
    consumer: IngestConsumer,
    output: W,
    buf: String,
    counters: Arc<PipelineCounters>,
}

impl<W> CsiSerializer<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Serializer reading from `consumer` and writing to `output`.
    pub fn new(consumer: IngestConsumer, output: W, counters: Arc<PipelineCounters>) -> Self {
        Self {
            consumer,
            output,
            buf: String::with_capacity(256),
            counters,
        }
    }

    /// Dequeue, write and recycle, forever.
    pub async fn run(mut self) {
        info!("serializer started");
        loop {
            let sample = self.consumer.dequeue().await;
            self.emit(sample).await;
        }
    }

    /// Write one sample and hand its buffer back to the producer.
    pub async fn emit(&mut self, sample: CsiSample) {
        match self.write_record(&sample).await {
            Ok(()) => self.counters.record_written(),
            Err(e) => {
                self.counters.record_write_error();
                warn!(error = %e, timestamp = sample.timestamp, "record write failed, sample lost");
                // A partial frame may be on the stream; end its line.
                if self.output.write_all(b"\n").await.is_ok() {
                    let _ = self.output.flush().await;
                }
            }
        }
        self.consumer.recycle(sample);
    }

    async fn write_record(&mut self, sample: &CsiSample) -> io::Result<()> {
        self.buf.clear();
        write!(self.buf, "{}", WireRecord(sample))
            .map_err(|_| io::Error::other("record formatting failed"))?;
        self.output.write_all(self.buf.as_bytes()).await?;
        self.output.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::CsiIngestQueue;
    use crate::reader::{RecordReader, StreamItem};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    /// Writer that fails the first `failures` writes, then collects bytes.
    ///
    /// Before the first failure it accepts up to `partial` bytes, leaving a
    /// truncated frame behind the way a dying serial link does.
    struct FlakyWriter {
        failures: usize,
        partial: usize,
        written: Vec<u8>,
    }

    impl FlakyWriter {
        fn new(failures: usize, partial: usize) -> Self {
            Self {
                failures,
                partial,
                written: Vec::new(),
            }
        }
    }

    impl AsyncWrite for FlakyWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.failures > 0 && self.partial > 0 {
                let n = self.partial.min(buf.len());
                self.partial = 0;
                self.written.extend_from_slice(&buf[..n]);
                return Poll::Ready(Ok(n));
            }
            if self.failures > 0 {
                self.failures -= 1;
                return Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)));
            }
            self.written.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn record_has_fixed_field_order() {
        let sample = CsiSample::new(-52, 11, 6, 0, 1200, vec![1, -2, 3]);
        assert_eq!(
            format_record(&sample),
            "CSI_START{\"rssi\":-52,\"rate\":11,\"channel\":6,\"bandwidth\":0,\"len\":3,\"timestamp\":1200,\"csi_data\":[1,-2,3]}CSI_END\n"
        );
    }

    #[test]
    fn empty_payload_has_empty_array() {
        let sample = CsiSample::new(-90, 0, 1, 1, 0, Vec::new());
        let record = format_record(&sample);
        assert!(record.contains("\"len\":0,"));
        assert!(record.ends_with("\"csi_data\":[]}CSI_END\n"));
    }

    #[test]
    fn extreme_values_render_in_full() {
        let sample = CsiSample::new(i8::MIN, u8::MAX, 14, 1, i64::MAX, vec![i8::MIN, i8::MAX]);
        let record = format_record(&sample);
        assert!(record.contains("\"rssi\":-128,"));
        assert!(record.contains("\"timestamp\":9223372036854775807,"));
        assert!(record.contains("[-128,127]"));
    }

    #[tokio::test]
    async fn write_failure_loses_one_record_and_continues() {
        let counters = Arc::new(PipelineCounters::default());
        let (_tx, rx) = CsiIngestQueue::new(4, 16, counters.clone()).split();
        let mut serializer = CsiSerializer::new(rx, FlakyWriter::new(1, 0), counters.clone());

        serializer
            .emit(CsiSample::new(-40, 1, 6, 0, 1, vec![1]))
            .await;
        serializer
            .emit(CsiSample::new(-40, 1, 6, 0, 2, vec![2]))
            .await;

        let stats = counters.snapshot();
        assert_eq!(stats.write_errors, 1);
        assert_eq!(stats.written, 1);
        let text = String::from_utf8(serializer.output.written.clone()).unwrap();
        let records: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(records.len(), 1);
        assert!(records[0].contains("\"timestamp\":2,"));
    }

    #[tokio::test]
    async fn truncated_write_does_not_corrupt_next_record() {
        let counters = Arc::new(PipelineCounters::default());
        let (_tx, rx) = CsiIngestQueue::new(4, 16, counters.clone()).split();
        let mut serializer = CsiSerializer::new(rx, FlakyWriter::new(1, 20), counters.clone());

        serializer
            .emit(CsiSample::new(-40, 1, 6, 0, 1, vec![1, 2]))
            .await;
        serializer
            .emit(CsiSample::new(-41, 1, 6, 0, 2, vec![7, 8]))
            .await;

        let stats = counters.snapshot();
        assert_eq!(stats.write_errors, 1);
        assert_eq!(stats.written, 1);

        let stream = serializer.output.written.clone();
        assert!(stream.starts_with(b"CSI_START{\"rssi\":-40"));
        let mut reader = RecordReader::new(stream.as_slice());
        let mut records = Vec::new();
        while let Some(item) = reader.next_item().await.unwrap() {
            if let StreamItem::Record(sample) = item {
                records.push(sample);
            }
        }
        assert_eq!(records, vec![CsiSample::new(-41, 1, 6, 0, 2, vec![7, 8])]);
    }

    #[tokio::test]
    async fn run_writes_samples_in_queue_order() {
        let counters = Arc::new(PipelineCounters::default());
        let (mut tx, rx) = CsiIngestQueue::new(8, 16, counters.clone()).split();
        let (writer, mut reader) = tokio::io::duplex(4096);
        let task = tokio::spawn(CsiSerializer::new(rx, writer, counters.clone()).run());

        for ts in 1..=5 {
            assert!(tx.try_enqueue(CsiSample::new(-40, 1, 6, 0, ts, vec![ts as i8])));
        }

        let mut collected = String::new();
        let mut chunk = [0u8; 1024];
        while collected.matches('\n').count() < 5 {
            let n = tokio::time::timeout(Duration::from_secs(1), reader.read(&mut chunk))
                .await
                .unwrap()
                .unwrap();
            collected.push_str(std::str::from_utf8(&chunk[..n]).unwrap());
        }
        task.abort();

        let stamps: Vec<String> = collected
            .lines()
            .map(|line| {
                line.split("\"timestamp\":")
                    .nth(1)
                    .and_then(|rest| rest.split(',').next())
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(stamps, vec!["1", "2", "3", "4", "5"]);
    }
}
