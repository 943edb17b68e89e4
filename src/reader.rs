//! Host-side record reader.
//!
//! The device stream interleaves framed records with ordinary console output, and a
//! serial link can corrupt or split bytes. The reader therefore works line by line:
//! every line is decoded lossily as UTF-8, searched for a `CSI_START{...}CSI_END` frame,
//! and classified. Nothing on one line can stop the next one from being read.

use crate::sample::CsiSample;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

// Bodies never nest braces, so a truncated frame cannot swallow the intact one behind it.
static RECORD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"CSI_START(\{[^{]*?\})CSI_END").expect("Invalid record regex")
});

/// Why a framed record could not be decoded.
#[derive(Error, Debug)]
pub enum RecordError {
    /// Body is not valid JSON, misses a field, or a value is out of range
    #[error("invalid record body: {0}")]
    Json(#[from] serde_json::Error),

    /// `len` disagrees with the number of `csi_data` values
    #[error("declared len {declared} but csi_data holds {actual} values")]
    LengthMismatch {
        /// Value of the `len` field
        declared: usize,
        /// Number of values actually present
        actual: usize,
    },
}

/// One classified line of the device stream.
#[derive(Debug)]
pub enum StreamItem {
    /// A decoded record
    Record(CsiSample),
    /// A line without a record frame (device console output)
    Text(String),
    /// A framed record whose body could not be decoded
    Malformed {
        /// The offending line
        line: String,
        /// What was wrong with it
        error: RecordError,
    },
}

#[derive(Deserialize)]
struct RecordBody {
    rssi: i8,
    rate: u8,
    channel: u8,
    bandwidth: u8,
    len: usize,
    timestamp: i64,
    csi_data: Vec<i8>,
}

/// Decode the JSON body found between the record delimiters.
pub fn parse_record(body: &str) -> Result<CsiSample, RecordError> {
    let body: RecordBody = serde_json::from_str(body)?;
    if body.len != body.csi_data.len() {
        return Err(RecordError::LengthMismatch {
            declared: body.len,
            actual: body.csi_data.len(),
        });
    }
    Ok(CsiSample::new(
        body.rssi,
        body.rate,
        body.channel,
        body.bandwidth,
        body.timestamp,
        body.csi_data,
    ))
}

/// Classify one line of the stream. Only the first frame on a line is considered.
pub fn parse_line(line: &str) -> StreamItem {
    let line = line.trim_end_matches(['\r', '\n']);
    match RECORD_REGEX.captures(line).and_then(|c| c.get(1)) {
        Some(body) => match parse_record(body.as_str()) {
            Ok(sample) => StreamItem::Record(sample),
            Err(error) => StreamItem::Malformed {
                line: line.to_string(),
                error,
            },
        },
        None => StreamItem::Text(line.to_string()),
    }
}

/// Reads [`StreamItem`]s from an async byte stream (file, stdin, serial port).
pub struct RecordReader<R> {
    inner: BufReader<R>,
    line: Vec<u8>,
}

impl<R: AsyncRead + Unpin> RecordReader<R> {
    /// Wrap a byte stream.
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            line: Vec::with_capacity(4096),
        }
    }

    /// Next non-blank line, classified. `Ok(None)` at end of stream.
    pub async fn next_item(&mut self) -> std::io::Result<Option<StreamItem>> {
        loop {
            self.line.clear();
            if self.inner.read_until(b'\n', &mut self.line).await? == 0 {
                return Ok(None);
            }
            let text = String::from_utf8_lossy(&self.line);
            if text.trim().is_empty() {
                continue;
            }
            return Ok(Some(parse_line(&text)));
        }
    }
}
