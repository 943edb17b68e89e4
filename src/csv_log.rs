//! CSV log of received records (host side).
//!
//! One row per decoded record, stamped with the host receive time. The file is flushed
//! after every row so a crashed or interrupted logger loses at most the row in flight.

use crate::error::AppResult;
use crate::sample::CsiSample;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Column order of the log.
pub const CSV_HEADER: [&str; 8] = [
    "timestamp",
    "rssi",
    "rate",
    "channel",
    "bandwidth",
    "data_length",
    "esp_timestamp",
    "csi_data",
];

#[derive(Serialize)]
struct CsvRow {
    timestamp: String,
    rssi: i8,
    rate: u8,
    channel: u8,
    bandwidth: u8,
    data_length: usize,
    esp_timestamp: i64,
    csi_data: String,
}

/// File name used when none is given, e.g. `csi_data_20240102_030405.csv`.
pub fn default_file_name(now: DateTime<Local>) -> String {
    now.format("csi_data_%Y%m%d_%H%M%S.csv").to_string()
}

/// Appends decoded records to a CSV file.
pub struct CsvRecordLog<W: Write> {
    writer: csv::Writer<W>,
    rows: u64,
}

impl CsvRecordLog<File> {
    /// Create (or truncate) `path` and write the header row.
    pub fn create<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)?;
        Self::with_writer(writer)
    }
}

impl<W: Write> CsvRecordLog<W> {
    /// Log into an arbitrary writer, header first.
    pub fn from_writer(inner: W) -> AppResult<Self> {
        Self::with_writer(csv::WriterBuilder::new().has_headers(false).from_writer(inner))
    }

    fn with_writer(mut writer: csv::Writer<W>) -> AppResult<Self> {
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;
        Ok(Self { writer, rows: 0 })
    }

    /// Append one record received at `received`.
    pub fn append(&mut self, sample: &CsiSample, received: DateTime<Local>) -> AppResult<()> {
        let csi_data = serde_json::to_string(sample.payload())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.writer.serialize(CsvRow {
            timestamp: received.to_rfc3339(),
            rssi: sample.rssi,
            rate: sample.rate,
            channel: sample.channel,
            bandwidth: sample.bandwidth,
            data_length: sample.len(),
            esp_timestamp: sample.timestamp,
            csi_data,
        })?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far, header excluded.
    pub fn rows(&self) -> u64 {
        self.rows
    }
}
