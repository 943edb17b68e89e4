//! Fuzz target for record framing.
//!
//! Tests:
//! - Every sample the serializer can emit is read back unchanged
//! - Console noise before the frame does not hide the record

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rust_csi::reader::{parse_line, StreamItem};
use rust_csi::sample::CsiSample;
use rust_csi::serializer::format_record;

#[derive(Debug, Arbitrary)]
struct RecordInput {
    rssi: i8,
    rate: u8,
    channel: u8,
    bandwidth: u8,
    timestamp: i64,
    payload: Vec<i8>,
    /// Console text printed ahead of the record on the same line
    prefix: String,
}

fuzz_target!(|input: RecordInput| {
    if input.prefix.contains('\n') || input.prefix.contains("CSI_START") {
        return;
    }
    let sample = CsiSample::new(
        input.rssi,
        input.rate,
        input.channel,
        input.bandwidth,
        input.timestamp,
        input.payload,
    );
    let line = format!("{}{}", input.prefix, format_record(&sample));

    match parse_line(&line) {
        StreamItem::Record(decoded) => assert_eq!(decoded, sample),
        other => panic!("record lost: {:?}", other),
    }
});
