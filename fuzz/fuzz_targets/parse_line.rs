//! Fuzz target for the host-side line parser.
//!
//! Tests:
//! - Arbitrary bytes never panic the parser (after lossy UTF-8 decoding)
//! - Any decoded record satisfies the length invariant

#![no_main]

use libfuzzer_sys::fuzz_target;
use rust_csi::reader::{parse_line, StreamItem};

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);
    if let StreamItem::Record(sample) = parse_line(&line) {
        assert_eq!(sample.len(), sample.payload().len());
    }
});
