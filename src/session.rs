//! Per-session summary of a logged record stream (host side).
//!
//! The `log` command feeds every decoded record into a [`SessionSummary`] and prints it
//! when the input ends: packet count, RSSI spread, and which channels, data rates and CSI
//! lengths were seen.

use crate::sample::CsiSample;
use std::collections::BTreeSet;
use std::fmt;

/// Aggregates over the records of one logging session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSummary {
    /// Records decoded
    pub packets: u64,
    /// Lines that carried a frame but could not be decoded
    pub malformed: u64,
    rssi_min: Option<i8>,
    rssi_max: Option<i8>,
    rssi_sum: i64,
    /// Distinct primary channels
    pub channels: BTreeSet<u8>,
    /// Distinct PHY rate codes
    pub rates: BTreeSet<u8>,
    /// Distinct CSI payload lengths
    pub csi_lengths: BTreeSet<usize>,
}

impl SessionSummary {
    /// Empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one decoded record into the summary.
    pub fn record(&mut self, sample: &CsiSample) {
        self.packets += 1;
        self.rssi_min = Some(self.rssi_min.map_or(sample.rssi, |m| m.min(sample.rssi)));
        self.rssi_max = Some(self.rssi_max.map_or(sample.rssi, |m| m.max(sample.rssi)));
        self.rssi_sum += i64::from(sample.rssi);
        self.channels.insert(sample.channel);
        self.rates.insert(sample.rate);
        self.csi_lengths.insert(sample.len());
    }

    /// Count one undecodable frame.
    pub fn record_malformed(&mut self) {
        self.malformed += 1;
    }

    /// Lowest and highest RSSI seen, in dBm.
    pub fn rssi_range(&self) -> Option<(i8, i8)> {
        self.rssi_min.zip(self.rssi_max)
    }

    /// Mean RSSI in dBm, `None` before the first record.
    pub fn rssi_mean(&self) -> Option<f64> {
        (self.packets > 0).then(|| self.rssi_sum as f64 / self.packets as f64)
    }
}

fn join<T: fmt::Display>(values: &BTreeSet<T>) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total packets: {}", self.packets)?;
        writeln!(f, "Malformed frames: {}", self.malformed)?;
        let (Some((min, max)), Some(mean)) = (self.rssi_range(), self.rssi_mean()) else {
            return Ok(());
        };
        writeln!(f, "RSSI range: {} to {} dBm", min, max)?;
        writeln!(f, "Average RSSI: {:.2} dBm", mean)?;
        writeln!(f, "Channels seen: [{}]", join(&self.channels))?;
        writeln!(f, "Data rates: [{}]", join(&self.rates))?;
        write!(f, "CSI data lengths: [{}]", join(&self.csi_lengths))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(rssi: i8, rate: u8, channel: u8, len: usize) -> CsiSample {
        CsiSample::new(rssi, rate, channel, 0, 0, vec![0; len])
    }

    #[test]
    fn empty_session_has_no_rssi_figures() {
        let summary = SessionSummary::new();
        assert_eq!(summary.packets, 0);
        assert!(summary.rssi_range().is_none());
        assert!(summary.rssi_mean().is_none());
        assert_eq!(summary.to_string(), "Total packets: 0\nMalformed frames: 0\n");
    }

    #[test]
    fn aggregates_across_records() {
        let mut summary = SessionSummary::new();
        summary.record(&sample(-40, 11, 6, 128));
        summary.record(&sample(-71, 1, 11, 384));
        summary.record(&sample(-55, 11, 6, 128));
        summary.record_malformed();

        assert_eq!(summary.packets, 3);
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.rssi_range(), Some((-71, -40)));
        let mean = summary.rssi_mean().unwrap();
        assert!((mean - (-166.0 / 3.0)).abs() < 1e-9);
        assert_eq!(summary.channels.iter().copied().collect::<Vec<_>>(), vec![6, 11]);
        assert_eq!(summary.rates.iter().copied().collect::<Vec<_>>(), vec![1, 11]);
        assert_eq!(
            summary.csi_lengths.iter().copied().collect::<Vec<_>>(),
            vec![128, 384]
        );
    }

    #[test]
    fn extreme_rssi_does_not_overflow() {
        let mut summary = SessionSummary::new();
        for _ in 0..1000 {
            summary.record(&sample(i8::MIN, 0, 1, 0));
        }
        assert_eq!(summary.rssi_mean(), Some(-128.0));
        assert_eq!(summary.rssi_range(), Some((i8::MIN, i8::MIN)));
    }

    #[test]
    fn display_lists_sorted_sets() {
        let mut summary = SessionSummary::new();
        summary.record(&sample(-50, 11, 11, 64));
        summary.record(&sample(-60, 2, 1, 64));

        let text = summary.to_string();
        assert!(text.contains("Total packets: 2\n"));
        assert!(text.contains("RSSI range: -60 to -50 dBm\n"));
        assert!(text.contains("Average RSSI: -55.00 dBm\n"));
        assert!(text.contains("Channels seen: [1, 11]\n"));
        assert!(text.contains("Data rates: [2, 11]\n"));
        assert!(text.ends_with("CSI data lengths: [64]"));
    }
}
