//! The owned CSI sample that travels from the capture callback to the serializer.

/// One captured CSI measurement.
///
/// A sample is owned by exactly one pipeline stage at a time. The payload length is
/// the length of the sample; there is no separately stored count that could disagree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsiSample {
    /// Received signal strength in dBm
    pub rssi: i8,
    /// PHY data rate code reported by the driver
    pub rate: u8,
    /// Primary channel number
    pub channel: u8,
    /// Channel bandwidth code (0 = 20 MHz)
    pub bandwidth: u8,
    /// Monotonic microseconds since boot
    pub timestamp: i64,
    payload: Vec<i8>,
}

impl CsiSample {
    /// Build a sample from its metadata and an owned payload.
    pub fn new(
        rssi: i8,
        rate: u8,
        channel: u8,
        bandwidth: u8,
        timestamp: i64,
        payload: Vec<i8>,
    ) -> Self {
        Self {
            rssi,
            rate,
            channel,
            bandwidth,
            timestamp,
            payload,
        }
    }

    /// Number of payload bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Raw signed CSI bytes.
    pub fn payload(&self) -> &[i8] {
        &self.payload
    }

    /// Give the payload buffer back so it can be reused by the producer.
    pub fn into_payload(self) -> Vec<i8> {
        self.payload
    }
}
