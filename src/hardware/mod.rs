//! Radio driver seam.
//!
//! The pipeline talks to the radio only through [`RadioDriver`]. A driver:
//!
//! - starts the station and pushes link-layer events into the channel it is given,
//! - accepts connect requests,
//! - accepts CSI configuration, a capture callback, and an on/off switch.
//!
//! Every control call can fail with a driver-defined [`DriverFault`].
//!
//! # Callback contract
//!
//! The capture callback is invoked synchronously from the driver's receive context with a
//! [`RawCsiFrame`] that borrows driver-owned memory. It must return quickly, must not block
//! or await, and must not keep the borrowed buffer after it returns.
//!
//! # Example
//!
//! ```rust,ignore
//! let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
//! radio.start(events_tx).await?;
//! radio.connect(&LinkCredentials::from(&config.link)).await?;
//! ```

pub mod mock;

use crate::capture::CaptureConfig;
use crate::config::LinkConfig;
use crate::error::DriverFault;
use crate::link::LinkEvent;
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

/// Channel the driver uses to report link-layer events.
pub type LinkEventSender = mpsc::UnboundedSender<LinkEvent>;

/// Capture callback handed to the driver.
pub type CsiCallback = Box<dyn FnMut(&RawCsiFrame<'_>) + Send + 'static>;

/// Station credentials handed to the driver with every connect request.
#[derive(Clone, PartialEq, Eq)]
pub struct LinkCredentials {
    /// Network name
    pub ssid: String,
    /// Passphrase; empty for an open network
    pub password: String,
}

impl LinkCredentials {
    /// Credentials for `ssid` protected by `password`.
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
        }
    }

    /// Whether the network is open.
    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

impl From<&LinkConfig> for LinkCredentials {
    fn from(config: &LinkConfig) -> Self {
        Self::new(config.ssid.clone(), config.password.clone())
    }
}

// Keep the passphrase out of logs.
impl fmt::Debug for LinkCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkCredentials")
            .field("ssid", &self.ssid)
            .field("password", &if self.is_open() { "" } else { "***" })
            .finish()
    }
}

/// Per-frame receive metadata reported by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxControl {
    /// Received signal strength in dBm
    pub rssi: i8,
    /// PHY data rate code
    pub rate: u8,
    /// Primary channel
    pub channel: u8,
    /// Channel bandwidth code (0 = 20 MHz)
    pub bandwidth: u8,
}

/// A CSI report as the driver delivers it: metadata plus a borrowed buffer.
#[derive(Debug, Clone, Copy)]
pub struct RawCsiFrame<'a> {
    /// Receive metadata
    pub rx_ctrl: RxControl,
    /// Payload length as stated by the driver; not trusted on its own
    pub len: u16,
    /// Driver-owned CSI bytes, valid only for the duration of the callback
    pub buf: &'a [i8],
}

/// Capability: Wireless station with CSI capture.
///
/// # Contract
/// - `start` is called once; the driver then reports `Started` and later events on `events`
/// - `connect` only issues the request; the outcome arrives as an event
/// - `set_csi_config`, `register_csi_callback`, `set_csi_enabled` are called in that order,
///   once the link is up
///
/// # Thread Safety
/// - All methods take `&self`; drivers use interior mutability for their state
#[async_trait]
pub trait RadioDriver: Send + Sync {
    /// Bring up the station and start delivering link events.
    async fn start(&self, events: LinkEventSender) -> Result<(), DriverFault>;

    /// Ask the station to (re)connect to the network named by `credentials`.
    async fn connect(&self, credentials: &LinkCredentials) -> Result<(), DriverFault>;

    /// Apply the CSI capture policy.
    async fn set_csi_config(&self, config: &CaptureConfig) -> Result<(), DriverFault>;

    /// Install the capture callback, replacing any previous one.
    async fn register_csi_callback(&self, callback: CsiCallback) -> Result<(), DriverFault>;

    /// Switch CSI delivery on or off.
    async fn set_csi_enabled(&self, enabled: bool) -> Result<(), DriverFault>;

    /// Largest CSI buffer the driver can deliver, in bytes.
    fn max_csi_len(&self) -> usize;
}
