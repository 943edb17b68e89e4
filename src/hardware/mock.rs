//! Simulated Radio
//!
//! Provides a station with CSI capture for running the pipeline without radio hardware.
//!
//! # Behaviour
//!
//! - `start` reports `Started` at once
//! - `connect` reports `AddressAcquired` after `connect_latency`; it rejects an empty
//!   SSID and a passphrase shorter than WPA2 allows
//! - once capture is enabled, a dedicated receive thread (standing in for the driver's
//!   receive context) invokes the capture callback every `frame_interval` with a random
//!   payload, while the link is up
//!
//! # Fault injection
//!
//! - [`SimulatedRadio::fail_start`] makes `start` fail
//! - [`SimulatedRadio::reject_connects`] rejects the next N connect requests
//! - [`SimulatedRadio::fail_capture_step`] rejects one capture setup step
//! - [`SimulatedRadio::drop_link`] reports a link loss

use crate::capture::CaptureConfig;
use crate::config::SimulationConfig;
use crate::error::{CaptureStep, DriverFault};
use crate::hardware::{
    CsiCallback, LinkCredentials, LinkEventSender, RadioDriver, RawCsiFrame, RxControl,
};
use crate::link::LinkEvent;
use async_trait::async_trait;
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, info};

/// Largest CSI buffer the simulated radio delivers.
pub const SIM_MAX_CSI_LEN: usize = 384;

/// Fault code reported when the receive thread cannot be created.
pub const SIM_FAULT_NO_MEM: i32 = 0x101;

/// Fault code for a connect request without an SSID.
pub const SIM_FAULT_SSID: i32 = 0x300b;

/// Fault code for a passphrase the station cannot use.
pub const SIM_FAULT_PASSWORD: i32 = 0x300c;

/// Shortest non-empty WPA2 passphrase.
const MIN_PASSPHRASE_LEN: usize = 8;

/// Address handed out on every successful connect.
const SIM_STATION_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 2);

/// Simulated station with CSI capture.
pub struct SimulatedRadio {
    settings: SimulationConfig,
    shared: Arc<RadioShared>,
    events: Mutex<Option<LinkEventSender>>,
    csi_config: Mutex<Option<CaptureConfig>>,
    credentials: Mutex<Option<LinkCredentials>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    connect_requests: AtomicU64,
    rejected_connects: AtomicU32,
    faults: Mutex<Faults>,
}

/// State shared with the receive thread.
#[derive(Default)]
struct RadioShared {
    callback: Mutex<Option<CsiCallback>>,
    enabled: AtomicBool,
    connected: AtomicBool,
    stop: AtomicBool,
    frames: AtomicU64,
}

#[derive(Default)]
struct Faults {
    start: Option<DriverFault>,
    connect: Option<DriverFault>,
    capture: Option<(CaptureStep, DriverFault)>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RadioShared {
    fn deliver(&self, rx_ctrl: RxControl, buf: &[i8]) -> bool {
        let mut callback = lock(&self.callback);
        let Some(callback) = callback.as_mut() else {
            return false;
        };
        let frame = RawCsiFrame {
            rx_ctrl,
            len: u16::try_from(buf.len()).unwrap_or(u16::MAX),
            buf,
        };
        callback(&frame);
        self.frames.fetch_add(1, Ordering::Relaxed);
        true
    }
}

impl SimulatedRadio {
    /// Create a simulated radio with the given timing and payload settings.
    pub fn new(settings: SimulationConfig) -> Self {
        Self {
            settings,
            shared: Arc::new(RadioShared::default()),
            events: Mutex::new(None),
            csi_config: Mutex::new(None),
            credentials: Mutex::new(None),
            receiver: Mutex::new(None),
            connect_requests: AtomicU64::new(0),
            rejected_connects: AtomicU32::new(0),
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Make the next `start` fail.
    pub fn fail_start(&self, fault: DriverFault) {
        lock(&self.faults).start = Some(fault);
    }

    /// Reject the next `count` connect requests with `fault`.
    pub fn reject_connects(&self, count: u32, fault: DriverFault) {
        lock(&self.faults).connect = Some(fault);
        self.rejected_connects.store(count, Ordering::SeqCst);
    }

    /// Reject one capture setup step with `fault`.
    pub fn fail_capture_step(&self, step: CaptureStep, fault: DriverFault) {
        lock(&self.faults).capture = Some((step, fault));
    }

    /// Report a link loss with the given reason code.
    pub fn drop_link(&self, reason: u8) {
        self.shared.connected.store(false, Ordering::SeqCst);
        self.send_event(LinkEvent::Lost { reason });
    }

    /// Deliver one frame to the registered callback, as the receive path would.
    ///
    /// Returns `false` if capture is not enabled or no callback is registered.
    pub fn emit_frame(&self, rx_ctrl: RxControl, buf: &[i8]) -> bool {
        if !self.shared.enabled.load(Ordering::SeqCst) {
            return false;
        }
        self.shared.deliver(rx_ctrl, buf)
    }

    /// Capture policy applied so far, if any.
    pub fn csi_config(&self) -> Option<CaptureConfig> {
        *lock(&self.csi_config)
    }

    /// Whether CSI delivery is switched on.
    pub fn is_csi_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Whether the simulated station currently holds an address.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Credentials of the last accepted connect request.
    pub fn credentials(&self) -> Option<LinkCredentials> {
        lock(&self.credentials).clone()
    }

    /// Connect requests received, including rejected ones.
    pub fn connect_requests(&self) -> u64 {
        self.connect_requests.load(Ordering::SeqCst)
    }

    /// Frames handed to the capture callback.
    pub fn frames_emitted(&self) -> u64 {
        self.shared.frames.load(Ordering::Relaxed)
    }

    fn send_event(&self, event: LinkEvent) {
        if let Some(events) = lock(&self.events).as_ref() {
            if events.send(event).is_err() {
                debug!(?event, "link event dropped, no listener");
            }
        }
    }

    fn capture_fault(&self, step: CaptureStep) -> Result<(), DriverFault> {
        match lock(&self.faults).capture {
            Some((failing, fault)) if failing == step => Err(fault),
            _ => Ok(()),
        }
    }

    fn spawn_receiver(&self) -> Result<(), DriverFault> {
        let mut receiver = lock(&self.receiver);
        if receiver.is_some() || self.settings.frame_interval.is_zero() {
            return Ok(());
        }

        let shared = self.shared.clone();
        let settings = self.settings.clone();
        let handle = std::thread::Builder::new()
            .name("sim-radio-rx".to_string())
            .spawn(move || receive_loop(&shared, &settings))
            .map_err(|_| DriverFault::new(SIM_FAULT_NO_MEM))?;
        *receiver = Some(handle);
        Ok(())
    }
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl Drop for SimulatedRadio {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
    }
}

fn receive_loop(shared: &RadioShared, settings: &SimulationConfig) {
    let mut rng = rand::thread_rng();
    let mut buf = vec![0i8; settings.payload_len.min(SIM_MAX_CSI_LEN)];
    let (low, high) = if settings.rssi_min <= settings.rssi_max {
        (settings.rssi_min, settings.rssi_max)
    } else {
        (settings.rssi_max, settings.rssi_min)
    };

    while !shared.stop.load(Ordering::SeqCst) {
        std::thread::sleep(settings.frame_interval);
        if !shared.enabled.load(Ordering::SeqCst) || !shared.connected.load(Ordering::SeqCst) {
            continue;
        }
        rng.fill(buf.as_mut_slice());
        let rx_ctrl = RxControl {
            rssi: rng.gen_range(low..=high),
            rate: 11,
            channel: settings.channel,
            bandwidth: 0,
        };
        shared.deliver(rx_ctrl, &buf);
    }
}

#[async_trait]
impl RadioDriver for SimulatedRadio {
    async fn start(&self, events: LinkEventSender) -> Result<(), DriverFault> {
        if let Some(fault) = lock(&self.faults).start {
            return Err(fault);
        }
        *lock(&self.events) = Some(events);
        info!("SimulatedRadio: station started");
        self.send_event(LinkEvent::Started);
        Ok(())
    }

    async fn connect(&self, credentials: &LinkCredentials) -> Result<(), DriverFault> {
        self.connect_requests.fetch_add(1, Ordering::SeqCst);
        if credentials.ssid.is_empty() {
            return Err(DriverFault::new(SIM_FAULT_SSID));
        }
        if !credentials.is_open() && credentials.password.len() < MIN_PASSPHRASE_LEN {
            return Err(DriverFault::new(SIM_FAULT_PASSWORD));
        }

        let rejected = self
            .rejected_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            let fault = lock(&self.faults).connect.unwrap_or(DriverFault::new(-1));
            return Err(fault);
        }

        *lock(&self.credentials) = Some(credentials.clone());
        debug!(ssid = %credentials.ssid, open = credentials.is_open(), "SimulatedRadio: connecting");
        let events = lock(&self.events).clone();
        let shared = self.shared.clone();
        let latency = self.settings.connect_latency;
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            shared.connected.store(true, Ordering::SeqCst);
            if let Some(events) = events {
                let _ = events.send(LinkEvent::AddressAcquired {
                    address: IpAddr::V4(SIM_STATION_ADDRESS),
                });
            }
        });
        Ok(())
    }

    async fn set_csi_config(&self, config: &CaptureConfig) -> Result<(), DriverFault> {
        self.capture_fault(CaptureStep::ApplyConfig)?;
        *lock(&self.csi_config) = Some(*config);
        Ok(())
    }

    async fn register_csi_callback(&self, callback: CsiCallback) -> Result<(), DriverFault> {
        self.capture_fault(CaptureStep::RegisterCallback)?;
        *lock(&self.shared.callback) = Some(callback);
        Ok(())
    }

    async fn set_csi_enabled(&self, enabled: bool) -> Result<(), DriverFault> {
        if enabled {
            self.capture_fault(CaptureStep::Enable)?;
            self.spawn_receiver()?;
        }
        self.shared.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn max_csi_len(&self) -> usize {
        SIM_MAX_CSI_LEN
    }
}
