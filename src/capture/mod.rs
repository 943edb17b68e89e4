//! CSI capture: the policy applied to the radio, the per-frame callback adapter, and the
//! one-shot setup routine that ties them to the readiness gate.

pub mod adapter;
pub mod config;
pub mod setup;

pub use adapter::{BootClock, CaptureCallbackAdapter, MonotonicClock};
pub use config::CaptureConfig;
pub use setup::CaptureSetup;
