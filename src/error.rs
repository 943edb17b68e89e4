//! Custom error types for the CSI pipeline.
//!
//! This module defines the primary error type, `CsiError`, for the whole crate. Using the
//! `thiserror` crate, it provides a centralized and consistent way to handle the failures
//! that can occur between boot and the live record stream.
//!
//! ## Error Hierarchy
//!
//! `CsiError` consolidates the following sources:
//!
//! - **`Config`**: Wraps errors from `figment`, typically file parsing or type mismatches
//!   while layering the TOML file and environment overrides.
//! - **`Configuration`**: Semantic errors in a configuration that parsed fine but is
//!   logically invalid (e.g. an SSID longer than 32 bytes).
//! - **`Io`**: Wraps `std::io::Error` (output sinks, input streams, serial ports).
//! - **`Boot`**: The radio or output could not be brought up. Nothing past startup runs.
//! - **`Capture`**: One of the three capture-setup steps was rejected by the driver.
//!   Fatal to CSI capture only; link management and the serializer keep running.
//! - **`Driver`**: A bare driver fault outside of capture setup.
//! - **`Record`**: A framed record on the host side could not be decoded.
//! - **`Task`**: A pipeline task panicked or was aborted.
//!
//! [`CsiError::class`] maps every variant onto the propagation policy in [`ErrorClass`].

use std::fmt;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, CsiError>;

/// Fault reported by the radio driver, carrying its driver-defined code.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("driver fault 0x{code:x}")]
pub struct DriverFault {
    /// Driver-defined fault code
    pub code: i32,
}

impl DriverFault {
    /// Wrap a raw driver fault code.
    pub const fn new(code: i32) -> Self {
        Self { code }
    }
}

/// The three ordered steps of capture setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureStep {
    /// Apply `CaptureConfig` to the radio
    ApplyConfig,
    /// Register the capture callback with the driver
    RegisterCallback,
    /// Switch CSI delivery on
    Enable,
}

impl fmt::Display for CaptureStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureStep::ApplyConfig => "apply-config",
            CaptureStep::RegisterCallback => "register-callback",
            CaptureStep::Enable => "enable",
        };
        f.write_str(name)
    }
}

/// How far an error is allowed to propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The process must not proceed past startup.
    BootFatal,
    /// Capture is disabled for the link session; everything else keeps running.
    CaptureFatal,
    /// Absorbed locally by the task that hit it.
    Transient,
}

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum CsiError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Boot failed: {0}")]
    Boot(String),

    #[error("Capture setup failed at {step}: {fault}")]
    Capture { step: CaptureStep, fault: DriverFault },

    #[error("Radio driver error: {0}")]
    Driver(#[from] DriverFault),

    #[error("Malformed CSI record: {0}")]
    Record(#[from] crate::reader::RecordError),

    #[error("Pipeline task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[cfg(feature = "storage_csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<figment::Error> for CsiError {
    fn from(value: figment::Error) -> Self {
        CsiError::Config(Box::new(value))
    }
}

impl CsiError {
    /// Classify this error against the propagation policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            CsiError::Config(_) | CsiError::Configuration(_) | CsiError::Boot(_) => {
                ErrorClass::BootFatal
            }
            CsiError::Capture { .. } => ErrorClass::CaptureFatal,
            CsiError::Io(_) | CsiError::Driver(_) | CsiError::Record(_) | CsiError::Task(_) => {
                ErrorClass::Transient
            }
            #[cfg(feature = "storage_csv")]
            CsiError::Csv(_) => ErrorClass::Transient,
        }
    }

    /// Shorthand for building a capture-setup failure.
    pub fn capture(step: CaptureStep, fault: DriverFault) -> Self {
        CsiError::Capture { step, fault }
    }
}
