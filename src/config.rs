//! Configuration loading using Figment
//!
//! Configuration is layered from:
//! 1. built-in defaults
//! 2. a TOML file (`config/csi.toml` by default)
//! 3. environment variables prefixed with `RUST_CSI_`, nested keys separated by `__`
//!
//! # Example
//! ```no_run
//! use rust_csi::config::CsiConfig;
//!
//! let config = CsiConfig::load()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), rust_csi::error::CsiError>(())
//! ```

use crate::capture::CaptureConfig;
use crate::error::{AppResult, CsiError};
use crate::link::ReconnectConfig;
use crate::logging::OutputFormat;
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/csi.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "RUST_CSI_";

/// Upper bound for `pipeline.max_csi_len`.
pub const MAX_CSI_LEN_LIMIT: usize = 4096;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsiConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Station credentials and reconnect policy
    pub link: LinkConfig,
    /// CSI capture policy applied to the radio
    pub capture: CaptureConfig,
    /// Ingest queue sizing
    pub pipeline: PipelineConfig,
    /// Where records are written
    pub output: OutputConfig,
    /// Simulated radio behaviour
    pub simulation: SimulationConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: OutputFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "rust-csi".to_string(),
            log_level: "info".to_string(),
            log_format: OutputFormat::Compact,
        }
    }
}

/// Station credentials and reconnect policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Network name (1-32 bytes)
    pub ssid: String,
    /// Passphrase (empty for open networks, otherwise 8-64 bytes)
    pub password: String,
    /// Delay strategy between reconnect attempts
    pub reconnect: ReconnectConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            ssid: "csi-lab".to_string(),
            password: String::new(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Ingest queue sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Samples buffered between the capture callback and the serializer
    pub queue_capacity: usize,
    /// Largest payload copied out of the driver, in bytes
    pub max_csi_len: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_csi_len: 384,
        }
    }
}

/// Record output sink
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputConfig {
    /// Standard output
    #[default]
    Stdout,
    /// Append to a file
    File {
        /// Output file path
        path: PathBuf,
    },
}

/// Simulated radio behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Time between simulated CSI frames (0 disables the receive thread)
    #[serde(with = "humantime_serde")]
    pub frame_interval: Duration,
    /// Delay between a connect request and the address being acquired
    #[serde(with = "humantime_serde")]
    pub connect_latency: Duration,
    /// Payload bytes per simulated frame
    pub payload_len: usize,
    /// Lowest simulated RSSI in dBm
    pub rssi_min: i8,
    /// Highest simulated RSSI in dBm
    pub rssi_max: i8,
    /// Channel reported with every frame
    pub channel: u8,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(100),
            connect_latency: Duration::from_millis(200),
            payload_len: 128,
            rssi_min: -80,
            rssi_max: -30,
            channel: 6,
        }
    }
}

impl CsiConfig {
    /// Load configuration from the default file and environment variables
    ///
    /// Example override: `RUST_CSI_PIPELINE__QUEUE_CAPACITY=32`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path. A missing file leaves the defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config = Figment::from(Serialized::defaults(CsiConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        self.check().map_err(CsiError::Configuration)
    }

    fn check(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let ssid_len = self.link.ssid.len();
        if !(1..=32).contains(&ssid_len) {
            return Err(format!(
                "link.ssid must be 1-32 bytes, got {} bytes",
                ssid_len
            ));
        }
        let password_len = self.link.password.len();
        if password_len != 0 && !(8..=64).contains(&password_len) {
            return Err(format!(
                "link.password must be empty or 8-64 bytes, got {} bytes",
                password_len
            ));
        }
        self.link.reconnect.validate()?;
        self.capture.validate()?;

        if self.pipeline.queue_capacity == 0 {
            return Err("pipeline.queue_capacity must be at least 1".to_string());
        }
        if !(1..=MAX_CSI_LEN_LIMIT).contains(&self.pipeline.max_csi_len) {
            return Err(format!(
                "Invalid pipeline.max_csi_len {}. Must be 1-{}",
                self.pipeline.max_csi_len, MAX_CSI_LEN_LIMIT
            ));
        }

        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| CsiError::Configuration(e.to_string()))
    }
}
