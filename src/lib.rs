//! # Rust CSI Core Library
//!
//! This crate captures wireless Channel State Information (CSI) delivered asynchronously by
//! a radio driver, buffers it across a bounded producer/consumer boundary, and streams it
//! as self-framed text records for a host-side consumer. It also owns the wireless link
//! lifecycle and makes sure capture is configured exactly once, after the link is up.
//!
//! ## Crate Structure
//!
//! - **`capture`**: Capture policy (`CaptureConfig`), the driver callback adapter that
//!   turns raw reports into owned samples, and the one-shot capture setup routine.
//! - **`config`**: Layered configuration (defaults, TOML file, environment) via `figment`.
//! - **`error`**: The crate-wide `CsiError` and its propagation classes.
//! - **`gate`**: `ReadinessGate`, the one-shot signal between the link and capture setup.
//! - **`hardware`**: The `RadioDriver` capability trait and the `SimulatedRadio` driver.
//! - **`link`**: Link states and events, the `LinkStateMachine`, and reconnect policies.
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`pipeline`**: Wires every stage together and spawns the pipeline tasks.
//! - **`queue`**: `CsiIngestQueue`, the bounded lock-free hand-off with drop-newest overflow.
//! - **`reader`**: Host-side parser that recovers records from a noisy byte stream.
//! - **`sample`**: `CsiSample`, the owned unit of data.
//! - **`session`**: Per-session summary printed by the host-side logger.
//! - **`serializer`**: The consumer task writing framed records.
//! - **`stats`**: Shared pipeline counters.
//! - **`csv_log`**: CSV log of received records (feature `storage_csv`).

pub mod capture;
pub mod config;
pub mod error;
pub mod gate;
pub mod hardware;
pub mod link;
pub mod logging;
pub mod pipeline;
pub mod queue;
pub mod reader;
pub mod sample;
pub mod serializer;
pub mod session;
pub mod stats;

// Host-side CSV log
#[cfg(feature = "storage_csv")]
pub mod csv_log;
