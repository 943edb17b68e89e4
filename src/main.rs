//! CLI Entry Point for rust-csi
//!
//! Provides command-line interface for:
//! - Running the capture pipeline against the simulated radio
//! - Logging a framed record stream on the host (file, stdin or serial port)
//! - Checking the effective configuration
//!
//! # Usage
//!
//! Stream records to stdout for 30 seconds:
//! ```bash
//! rust-csi run --duration 30s
//! ```
//!
//! Log a device's serial output to CSV:
//! ```bash
//! rust-csi log --port /dev/ttyUSB0 --baud 115200 --csv
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rust_csi::config::{CsiConfig, OutputConfig, DEFAULT_CONFIG_PATH};
use rust_csi::hardware::mock::SimulatedRadio;
use rust_csi::logging::{self, OutputFormat, TracingConfig};
use rust_csi::pipeline::{open_output, CsiPipeline};
use rust_csi::reader::{RecordReader, StreamItem};
use rust_csi::sample::CsiSample;
use rust_csi::session::SessionSummary;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::signal;
use tracing::{info, warn};

#[cfg(feature = "storage_csv")]
use rust_csi::csv_log::{default_file_name, CsvRecordLog};

#[derive(Parser)]
#[command(name = "rust-csi")]
#[command(about = "CSI capture pipeline and host-side record logger", long_about = None)]
struct Cli {
    #[command(flatten)]
    logs: LogOptions,

    #[command(subcommand)]
    command: Commands,
}

/// Command-line overrides for the configured logging.
#[derive(Args, Debug, Clone, Copy, Default)]
struct LogOptions {
    /// Log format (pretty, compact, json); overrides the configuration file
    #[arg(long, global = true)]
    log_format: Option<OutputFormat>,

    /// Disable colored log output
    #[arg(long, global = true)]
    no_color: bool,

    /// Also log span open and close events
    #[arg(long, global = true)]
    log_spans: bool,
}

impl LogOptions {
    fn tracing(&self, config: &CsiConfig) -> Result<TracingConfig> {
        let mut tracing = TracingConfig::from_config(config)?
            .with_ansi(!self.no_color)
            .with_span_events(self.log_spans);
        if let Some(format) = self.log_format {
            tracing = tracing.with_format(format);
        }
        Ok(tracing)
    }

    fn init(&self, config: &CsiConfig) -> Result<()> {
        logging::init(self.tracing(config)?)?;
        Ok(())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the capture pipeline against the simulated radio
    Run {
        /// Configuration file (TOML format)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Append records to this file instead of the configured output
        #[arg(long)]
        output: Option<PathBuf>,

        /// Stop after this long (e.g. 30s, 5m); runs until Ctrl+C otherwise
        #[arg(long, value_parser = parse_duration)]
        duration: Option<Duration>,
    },

    /// Read a framed record stream and log it
    Log {
        /// Input file, or `-` for stdin
        #[arg(long, default_value = "-", conflicts_with = "port")]
        input: String,

        /// Also write a CSV log; without a path a timestamped file name is used
        #[arg(long, num_args = 0..=1)]
        csv: Option<Option<PathBuf>>,

        /// Serial device to read from (requires the `serial` feature)
        #[arg(long)]
        port: Option<String>,

        /// Serial baud rate
        #[arg(long, default_value = "115200")]
        baud: u32,

        /// Configuration file (TOML format), used for logging settings
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Load, validate and print the effective configuration
    CheckConfig {
        /// Configuration file (TOML format)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn parse_duration(value: &str) -> Result<Duration, humantime_serde::re::humantime::DurationError> {
    humantime_serde::re::humantime::parse_duration(value)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            output,
            duration,
        } => run_pipeline(cli.logs, config, output, duration).await,
        Commands::Log {
            input,
            csv,
            port,
            baud,
            config,
        } => log_stream(cli.logs, input, csv, port, baud, config).await,
        Commands::CheckConfig { config } => check_config(config),
    }
}

fn load_config(path: Option<&Path>) -> Result<CsiConfig> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    let config = CsiConfig::load_from(path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

async fn run_pipeline(
    logs: LogOptions,
    config_path: Option<PathBuf>,
    output: Option<PathBuf>,
    duration: Option<Duration>,
) -> Result<()> {
    let mut config = load_config(config_path.as_deref())?;
    logs.init(&config)?;
    if let Some(path) = output {
        config.output = OutputConfig::File { path };
    }

    eprintln!("📡 rust-csi - CSI capture pipeline (simulated radio)");
    eprintln!("   SSID: {}", config.link.ssid);
    eprintln!("   Queue capacity: {}", config.pipeline.queue_capacity);
    eprintln!();

    let sink = open_output(&config.output).await?;
    let radio = Arc::new(SimulatedRadio::new(config.simulation.clone()));
    let handle = CsiPipeline::start(&config, radio, sink).await?;

    match duration {
        Some(limit) => {
            tokio::select! {
                _ = tokio::time::sleep(limit) => info!(?limit, "run duration reached"),
                _ = signal::ctrl_c() => info!("interrupted"),
            }
        }
        None => {
            signal::ctrl_c().await?;
            info!("interrupted");
        }
    }

    let stats = handle.shutdown();
    eprintln!();
    eprintln!("📊 Pipeline counters");
    eprintln!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

#[cfg(feature = "storage_csv")]
type CsvSink = CsvRecordLog<std::fs::File>;

#[cfg(not(feature = "storage_csv"))]
type CsvSink = std::convert::Infallible;

#[cfg(feature = "storage_csv")]
fn open_csv(csv: Option<Option<PathBuf>>) -> Result<Option<CsvSink>> {
    let Some(path) = csv else {
        return Ok(None);
    };
    let path = path.unwrap_or_else(|| PathBuf::from(default_file_name(chrono::Local::now())));
    info!(path = %path.display(), "logging records to CSV");
    Ok(Some(CsvRecordLog::create(&path)?))
}

#[cfg(not(feature = "storage_csv"))]
fn open_csv(csv: Option<Option<PathBuf>>) -> Result<Option<CsvSink>> {
    if csv.is_some() {
        anyhow::bail!("--csv requires the `storage_csv` feature");
    }
    Ok(None)
}

#[cfg(feature = "storage_csv")]
fn append_csv(log: &mut Option<CsvSink>, sample: &CsiSample) -> Result<()> {
    if let Some(log) = log.as_mut() {
        log.append(sample, chrono::Local::now())?;
    }
    Ok(())
}

#[cfg(not(feature = "storage_csv"))]
fn append_csv(_log: &mut Option<CsvSink>, _sample: &CsiSample) -> Result<()> {
    Ok(())
}

async fn log_stream(
    logs: LogOptions,
    input: String,
    csv: Option<Option<PathBuf>>,
    port: Option<String>,
    baud: u32,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    logs.init(&config)?;
    let csv_log = open_csv(csv)?;

    if let Some(port) = port {
        #[cfg(feature = "serial")]
        {
            use tokio_serial::SerialPortBuilderExt;

            let stream = tokio_serial::new(&port, baud)
                .open_native_async()
                .with_context(|| format!("opening serial port {}", port))?;
            info!(%port, baud, "reading from serial port");
            return consume(stream, csv_log).await;
        }
        #[cfg(not(feature = "serial"))]
        {
            let _ = baud;
            anyhow::bail!("--port {} requires the `serial` feature", port);
        }
    }

    if input == "-" {
        consume(tokio::io::stdin(), csv_log).await
    } else {
        let file = tokio::fs::File::open(&input)
            .await
            .with_context(|| format!("opening {}", input))?;
        consume(file, csv_log).await
    }
}

async fn consume<R: AsyncRead + Unpin>(input: R, mut csv_log: Option<CsvSink>) -> Result<()> {
    let mut reader = RecordReader::new(input);
    let mut summary = SessionSummary::new();

    while let Some(item) = reader.next_item().await? {
        match item {
            StreamItem::Record(sample) => {
                summary.record(&sample);
                println!(
                    "rssi={} rate={} channel={} bandwidth={} len={} timestamp={}",
                    sample.rssi,
                    sample.rate,
                    sample.channel,
                    sample.bandwidth,
                    sample.len(),
                    sample.timestamp
                );
                append_csv(&mut csv_log, &sample)?;
            }
            StreamItem::Text(line) => println!("{}", line),
            StreamItem::Malformed { line, error } => {
                summary.record_malformed();
                warn!(%error, %line, "skipping malformed record");
            }
        }
    }

    info!(
        records = summary.packets,
        malformed = summary.malformed,
        "input stream ended"
    );
    println!();
    println!("=== Session summary ===");
    println!("{}", summary);
    Ok(())
}

fn check_config(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    print!("{}", config.to_toml()?);
    eprintln!("✅ Configuration is valid");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn log_overrides_apply_on_top_of_configuration() {
        let cli = Cli::try_parse_from([
            "rust-csi",
            "log",
            "--input",
            "capture.txt",
            "--log-format",
            "json",
            "--no-color",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Log { .. }));

        let tracing = cli.logs.tracing(&CsiConfig::default()).unwrap();
        assert_eq!(tracing.format, OutputFormat::Json);
        assert!(!tracing.with_ansi);
        assert!(!tracing.with_span_events);
    }

    #[test]
    fn configured_format_is_kept_without_override() {
        let mut config = CsiConfig::default();
        config.application.log_format = OutputFormat::Pretty;
        let tracing = LogOptions::default().tracing(&config).unwrap();
        assert_eq!(tracing.format, OutputFormat::Pretty);
        assert!(tracing.with_ansi);
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let result = Cli::try_parse_from(["rust-csi", "check-config", "--log-format", "xml"]);
        assert!(result.is_err());
    }
}
