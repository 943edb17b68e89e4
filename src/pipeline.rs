//! Pipeline assembly.
//!
//! [`CsiPipeline::start`] wires the components together and starts the long-running
//! tasks:
//!
//! ```text
//! RadioDriver --events--> LinkStateMachine --signal--> ReadinessGate
//!                                                          |
//!                                                    CaptureSetup (once)
//!                                                          |
//! RadioDriver --frames--> CaptureCallbackAdapter --> CsiIngestQueue --> CsiSerializer --> output
//! ```
//!
//! Radio start is the only step that can fail `start`. Everything after it runs on its
//! own task: a capture setup failure ends only the capture setup task.

use crate::capture::{CaptureCallbackAdapter, CaptureSetup};
use crate::config::{CsiConfig, OutputConfig};
use crate::error::{AppResult, CsiError};
use crate::gate::ReadinessGate;
use crate::hardware::{LinkCredentials, RadioDriver};
use crate::link::{LinkState, LinkStateMachine};
use crate::queue::CsiIngestQueue;
use crate::serializer::CsiSerializer;
use crate::stats::{PipelineCounters, PipelineStats};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Boxed output stream records are written to.
pub type RecordSink = Box<dyn AsyncWrite + Unpin + Send>;

/// Open the configured record output. Failure is boot-fatal.
pub async fn open_output(config: &OutputConfig) -> AppResult<RecordSink> {
    match config {
        OutputConfig::Stdout => Ok(Box::new(tokio::io::stdout())),
        OutputConfig::File { path } => {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map_err(|e| {
                    CsiError::Boot(format!("cannot open output {}: {}", path.display(), e))
                })?;
            info!(path = %path.display(), "writing records to file");
            Ok(Box::new(file))
        }
    }
}

/// Entry point for assembling the pipeline.
pub struct CsiPipeline;

impl CsiPipeline {
    /// Build every stage, start the radio and spawn the pipeline tasks.
    pub async fn start<R, W>(
        config: &CsiConfig,
        radio: Arc<R>,
        output: W,
    ) -> AppResult<PipelineHandle>
    where
        R: RadioDriver + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let counters = Arc::new(PipelineCounters::default());
        let gate = Arc::new(ReadinessGate::new());

        let max_csi_len = config.pipeline.max_csi_len.min(radio.max_csi_len());
        let (producer, consumer) =
            CsiIngestQueue::new(config.pipeline.queue_capacity, max_csi_len, counters.clone())
                .split();
        debug!(
            capacity = producer.capacity(),
            max_csi_len, "ingest queue allocated"
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut machine = LinkStateMachine::new(
            radio.clone(),
            LinkCredentials::from(&config.link),
            gate.clone(),
            config.link.reconnect.build(),
            counters.clone(),
        );
        let link_state = machine.subscribe();
        machine.start(events_tx).await?;

        let serializer = tokio::spawn(CsiSerializer::new(consumer, output, counters.clone()).run());
        let link = tokio::spawn(machine.run(events_rx));

        let adapter = CaptureCallbackAdapter::new(producer, max_csi_len);
        let capture =
            CaptureSetup::new(gate.clone(), radio, config.capture).spawn(adapter.into_callback());

        info!(ssid = %config.link.ssid, "pipeline started");
        Ok(PipelineHandle {
            counters,
            gate,
            link_state,
            link,
            capture: Some(capture),
            serializer,
        })
    }
}

/// Running pipeline.
pub struct PipelineHandle {
    counters: Arc<PipelineCounters>,
    gate: Arc<ReadinessGate>,
    link_state: watch::Receiver<LinkState>,
    link: JoinHandle<()>,
    capture: Option<JoinHandle<AppResult<()>>>,
    serializer: JoinHandle<()>,
}

impl PipelineHandle {
    /// Counter snapshot.
    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Shared counters.
    pub fn counters(&self) -> Arc<PipelineCounters> {
        self.counters.clone()
    }

    /// Current link state.
    pub fn link_state(&self) -> LinkState {
        *self.link_state.borrow()
    }

    /// Watch link state changes.
    pub fn subscribe_link(&self) -> watch::Receiver<LinkState> {
        self.link_state.clone()
    }

    /// The readiness gate opened by the first successful connection.
    pub fn gate(&self) -> &Arc<ReadinessGate> {
        &self.gate
    }

    /// Whether the serializer task is still running.
    pub fn is_serializer_running(&self) -> bool {
        !self.serializer.is_finished()
    }

    /// Whether the link task is still running.
    pub fn is_link_running(&self) -> bool {
        !self.link.is_finished()
    }

    /// Wait for capture setup to finish and return its outcome.
    ///
    /// Returns `None` once the outcome has already been taken.
    pub async fn capture_outcome(&mut self) -> Option<AppResult<()>> {
        let task = self.capture.take()?;
        Some(task.await.map_err(CsiError::from).and_then(|result| result))
    }

    /// Abort all pipeline tasks and return the final counters.
    pub fn shutdown(self) -> PipelineStats {
        if let Some(capture) = &self.capture {
            capture.abort();
        }
        self.link.abort();
        self.serializer.abort();
        let stats = self.counters.snapshot();
        info!(?stats, "pipeline stopped");
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LinkConfig, SimulationConfig};
    use crate::error::{DriverFault, ErrorClass};
    use crate::hardware::mock::SimulatedRadio;
    use std::time::Duration;

    fn config() -> CsiConfig {
        CsiConfig {
            link: LinkConfig {
                ssid: "lab-ap".to_string(),
                password: "correct horse".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn quiet_radio() -> Arc<SimulatedRadio> {
        Arc::new(SimulatedRadio::new(SimulationConfig {
            frame_interval: Duration::ZERO,
            connect_latency: Duration::from_millis(1),
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn radio_start_failure_is_boot_fatal() {
        let radio = quiet_radio();
        radio.fail_start(DriverFault::new(0x3001));

        let err = CsiPipeline::start(&config(), radio, tokio::io::sink())
            .await
            .err()
            .unwrap();
        assert_eq!(err.class(), ErrorClass::BootFatal);
    }

    #[tokio::test]
    async fn capture_is_enabled_once_the_link_is_up() {
        let radio = quiet_radio();
        let mut handle = CsiPipeline::start(&config(), radio.clone(), tokio::io::sink())
            .await
            .unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(2), handle.capture_outcome())
            .await
            .unwrap();
        assert!(matches!(outcome, Some(Ok(()))));
        assert!(radio.is_csi_enabled());
        assert!(handle.gate().is_signaled());
        assert_eq!(handle.link_state(), LinkState::Connected);
        assert!(handle.capture_outcome().await.is_none());

        handle.shutdown();
    }

    #[tokio::test]
    async fn configured_credentials_reach_the_radio() {
        let radio = quiet_radio();
        let mut handle = CsiPipeline::start(&config(), radio.clone(), tokio::io::sink())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle.capture_outcome())
            .await
            .unwrap();

        assert_eq!(
            radio.credentials(),
            Some(LinkCredentials::new("lab-ap", "correct horse"))
        );
        handle.shutdown();
    }

    #[tokio::test]
    async fn output_file_is_created_for_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.log");
        let sink = open_output(&OutputConfig::File { path: path.clone() }).await;
        assert!(sink.is_ok());
        assert!(path.exists());

        let missing = OutputConfig::File {
            path: dir.path().join("no/such/dir/records.log"),
        };
        let err = open_output(&missing).await.err().unwrap();
        assert_eq!(err.class(), ErrorClass::BootFatal);
    }
}
