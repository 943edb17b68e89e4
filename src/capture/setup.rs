//! One-shot capture setup.
//!
//! Waits for the readiness gate, then applies the capture policy, registers the callback
//! and enables capture, in that order. The first failing step aborts the rest and is
//! reported once; there is no retry. Only capture is lost: link management and the
//! serializer keep running.

use crate::capture::CaptureConfig;
use crate::error::{AppResult, CaptureStep, CsiError};
use crate::gate::ReadinessGate;
use crate::hardware::{CsiCallback, RadioDriver};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

/// Everything capture setup needs, gathered before the link comes up.
pub struct CaptureSetup<R: ?Sized> {
    gate: Arc<ReadinessGate>,
    radio: Arc<R>,
    config: CaptureConfig,
}

impl<R> CaptureSetup<R>
where
    R: RadioDriver + ?Sized + 'static,
{
    /// Bundle the gate, radio and capture policy.
    pub fn new(gate: Arc<ReadinessGate>, radio: Arc<R>, config: CaptureConfig) -> Self {
        Self {
            gate,
            radio,
            config,
        }
    }

    /// Wait for the link, then configure, register and enable capture.
    #[instrument(name = "capture_setup", skip_all)]
    pub async fn run(self, callback: CsiCallback) -> AppResult<()> {
        self.gate.wait().await;
        info!("link ready, configuring CSI capture");

        let result = self.apply(callback).await;
        match &result {
            Ok(()) => info!("CSI capture enabled"),
            Err(CsiError::Capture { step, fault }) => error!(
                %step,
                code = fault.code,
                "CSI capture disabled for this link session"
            ),
            Err(other) => error!(error = %other, "CSI capture disabled for this link session"),
        }
        result
    }

    async fn apply(&self, callback: CsiCallback) -> AppResult<()> {
        self.radio
            .set_csi_config(&self.config)
            .await
            .map_err(|fault| CsiError::capture(CaptureStep::ApplyConfig, fault))?;
        self.radio
            .register_csi_callback(callback)
            .await
            .map_err(|fault| CsiError::capture(CaptureStep::RegisterCallback, fault))?;
        self.radio
            .set_csi_enabled(true)
            .await
            .map_err(|fault| CsiError::capture(CaptureStep::Enable, fault))?;
        Ok(())
    }

    /// Run setup as its own short-lived task.
    pub fn spawn(self, callback: CsiCallback) -> JoinHandle<AppResult<()>> {
        tokio::spawn(self.run(callback))
    }
}
