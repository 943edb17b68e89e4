//! Wireless link lifecycle.
//!
//! ```text
//! Idle --start()--> Starting --Started--> Connecting --AddressAcquired--> Connected
//!                                              ^                             |
//!                                              +--- Disconnected <--Lost-----+
//! ```
//!
//! [`LinkStateMachine::transition`] is the single, synchronous transition function; it
//! returns a [`LinkAction`] that the async event loop then carries out. The machine's only
//! side effects are connect requests and opening the readiness gate.

use crate::error::{AppResult, CsiError};
use crate::gate::ReadinessGate;
use crate::hardware::{LinkCredentials, LinkEventSender, RadioDriver};
use crate::link::policy::ReconnectPolicy;
use crate::link::{LinkEvent, LinkState};
use crate::stats::PipelineCounters;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// What the event loop must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    /// Nothing further
    None,
    /// Issue a connect request after `delay`
    Connect {
        /// Wait before the request
        delay: Duration,
    },
}

/// Owns the link lifecycle and signals readiness.
pub struct LinkStateMachine<R: ?Sized> {
    radio: Arc<R>,
    credentials: LinkCredentials,
    gate: Arc<ReadinessGate>,
    policy: Box<dyn ReconnectPolicy>,
    counters: Arc<PipelineCounters>,
    state: watch::Sender<LinkState>,
    attempt: u32,
}

impl<R> LinkStateMachine<R>
where
    R: RadioDriver + ?Sized + 'static,
{
    /// Create an idle machine that connects with `credentials`.
    pub fn new(
        radio: Arc<R>,
        credentials: LinkCredentials,
        gate: Arc<ReadinessGate>,
        policy: Box<dyn ReconnectPolicy>,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        let (state, _) = watch::channel(LinkState::Idle);
        Self {
            radio,
            credentials,
            gate,
            policy,
            counters,
            state,
            attempt: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: LinkState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "link state changed");
        }
    }

    /// Bring up the radio. A failure here is boot-fatal.
    pub async fn start(&mut self, events: LinkEventSender) -> AppResult<()> {
        self.set_state(LinkState::Starting);
        self.radio
            .start(events)
            .await
            .map_err(|fault| CsiError::Boot(format!("radio start failed: {fault}")))?;
        info!("radio started");
        Ok(())
    }

    /// Apply one link event.
    pub fn transition(&mut self, event: &LinkEvent) -> LinkAction {
        match event {
            LinkEvent::Started => {
                self.set_state(LinkState::Connecting);
                LinkAction::Connect {
                    delay: Duration::ZERO,
                }
            }
            LinkEvent::Lost { reason } => {
                self.set_state(LinkState::Disconnected);
                self.counters.record_reconnect();
                self.attempt = self.attempt.saturating_add(1);
                let delay = self.policy.next_delay(self.attempt);
                warn!(reason, attempt = self.attempt, ?delay, "link lost, reconnecting");
                LinkAction::Connect { delay }
            }
            LinkEvent::AddressAcquired { address } => {
                self.set_state(LinkState::Connected);
                self.attempt = 0;
                info!(%address, "link up");
                if self.gate.signal() {
                    info!("readiness gate opened");
                }
                LinkAction::None
            }
        }
    }

    /// Apply one event and carry out the resulting action.
    pub async fn handle(&mut self, event: LinkEvent) {
        if let LinkAction::Connect { delay } = self.transition(&event) {
            self.connect(delay).await;
        }
    }

    /// Issue a connect request, retrying through the policy until the driver accepts it.
    async fn connect(&mut self, mut delay: Duration) {
        loop {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }

            self.set_state(LinkState::Connecting);
            match self.radio.connect(&self.credentials).await {
                Ok(()) => return,
                Err(fault) => {
                    self.attempt = self.attempt.saturating_add(1);
                    delay = self.policy.next_delay(self.attempt);
                    warn!(
                        code = fault.code,
                        attempt = self.attempt,
                        ?delay,
                        "connect request rejected, retrying"
                    );
                }
            }
        }
    }

    /// Process link events until every sender is gone.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<LinkEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        debug!("link event channel closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverFault;
    use crate::hardware::mock::SimulatedRadio;
    use crate::link::policy::{ExponentialBackoff, Immediate};
    use std::net::{IpAddr, Ipv4Addr};

    fn machine(
        radio: Arc<SimulatedRadio>,
        policy: Box<dyn ReconnectPolicy>,
    ) -> (LinkStateMachine<SimulatedRadio>, Arc<ReadinessGate>) {
        let gate = Arc::new(ReadinessGate::new());
        let machine = LinkStateMachine::new(radio, lab(), gate.clone(), policy, Arc::default());
        (machine, gate)
    }

    fn lab() -> LinkCredentials {
        LinkCredentials::new("lab-ap", "correct horse")
    }

    fn acquired() -> LinkEvent {
        LinkEvent::AddressAcquired {
            address: IpAddr::V4(Ipv4Addr::new(192, 168, 4, 2)),
        }
    }

    #[test]
    fn transitions_follow_the_lifecycle() {
        let (mut m, gate) = machine(Arc::new(SimulatedRadio::default()), Box::new(Immediate));
        assert_eq!(m.state(), LinkState::Idle);

        assert_eq!(
            m.transition(&LinkEvent::Started),
            LinkAction::Connect {
                delay: Duration::ZERO
            }
        );
        assert_eq!(m.state(), LinkState::Connecting);
        assert!(!gate.is_signaled());

        assert_eq!(m.transition(&acquired()), LinkAction::None);
        assert_eq!(m.state(), LinkState::Connected);
        assert!(gate.is_signaled());

        assert_eq!(
            m.transition(&LinkEvent::Lost { reason: 8 }),
            LinkAction::Connect {
                delay: Duration::ZERO
            }
        );
        assert_eq!(m.state(), LinkState::Disconnected);

        // Reconnecting does not re-arm the gate.
        assert_eq!(m.transition(&acquired()), LinkAction::None);
        assert!(gate.is_signaled());
    }

    #[test]
    fn backoff_grows_per_loss_and_resets_on_connect() {
        let policy = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(40));
        let (mut m, _) = machine(Arc::new(SimulatedRadio::default()), Box::new(policy));

        let delays: Vec<Duration> = (0..4)
            .map(|_| match m.transition(&LinkEvent::Lost { reason: 201 }) {
                LinkAction::Connect { delay } => delay,
                LinkAction::None => Duration::MAX,
            })
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(40)
            ]
        );

        m.transition(&acquired());
        assert_eq!(
            m.transition(&LinkEvent::Lost { reason: 201 }),
            LinkAction::Connect {
                delay: Duration::from_millis(10)
            }
        );
    }

    #[tokio::test]
    async fn rejected_connect_is_retried_until_accepted() {
        let radio = Arc::new(SimulatedRadio::default());
        radio.reject_connects(3, DriverFault::new(0x300a));
        let (mut m, _) = machine(radio.clone(), Box::new(Immediate));

        m.handle(LinkEvent::Started).await;
        assert_eq!(radio.connect_requests(), 4);
        assert_eq!(m.state(), LinkState::Connecting);
        assert_eq!(radio.credentials(), Some(lab()));
    }

    #[tokio::test]
    async fn lost_link_counts_a_reconnect() {
        let radio = Arc::new(SimulatedRadio::default());
        let gate = Arc::new(ReadinessGate::new());
        let counters = Arc::new(PipelineCounters::default());
        let mut m = LinkStateMachine::new(
            radio.clone(),
            lab(),
            gate,
            Box::new(Immediate),
            counters.clone(),
        );

        m.handle(LinkEvent::Lost { reason: 200 }).await;
        m.handle(LinkEvent::Lost { reason: 200 }).await;
        assert_eq!(counters.snapshot().reconnects, 2);
        assert_eq!(radio.connect_requests(), 2);
    }
}
