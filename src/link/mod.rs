//! Wireless link management: states, events, the state machine and reconnect policies.

pub mod machine;
pub mod policy;

pub use machine::{LinkAction, LinkStateMachine};
pub use policy::{ExponentialBackoff, Immediate, ReconnectConfig, ReconnectPolicy};

use std::net::IpAddr;

/// Link lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// Radio not started
    Idle,
    /// Radio start requested, waiting for `Started`
    Starting,
    /// Connect request issued
    Connecting,
    /// Associated with an address
    Connected,
    /// Link lost, reconnect pending
    Disconnected,
}

/// Link-layer notification from the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Station interface is up
    Started,
    /// Association lost
    Lost {
        /// Driver disconnect reason code
        reason: u8,
    },
    /// Address obtained; the link is usable
    AddressAcquired {
        /// Assigned address
        address: IpAddr,
    },
}
