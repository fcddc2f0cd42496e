//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, forward to a
//! management client, or record them in a test.

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::dispatch::Outcome;
use crate::error::{HardwareFault, ParseError, ValidationError};
use crate::power::{ModeChange, PowerMode, SupplyLevel};
use crate::protocol::sync::SyncOutcome;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The service has started with this identity and configuration.
    Started { device_id: String, config_hash: String },

    /// A channel activation (physical or remote test) was accepted.
    ButtonPressed { channel: u8, name: String },

    /// The dispatcher finished handling an activation.
    Dispatched { channel: u8, outcome: Outcome },

    PowerModeChanged(ModeChange),

    /// The supply dropped into the low or critical band.
    SupplyAlert { level: SupplyLevel, volts: f32 },

    /// Inactivity passed the sleep timeout.  The runtime decides what to do.
    SleepRequested,

    Fault(HardwareFault),

    ConfigApplied { config_hash: String, restart_required: bool },

    ConfigRejected { errors: Vec<ValidationError> },

    /// The runtime should restart the device (network settings changed).
    RestartRequested,

    /// Periodic liveness snapshot.
    Heartbeat(HeartbeatData),

    Sync { config_hash: String, outcome: SyncOutcome },

    /// An inbound datagram was ignored.
    DatagramDropped { source: SocketAddrV4, reason: ParseError },

    /// Inbound requests exceeded the rate limit.
    RateLimited { source: SocketAddrV4 },
}

/// A point-in-time liveness snapshot suitable for logging or transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatData {
    pub device_name: String,
    pub version: &'static str,
    pub uptime_ms: u64,
    pub battery_volts: Option<f32>,
    pub mode: PowerMode,
    pub link_up: bool,
    pub ip: Option<Ipv4Addr>,
}
