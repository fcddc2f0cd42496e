//! Error taxonomy for the PATCOM core.
//!
//! Every variant is `Copy` so it can be logged, carried in events and
//! collected into validation reports without allocation.  None of these
//! errors terminates the control loop: callers handle them locally and
//! surface them through `log` and [`AppEvent`](crate::app::events::AppEvent).

use core::fmt;

// ---------------------------------------------------------------------------
// Validation errors (configuration fields)
// ---------------------------------------------------------------------------

/// A configuration field failed validation.
///
/// Channel-scoped errors are non-fatal: the channel is stored as invalid
/// and behaves as disabled.  Everything else rejects the whole patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Device name empty, too long, or not printable.
    DeviceName(&'static str),
    /// Brightness outside 0..=255.
    Brightness,
    /// Config server URL is neither empty nor http(s).
    ServerUrl,
    /// Heartbeat interval outside the accepted window.
    HeartbeatInterval,
    /// SSID too long or not printable.
    Ssid,
    /// Password longer than 63 bytes.
    Password,
    /// Static addressing is enabled but the named field is unusable.
    StaticIp(&'static str),
    /// A non-empty dotted-quad field did not parse.
    Address(&'static str),
    /// A patch referenced a channel outside 0..=7.
    UnknownChannel(i64),
    /// A channel name is too long or not printable.
    ChannelName(u8),
    /// A channel's action parameters are unusable.
    Channel { index: u8, reason: &'static str },
    /// An API key name or value is malformed.
    ApiKey(&'static str),
    /// The API key store already holds the maximum number of keys.
    ApiKeyStoreFull,
}

impl ValidationError {
    /// Whether this error rejects the whole configuration patch.
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Channel { .. })
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceName(why) => write!(f, "device name {why}"),
            Self::Brightness => write!(f, "brightness must be 0-255"),
            Self::ServerUrl => write!(f, "config server URL must start with http:// or https://"),
            Self::HeartbeatInterval => write!(f, "heartbeat interval out of range"),
            Self::Ssid => write!(f, "SSID must be at most 32 printable bytes"),
            Self::Password => write!(f, "password must be at most 63 bytes"),
            Self::StaticIp(field) => write!(f, "static IP requires a valid {field}"),
            Self::Address(field) => write!(f, "{field} is not a valid IPv4 address"),
            Self::UnknownChannel(id) => write!(f, "button {id} does not exist"),
            Self::ChannelName(index) => write!(f, "button {index}: name must be at most 31 printable bytes"),
            Self::Channel { index, reason } => write!(f, "button {index}: {reason}"),
            Self::ApiKey(why) => write!(f, "API key {why}"),
            Self::ApiKeyStoreFull => write!(f, "API key store is full"),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport errors (HTTP, datagrams)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The network link is down.
    NotConnected,
    /// The remote host could not be reached or refused the connection.
    Unreachable,
    /// No response before the call's timeout.
    Timeout,
    /// The request could not be built (bad URL, oversized body).
    InvalidRequest,
    /// Lower-level socket or driver failure.
    Io,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "link down"),
            Self::Unreachable => write!(f, "host unreachable"),
            Self::Timeout => write!(f, "timed out"),
            Self::InvalidRequest => write!(f, "invalid request"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse errors (inbound datagrams and console lines)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Not valid UTF-8 or not valid JSON.
    Malformed,
    /// Valid JSON whose `type` is missing or unknown.
    UnknownType,
    /// A request arrived on a port that does not serve it.
    WrongPort,
    /// Console command word not recognised.
    UnknownCommand,
    /// Console command argument missing or out of range.
    BadArgument,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed message"),
            Self::UnknownType => write!(f, "unknown message type"),
            Self::WrongPort => write!(f, "request on wrong port"),
            Self::UnknownCommand => write!(f, "unknown command"),
            Self::BadArgument => write!(f, "bad argument"),
        }
    }
}

// ---------------------------------------------------------------------------
// Hardware faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareFault {
    /// Input held active past the safety timeout; channel forced idle.
    StuckInput { channel: u8 },
}

impl fmt::Display for HardwareFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StuckInput { channel } => write!(f, "button {channel} stuck active"),
        }
    }
}
