//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (GPIO, WiFi, HTTP, UDP, NVS, console) implement these
//! traits.  The [`AppService`](super::service::AppService) consumes them via
//! generics, so the domain core never touches hardware directly.
//!
//! ## Contract notes
//!
//! - **StoragePort** writes MUST be atomic; no partial writes on power loss.
//! - **HttpPort** implementations MUST honour `timeout_ms`; the control loop
//!   blocks for at most one call.
//! - **DatagramPort::recv** MUST NOT block.

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::config::{CHANNEL_COUNT, HttpMethod};
use crate::error::TransportError;

// ───────────────────────────────────────────────────────────────
// Input port (driven adapter: buttons → domain)
// ───────────────────────────────────────────────────────────────

/// Raw button levels, one per channel, `true` meaning pressed.
pub trait InputPort {
    fn read_levels(&mut self) -> [bool; CHANNEL_COUNT];
}

// ───────────────────────────────────────────────────────────────
// Indicator port (driven adapter: domain → LEDs)
// ───────────────────────────────────────────────────────────────

pub trait IndicatorPort {
    /// Drive the single status LED.
    fn set_status(&mut self, on: bool);

    /// Drive a channel LED at a PWM level (0 = off, 255 = full).
    fn set_channel(&mut self, index: u8, level: u8);
}

// ───────────────────────────────────────────────────────────────
// Power sense port
// ───────────────────────────────────────────────────────────────

pub trait PowerSensePort {
    /// Supply voltage in volts, already scaled for the divider.
    fn read_voltage(&mut self) -> f32;
}

// ───────────────────────────────────────────────────────────────
// Link port (WiFi association state)
// ───────────────────────────────────────────────────────────────

pub trait LinkPort {
    fn is_connected(&self) -> bool;

    /// Current station address, if any.
    fn local_ip(&self) -> Option<Ipv4Addr>;

    fn mac(&self) -> [u8; 6];

    /// Signal strength in dBm when associated.
    fn rssi(&self) -> Option<i8>;
}

// ───────────────────────────────────────────────────────────────
// HTTP port
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub timeout_ms: u32,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One synchronous request, bounded by `request.timeout_ms`.  No retries.
pub trait HttpPort {
    fn request(&mut self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Datagram port (UDP discovery / config)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Sender address; replies go here.
    pub source: SocketAddrV4,
    /// Local port the datagram arrived on.
    pub local_port: u16,
    pub payload: Vec<u8>,
}

pub trait DatagramPort {
    /// Next pending inbound datagram on any listening port.
    fn recv(&mut self) -> Option<Datagram>;

    fn send_to(&mut self, payload: &[u8], dest: SocketAddrV4) -> Result<(), TransportError>;

    /// Answer `request` from the port it arrived on.
    fn reply(&mut self, payload: &[u8], request: &Datagram) -> Result<(), TransportError> {
        self.send_to(payload, request.source)
    }

    fn broadcast(&mut self, payload: &[u8], port: u16) -> Result<(), TransportError>;
}

// ───────────────────────────────────────────────────────────────
// Console port (serial line interface)
// ───────────────────────────────────────────────────────────────

pub trait ConsolePort {
    /// Next complete input line, without its terminator.
    fn read_line(&mut self) -> Option<String>;

    fn write_line(&mut self, line: &str);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// Keys are namespaced to prevent collisions between subsystems.  Write
/// operations MUST be atomic; the ESP-IDF NVS API guarantees this natively
/// and the in-memory simulation achieves it trivially.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Combined device port
// ───────────────────────────────────────────────────────────────

/// Everything the control loop touches on one tick.  Implemented
/// automatically for any type providing all the individual ports.
pub trait DevicePorts:
    InputPort + IndicatorPort + PowerSensePort + LinkPort + HttpPort + DatagramPort + ConsolePort
{
}

impl<T> DevicePorts for T where
    T: InputPort + IndicatorPort + PowerSensePort + LinkPort + HttpPort + DatagramPort + ConsolePort
{
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full or the value exceeds the blob limit.
    Full,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
