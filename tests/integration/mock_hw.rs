//! Mock device for integration tests.
//!
//! Implements every device port and records each outbound call in order,
//! so tests can assert on the full history (including relative ordering
//! of LED writes and HTTP requests) without touching real hardware.

use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddrV4};

use patcom::app::events::AppEvent;
use patcom::app::ports::{
    ConsolePort, Datagram, DatagramPort, EventSink, HttpPort, HttpRequest, HttpResponse,
    IndicatorPort, InputPort, LinkPort, PowerSensePort, StorageError, StoragePort,
};
use patcom::app::service::AppService;
use patcom::config::{CHANNEL_COUNT, ConfigPatch, Tuning};
use patcom::error::TransportError;
use patcom::store::ConfigStore;

pub const CLIENT: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 50), 40_000);

// ── Call record ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Status(bool),
    Channel { index: u8, level: u8 },
    Http { method: &'static str, url: String },
    SendTo { dest: SocketAddrV4, payload: Vec<u8> },
    Broadcast { port: u16, payload: Vec<u8> },
    Console(String),
}

// ── MockDevice ────────────────────────────────────────────────

pub struct MockDevice {
    pub levels: [bool; CHANNEL_COUNT],
    pub volts: f32,
    pub link_up: bool,
    pub ip: Ipv4Addr,
    pub http_reply: Result<u16, TransportError>,
    pub inbox: VecDeque<Datagram>,
    pub console_in: VecDeque<String>,
    pub calls: Vec<DeviceCall>,
}

#[allow(dead_code)]
impl MockDevice {
    pub fn new() -> Self {
        Self {
            levels: [false; CHANNEL_COUNT],
            volts: 7.4,
            link_up: true,
            ip: Ipv4Addr::new(192, 168, 1, 77),
            http_reply: Ok(200),
            inbox: VecDeque::new(),
            console_in: VecDeque::new(),
            calls: Vec::new(),
        }
    }

    pub fn press(&mut self, channel: usize, down: bool) {
        self.levels[channel] = down;
    }

    /// Queue a datagram from [`CLIENT`] arriving on `local_port`.
    pub fn deliver(&mut self, local_port: u16, payload: &str) {
        self.inbox.push_back(Datagram {
            source: CLIENT,
            local_port,
            payload: payload.as_bytes().to_vec(),
        });
    }

    pub fn type_line(&mut self, line: &str) {
        self.console_in.push_back(line.to_string());
    }

    pub fn http_requests(&self) -> Vec<(&'static str, String)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::Http { method, url } => Some((*method, url.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn console_out(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::Console(line) => Some(line.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replies sent with `send_to`, decoded as JSON.
    pub fn replies(&self) -> Vec<serde_json::Value> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::SendTo { payload, .. } => serde_json::from_slice(payload).ok(),
                _ => None,
            })
            .collect()
    }

    pub fn broadcasts(&self) -> Vec<(u16, serde_json::Value)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DeviceCall::Broadcast { port, payload } => {
                    serde_json::from_slice(payload).ok().map(|v| (*port, v))
                }
                _ => None,
            })
            .collect()
    }

    /// Index into `calls` of the first HTTP request.
    pub fn first_http_at(&self) -> Option<usize> {
        self.calls
            .iter()
            .position(|c| matches!(c, DeviceCall::Http { .. }))
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl InputPort for MockDevice {
    fn read_levels(&mut self) -> [bool; CHANNEL_COUNT] {
        self.levels
    }
}

impl IndicatorPort for MockDevice {
    fn set_status(&mut self, on: bool) {
        self.calls.push(DeviceCall::Status(on));
    }

    fn set_channel(&mut self, index: u8, level: u8) {
        self.calls.push(DeviceCall::Channel { index, level });
    }
}

impl PowerSensePort for MockDevice {
    fn read_voltage(&mut self) -> f32 {
        self.volts
    }
}

impl LinkPort for MockDevice {
    fn is_connected(&self) -> bool {
        self.link_up
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        self.link_up.then_some(self.ip)
    }

    fn mac(&self) -> [u8; 6] {
        [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
    }

    fn rssi(&self) -> Option<i8> {
        self.link_up.then_some(-55)
    }
}

impl HttpPort for MockDevice {
    fn request(&mut self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.push(DeviceCall::Http {
            method: request.method.as_str(),
            url: request.url.clone(),
        });
        self.http_reply.map(|status| HttpResponse { status })
    }
}

impl DatagramPort for MockDevice {
    fn recv(&mut self) -> Option<Datagram> {
        self.inbox.pop_front()
    }

    fn send_to(&mut self, payload: &[u8], dest: SocketAddrV4) -> Result<(), TransportError> {
        self.calls.push(DeviceCall::SendTo {
            dest,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn broadcast(&mut self, payload: &[u8], port: u16) -> Result<(), TransportError> {
        self.calls.push(DeviceCall::Broadcast {
            port,
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

impl ConsolePort for MockDevice {
    fn read_line(&mut self) -> Option<String> {
        self.console_in.pop_front()
    }

    fn write_line(&mut self, line: &str) {
        self.calls.push(DeviceCall::Console(line.to_string()));
    }
}

// ── MockNvs ───────────────────────────────────────────────────

pub struct MockNvs {
    store: HashMap<String, Vec<u8>>,
    pub fail_writes: bool,
    pub writes: usize,
}

#[allow(dead_code)]
impl MockNvs {
    pub fn new() -> Self {
        Self {
            store: HashMap::new(),
            fail_writes: false,
            writes: 0,
        }
    }

    pub fn raw(&self, namespace: &str, key: &str) -> Option<&[u8]> {
        self.store.get(&format!("{}::{}", namespace, key)).map(Vec::as_slice)
    }
}

impl Default for MockNvs {
    fn default() -> Self {
        Self::new()
    }
}

impl StoragePort for MockNvs {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self.store.get(&format!("{}::{}", namespace, key)) {
            Some(v) => {
                let n = v.len().min(buf.len());
                buf[..n].copy_from_slice(&v[..n]);
                Ok(n)
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.writes += 1;
        self.store.insert(format!("{}::{}", namespace, key), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.store.remove(&format!("{}::{}", namespace, key));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.store.contains_key(&format!("{}::{}", namespace, key))
    }
}

// ── RecordingSink ─────────────────────────────────────────────

pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Fixture helpers ───────────────────────────────────────────

pub const DEVICE_ID: &str = "PATCOM-EFCAFE";

/// A started service over fresh storage, optionally pre-patched.
pub fn make_app(patch: Option<&str>) -> (AppService<MockNvs>, MockDevice, RecordingSink) {
    let mut store = ConfigStore::load(MockNvs::new(), DEVICE_ID);
    if let Some(json) = patch {
        let patch = ConfigPatch::from_json(json).expect("fixture patch parses");
        store.apply(&patch).expect("fixture patch applies");
    }
    let mut app = AppService::new(store, Tuning::default(), 0);
    let mut sink = RecordingSink::new();
    app.start(&mut sink);
    (app, MockDevice::new(), sink)
}

/// Tick every `step_ms` over `[from_ms, to_ms]`.
pub fn run(
    app: &mut AppService<MockNvs>,
    dev: &mut MockDevice,
    sink: &mut RecordingSink,
    from_ms: u64,
    to_ms: u64,
    step_ms: u64,
) {
    let mut now = from_ms;
    while now <= to_ms {
        app.tick(now, dev, sink);
        now += step_ms;
    }
}
