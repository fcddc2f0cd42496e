//! Wire messages for the discovery and configuration ports.
//!
//! Every datagram is one JSON object with a `type` discriminator.
//! Requests are parsed in two steps so a caller can tell a garbled
//! payload from a well-formed message of a type we do not serve.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{ChannelConfig, Config, ConfigPatch, FIRMWARE_VERSION};
use crate::error::{ParseError, ValidationError};

/// UDP port for discovery broadcasts and `discover_devices`.
pub const DISCOVERY_PORT: u16 = 12345;
/// UDP port for configuration requests.
pub const CONFIG_PORT: u16 = 12346;

// ───────────────────────────────────────────────────────────────
// Inbound
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    DiscoverDevices,
    GetConfig,
    /// Patch fields sit at the top level next to `type`.
    SetConfig(ConfigPatch),
    TestButton { button: i64 },
}

const REQUEST_TYPES: &[&str] = &["discover_devices", "get_config", "set_config", "test_button"];

impl Request {
    pub fn parse(payload: &[u8]) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_slice(payload).map_err(|_| ParseError::Malformed)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ParseError::UnknownType)?;
        if !REQUEST_TYPES.contains(&kind) {
            return Err(ParseError::UnknownType);
        }
        serde_json::from_value(value).map_err(|_| ParseError::Malformed)
    }

    /// The only local port this request is served on.
    pub const fn port(&self) -> u16 {
        match self {
            Self::DiscoverDevices => DISCOVERY_PORT,
            Self::GetConfig | Self::SetConfig(_) | Self::TestButton { .. } => CONFIG_PORT,
        }
    }
}

/// `true` for a `device_discovery` announcement.  These share the
/// discovery port with requests but never get an answer.
pub fn is_announcement(payload: &[u8]) -> bool {
    #[derive(Deserialize)]
    struct Tagged<'a> {
        #[serde(rename = "type")]
        kind: &'a str,
    }
    serde_json::from_slice::<Tagged<'_>>(payload).is_ok_and(|t| t.kind == "device_discovery")
}

// ───────────────────────────────────────────────────────────────
// Outbound
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    DeviceDiscovery(Announcement),
    DeviceResponse(Announcement),
    ConfigResponse(ConfigView),
    ConfigUpdateResponse(UpdateResult),
    TestResponse { success: bool, message: String },
}

impl Response {
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Runtime facts that are not part of the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceStatus {
    pub ip: Option<Ipv4Addr>,
    pub mac: [u8; 6],
    pub battery_volts: Option<f32>,
    pub uptime_ms: u64,
    pub rssi: Option<i8>,
}

/// Identity and health summary used by discovery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Announcement {
    pub device_id: String,
    pub device_name: String,
    pub device_type: u8,
    pub version: &'static str,
    pub ip: String,
    pub mac: String,
    pub battery: Option<f32>,
    pub uptime: u64,
    pub config_hash: String,
    pub wifi_rssi: Option<i8>,
}

impl Announcement {
    pub fn new(config: &Config, status: &DeviceStatus) -> Self {
        Self {
            device_id: config.device.device_id.clone(),
            device_name: config.device.device_name.clone(),
            device_type: config.device.device_type,
            version: FIRMWARE_VERSION,
            ip: status.ip.unwrap_or(Ipv4Addr::UNSPECIFIED).to_string(),
            mac: format_mac(&status.mac),
            battery: status.battery_volts,
            uptime: status.uptime_ms,
            config_hash: config.config_hash(),
            wifi_rssi: status.rssi,
        }
    }
}

/// `AA:BB:CC:DD:EE:FF`.
pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// The stored record with secrets removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigView {
    pub device_id: String,
    pub config_hash: String,
    pub device: DeviceView,
    pub network: NetworkView,
    pub buttons: Vec<ButtonView>,
    /// Key names only.
    pub api_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceView {
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: u8,
    pub version: &'static str,
    pub brightness: u8,
    pub discoverable: bool,
    pub auto_sync: bool,
    pub config_server_url: String,
    pub heartbeat_interval_ms: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkView {
    pub ssid: String,
    #[serde(rename = "staticIP")]
    pub static_ip: bool,
    pub ip: String,
    pub subnet: String,
    pub gateway: String,
    pub dns: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ButtonView {
    pub id: u8,
    pub name: String,
    pub action: i64,
    pub enabled: bool,
    pub config: Value,
    /// Present when the stored action failed its checks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

impl ButtonView {
    fn new(id: u8, ch: &ChannelConfig) -> Self {
        let mut config = ch.action.params_value();
        if let Value::Object(map) = &mut config {
            let had_secret = map.remove("secret").is_some_and(|v| !v.is_null());
            if had_secret {
                map.insert("has_secret".into(), Value::Bool(true));
            }
        }
        Self {
            id,
            name: ch.name.clone(),
            action: ch.action.code(),
            enabled: ch.enabled,
            config,
            error: ch.action.check().err().map(|r| r.as_str()),
        }
    }
}

impl ConfigView {
    pub fn new(config: &Config) -> Self {
        let d = &config.device;
        let n = &config.network;
        Self {
            device_id: d.device_id.clone(),
            config_hash: config.config_hash(),
            device: DeviceView {
                name: d.device_name.clone(),
                device_type: d.device_type,
                version: d.firmware_version(),
                brightness: d.brightness,
                discoverable: d.discoverable,
                auto_sync: d.auto_sync,
                config_server_url: d.config_server_url.clone(),
                heartbeat_interval_ms: d.heartbeat_interval_ms,
            },
            network: NetworkView {
                ssid: n.ssid.clone(),
                static_ip: n.use_static_ip,
                ip: n.ip.clone(),
                subnet: n.subnet.clone(),
                gateway: n.gateway.clone(),
                dns: n.dns.clone(),
            },
            buttons: config
                .channels
                .iter()
                .zip(0u8..)
                .map(|(ch, id)| ButtonView::new(id, ch))
                .collect(),
            api_keys: config.api_keys.names().map(String::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateResult {
    pub success: bool,
    pub message: String,
    pub config_hash: String,
    pub restart_required: bool,
    pub errors: Vec<String>,
}

impl UpdateResult {
    pub fn rejected(message: &str, config_hash: String, errors: &[ValidationError]) -> Self {
        Self {
            success: false,
            message: message.into(),
            config_hash,
            restart_required: false,
            errors: errors.iter().map(ToString::to_string).collect(),
        }
    }
}
