//! Persistent configuration model.
//!
//! One [`Config`] record holds the device, network, per-channel and API key
//! settings.  It is persisted whole by the
//! [`ConfigStore`](crate::store::ConfigStore), mutated only through
//! [`ConfigPatch`] merges, and summarised by [`Config::config_hash`] for
//! change detection.
//!
//! Channel actions are a typed tagged union ([`ActionSpec`]).  Parameters
//! arrive on the wire as an integer action code plus a JSON object and are
//! parsed once, at apply time; a channel whose parameters do not fit the
//! schema is kept as [`ActionSpec::Invalid`] and never dispatched.

use std::net::Ipv4Addr;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ParseError, ValidationError};

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

/// Number of physical button/LED channels.
pub const CHANNEL_COUNT: usize = 8;
/// Capacity of the API key store.
pub const MAX_API_KEYS: usize = 16;
/// Firmware version reported in discovery and heartbeats.
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Discovery payload `device_type` for this product.
pub const DEVICE_TYPE_BUTTON_MATRIX: u8 = 0;
pub const DEFAULT_DEVICE_NAME: &str = "PATCOM";

const MAX_NAME_LEN: usize = 31;
const MAX_SSID_LEN: usize = 32;
const MAX_PASSWORD_LEN: usize = 63;
const MAX_URL_LEN: usize = 127;
const MAX_PARAMS_LEN: usize = 255;
const MAX_KEY_NAME_LEN: usize = 31;
const MAX_KEY_VALUE_LEN: usize = 127;
const HEARTBEAT_MIN_MS: u32 = 1_000;
const HEARTBEAT_MAX_MS: u32 = 3_600_000;

// ───────────────────────────────────────────────────────────────
// Runtime tuning (compiled defaults, never persisted)
// ───────────────────────────────────────────────────────────────

/// Timing and threshold constants for the state machines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    /// Continuous active time before a press counts.
    pub hold_ms: u64,
    /// Minimum spacing between activations; also the release filter.
    pub debounce_ms: u64,
    /// A press held longer than this is treated as a stuck input.
    pub stuck_timeout_ms: u64,
    /// No activity for this long drops Active to LowPower.
    pub inactivity_ms: u64,
    /// No activity for this long requests deep sleep.
    pub sleep_timeout_ms: u64,
    pub critical_volts: f32,
    /// Readings must climb this far above a threshold to clear it.
    pub critical_exit_margin_volts: f32,
    /// Warning level above critical; reported but does not change the mode.
    pub low_battery_volts: f32,
    pub discovery_interval_ms: u64,
    pub sync_interval_ms: u64,
    pub power_check_interval_ms: u64,
    pub http_timeout_ms: u32,
    pub identify_ms: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            hold_ms: 100,
            debounce_ms: 50,
            stuck_timeout_ms: 2_000,
            inactivity_ms: 60_000,
            sleep_timeout_ms: 300_000,
            critical_volts: 6.0,
            critical_exit_margin_volts: 0.2,
            low_battery_volts: 6.5,
            discovery_interval_ms: 30_000,
            sync_interval_ms: 60_000,
            power_check_interval_ms: 1_000,
            http_timeout_ms: 3_000,
            identify_ms: 3_000,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Field helpers
// ───────────────────────────────────────────────────────────────

/// `true` for absolute `http://` or `https://` URLs with a non-empty host.
///
/// Whitespace and control bytes are rejected anywhere in the URL.  An
/// explicit port must be a non-zero `u16`.
pub fn is_http_url(s: &str) -> bool {
    let Some(rest) = s.strip_prefix("http://").or_else(|| s.strip_prefix("https://")) else {
        return false;
    };
    if s.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        return false;
    }
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
    let (host, port) = match host_port.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (host_port, None),
    };
    !host.is_empty()
        && host
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_'))
        && port.is_none_or(|p| p.parse::<u16>().is_ok_and(|p| p != 0))
}

/// `true` if every byte is printable ASCII (space through tilde).
pub fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

pub fn parse_ipv4(s: &str) -> Option<Ipv4Addr> {
    s.parse().ok()
}

// ───────────────────────────────────────────────────────────────
// Actions
// ───────────────────────────────────────────────────────────────

/// Action discriminant with its stable wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    None,
    Http,
    Serial,
    Midi,
    Script,
    Osc,
    Webhook,
}

impl ActionKind {
    pub const fn code(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Http => 1,
            Self::Serial => 2,
            Self::Midi => 3,
            Self::Script => 4,
            Self::Osc => 5,
            Self::Webhook => 6,
        }
    }

    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Http),
            2 => Some(Self::Serial),
            3 => Some(Self::Midi),
            4 => Some(Self::Script),
            5 => Some(Self::Osc),
            6 => Some(Self::Webhook),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Http => "http",
            Self::Serial => "serial",
            Self::Midi => "midi",
            Self::Script => "script",
            Self::Osc => "osc",
            Self::Webhook => "webhook",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HttpMethod {
    #[serde(rename = "GET", alias = "get")]
    Get,
    #[default]
    #[serde(rename = "POST", alias = "post")]
    Post,
    #[serde(rename = "PUT", alias = "put")]
    Put,
    #[serde(rename = "DELETE", alias = "delete")]
    Delete,
}

impl HttpMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

fn default_api_key_header() -> String {
    "X-Api-Key".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpParams {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub body: String,
    /// Name of an entry in the API key store, never the key itself.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookParams {
    pub url: String,
    /// Literal shared secret sent as `X-Webhook-Secret`.
    #[serde(default)]
    pub secret: Option<String>,
    /// API key store entry holding the secret; wins over `secret`.
    #[serde(default)]
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialParams {
    pub command: String,
}

const fn default_midi_note() -> u8 {
    60
}
const fn default_midi_velocity() -> u8 {
    127
}
const fn default_midi_channel() -> u8 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiParams {
    #[serde(default = "default_midi_note")]
    pub note: u8,
    #[serde(default = "default_midi_velocity")]
    pub velocity: u8,
    #[serde(default = "default_midi_channel")]
    pub channel: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptParams {
    pub code: String,
}

const fn default_osc_port() -> u16 {
    8000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscParams {
    pub host: String,
    #[serde(default = "default_osc_port")]
    pub port: u16,
    pub address: String,
}

/// Why a channel's action was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidReason {
    UnknownKind,
    TooLong,
    Schema,
    Url,
    ApiKeyName,
    ApiKeyHeader,
    EmptySecret,
    EmptyCommand,
    EmptyCode,
    MultiLine,
    MidiRange,
    MidiChannel,
    OscHost,
    OscPort,
    OscAddress,
}

impl InvalidReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownKind => "unknown action type",
            Self::TooLong => "parameters too long",
            Self::Schema => "parameters do not match schema",
            Self::Url => "url must be a printable http:// or https:// URL",
            Self::ApiKeyName => "api_key name must not be empty",
            Self::ApiKeyHeader => "api_key_header must be printable",
            Self::EmptySecret => "secret must not be empty",
            Self::EmptyCommand => "command must not be empty",
            Self::EmptyCode => "code must not be empty",
            Self::MultiLine => "console actions must be a single line",
            Self::MidiRange => "note and velocity must be 0-127",
            Self::MidiChannel => "midi channel must be 1-16",
            Self::OscHost => "osc host must be an IPv4 address",
            Self::OscPort => "osc port must be non-zero",
            Self::OscAddress => "osc address must start with /",
        }
    }
}

/// A channel whose parameters failed their schema.  Kept verbatim so the
/// management client can read back and fix what it sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidAction {
    pub code: i64,
    pub raw: String,
    pub reason: InvalidReason,
}

/// The side effect bound to a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionSpec {
    None,
    Http(HttpParams),
    Webhook(WebhookParams),
    Serial(SerialParams),
    Midi(MidiParams),
    Script(ScriptParams),
    Osc(OscParams),
    Invalid(InvalidAction),
}

impl ActionSpec {
    /// Parse a wire action code plus its JSON parameter object.
    ///
    /// Never fails: anything that does not fit the kind's schema becomes
    /// [`ActionSpec::Invalid`] carrying the reason.
    pub fn from_wire(code: i64, params: &Value) -> Self {
        let Some(kind) = ActionKind::from_code(code) else {
            return Self::invalid(code, params, InvalidReason::UnknownKind);
        };
        let raw_len = serde_json::to_string(params).map_or(usize::MAX, |s| s.len());
        if raw_len > MAX_PARAMS_LEN {
            return Self::invalid(code, params, InvalidReason::TooLong);
        }

        let parsed = match kind {
            ActionKind::None => Ok(Self::None),
            ActionKind::Http => serde_json::from_value(params.clone()).map(Self::Http),
            ActionKind::Webhook => serde_json::from_value(params.clone()).map(Self::Webhook),
            ActionKind::Serial => serde_json::from_value(params.clone()).map(Self::Serial),
            ActionKind::Midi => serde_json::from_value(params.clone()).map(Self::Midi),
            ActionKind::Script => serde_json::from_value(params.clone()).map(Self::Script),
            ActionKind::Osc => serde_json::from_value(params.clone()).map(Self::Osc),
        };

        match parsed {
            Ok(spec) => match spec.check() {
                Ok(()) => spec,
                Err(reason) => Self::invalid(code, params, reason),
            },
            Err(_) => Self::invalid(code, params, InvalidReason::Schema),
        }
    }

    fn invalid(code: i64, params: &Value, reason: InvalidReason) -> Self {
        Self::Invalid(InvalidAction {
            code,
            raw: serde_json::to_string(params).unwrap_or_default(),
            reason,
        })
    }

    /// Semantic checks beyond what the schema can express.
    pub fn check(&self) -> Result<(), InvalidReason> {
        match self {
            Self::None => Ok(()),
            Self::Http(p) => {
                check_url(&p.url)?;
                if p.api_key.as_deref().is_some_and(str::is_empty) {
                    return Err(InvalidReason::ApiKeyName);
                }
                if p.api_key_header.is_empty() || !is_printable_ascii(&p.api_key_header) {
                    return Err(InvalidReason::ApiKeyHeader);
                }
                Ok(())
            }
            Self::Webhook(p) => {
                check_url(&p.url)?;
                if p.secret.as_deref().is_some_and(str::is_empty)
                    || p.secret_key.as_deref().is_some_and(str::is_empty)
                {
                    return Err(InvalidReason::EmptySecret);
                }
                Ok(())
            }
            Self::Serial(p) => check_line(&p.command, InvalidReason::EmptyCommand),
            Self::Script(p) => check_line(&p.code, InvalidReason::EmptyCode),
            Self::Midi(p) => {
                if p.note > 127 || p.velocity > 127 {
                    return Err(InvalidReason::MidiRange);
                }
                if !(1..=16).contains(&p.channel) {
                    return Err(InvalidReason::MidiChannel);
                }
                Ok(())
            }
            Self::Osc(p) => {
                if parse_ipv4(&p.host).is_none() {
                    return Err(InvalidReason::OscHost);
                }
                if p.port == 0 {
                    return Err(InvalidReason::OscPort);
                }
                if !p.address.starts_with('/') {
                    return Err(InvalidReason::OscAddress);
                }
                Ok(())
            }
            Self::Invalid(inv) => Err(inv.reason),
        }
    }

    pub fn kind(&self) -> Option<ActionKind> {
        match self {
            Self::None => Some(ActionKind::None),
            Self::Http(_) => Some(ActionKind::Http),
            Self::Webhook(_) => Some(ActionKind::Webhook),
            Self::Serial(_) => Some(ActionKind::Serial),
            Self::Midi(_) => Some(ActionKind::Midi),
            Self::Script(_) => Some(ActionKind::Script),
            Self::Osc(_) => Some(ActionKind::Osc),
            Self::Invalid(inv) => ActionKind::from_code(inv.code),
        }
    }

    /// Wire action code (the original code for invalid actions).
    pub fn code(&self) -> i64 {
        match self {
            Self::Invalid(inv) => inv.code,
            other => other.kind().map_or(0, ActionKind::code),
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }

    /// Actions that leave the device over the network.
    pub fn needs_link(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Webhook(_) | Self::Osc(_))
    }

    /// Parameters as a JSON object, as they travel on the wire.
    pub fn params_value(&self) -> Value {
        let value = match self {
            Self::None => Ok(Value::Object(serde_json::Map::new())),
            Self::Http(p) => serde_json::to_value(p),
            Self::Webhook(p) => serde_json::to_value(p),
            Self::Serial(p) => serde_json::to_value(p),
            Self::Midi(p) => serde_json::to_value(p),
            Self::Script(p) => serde_json::to_value(p),
            Self::Osc(p) => serde_json::to_value(p),
            Self::Invalid(inv) => {
                Ok(serde_json::from_str(&inv.raw).unwrap_or_else(|_| Value::String(inv.raw.clone())))
            }
        };
        value.unwrap_or(Value::Null)
    }

    /// Canonical parameter text used by the change-detection hash.
    /// Object keys serialise in sorted order, so equal parameters hash equal.
    pub fn canonical_params(&self) -> String {
        match self {
            Self::Invalid(inv) => inv.raw.clone(),
            other => serde_json::to_string(&other.params_value()).unwrap_or_default(),
        }
    }

    /// Re-run the checks on a decoded record; demote to invalid on failure.
    fn revalidated(self) -> Self {
        if self.is_invalid() {
            return self;
        }
        match self.check() {
            Ok(()) => self,
            Err(reason) => Self::invalid(self.code(), &self.params_value(), reason),
        }
    }
}

fn check_url(url: &str) -> Result<(), InvalidReason> {
    if is_http_url(url) && is_printable_ascii(url) {
        Ok(())
    } else {
        Err(InvalidReason::Url)
    }
}

fn check_line(s: &str, empty: InvalidReason) -> Result<(), InvalidReason> {
    if s.is_empty() {
        return Err(empty);
    }
    if s.contains(['\n', '\r']) {
        return Err(InvalidReason::MultiLine);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Records
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    pub action: ActionSpec,
    pub enabled: bool,
}

impl ChannelConfig {
    fn default_for(index: usize) -> Self {
        Self {
            name: format!("Button {index}"),
            action: ActionSpec::None,
            enabled: true,
        }
    }

    /// Enabled and holding a well-formed action.
    pub fn is_dispatchable(&self) -> bool {
        self.enabled && !self.action.is_invalid()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub ssid: String,
    pub password: String,
    pub use_static_ip: bool,
    pub ip: String,
    pub subnet: String,
    pub gateway: String,
    pub dns: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device_name: String,
    pub device_id: String,
    pub device_type: u8,
    pub brightness: u8,
    pub discoverable: bool,
    pub auto_sync: bool,
    pub config_server_url: String,
    pub heartbeat_interval_ms: u32,
}

impl DeviceConfig {
    /// Compiled-in firmware version; never stored or patched.
    pub fn firmware_version(&self) -> &'static str {
        FIRMWARE_VERSION
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.into(),
            device_id: String::new(),
            device_type: DEVICE_TYPE_BUTTON_MATRIX,
            brightness: 255,
            discoverable: true,
            auto_sync: false,
            config_server_url: String::new(),
            heartbeat_interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyEntry {
    pub name: String,
    pub value: String,
    pub active: bool,
}

/// Bounded named-credential store.  Values are secrets and never leave
/// the device in any outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApiKeyStore {
    entries: heapless::Vec<ApiKeyEntry, MAX_API_KEYS>,
}

impl ApiKeyStore {
    /// Value of an active key.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.active && e.name == name)
            .map(|e| e.value.as_str())
    }

    /// Update an existing key or insert a new one.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ValidationError> {
        check_api_key(name, value)?;
        if let Some(entry) = self.entries.iter_mut().find(|e| e.name == name) {
            entry.value = value.into();
            entry.active = true;
            return Ok(());
        }
        self.entries
            .push(ApiKeyEntry {
                name: name.into(),
                value: value.into(),
                active: true,
            })
            .map_err(|_| ValidationError::ApiKeyStoreFull)
    }

    /// Returns `true` if a key was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.entries.iter().position(|e| e.name == name) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries that no longer pass their checks.
    fn retain_valid(&mut self) {
        self.entries.retain(|e| check_api_key(&e.name, &e.value).is_ok());
    }

    fn validate(&self, errors: &mut Vec<ValidationError>) {
        for e in &self.entries {
            if let Err(err) = check_api_key(&e.name, &e.value) {
                errors.push(err);
            }
        }
    }
}

fn check_api_key(name: &str, value: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.len() > MAX_KEY_NAME_LEN || !is_printable_ascii(name) {
        return Err(ValidationError::ApiKey("name must be 1-31 printable bytes"));
    }
    if value.is_empty() || value.len() > MAX_KEY_VALUE_LEN || !is_printable_ascii(value) {
        return Err(ValidationError::ApiKey("value must be 1-127 printable bytes"));
    }
    Ok(())
}

/// The whole persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    pub network: NetworkConfig,
    pub channels: [ChannelConfig; CHANNEL_COUNT],
    pub api_keys: ApiKeyStore,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            network: NetworkConfig::default(),
            channels: core::array::from_fn(ChannelConfig::default_for),
            api_keys: ApiKeyStore::default(),
        }
    }
}

impl Config {
    /// Defaults with the device id filled in.
    pub fn defaults_for(device_id: &str) -> Self {
        let mut cfg = Self::default();
        cfg.device.device_id = device_id.into();
        cfg
    }

    /// Repair a freshly decoded record field by field.
    ///
    /// Each field that fails its check is reset to its default and the
    /// rest of the record is kept.  Channels whose parameters no longer
    /// pass are demoted to invalid.  Returns the number of fields reset.
    pub fn sanitize(&mut self, device_id: &str) -> usize {
        let defaults = DeviceConfig::default();
        let mut repaired = 0;
        let mut reset = |ok: bool, field: &str| {
            if !ok {
                warn!("Config: stored {} invalid, using default", field);
                repaired += 1;
            }
            ok
        };

        let d = &mut self.device;
        if d.device_id.is_empty() {
            d.device_id = device_id.into();
        }
        if !reset(
            !d.device_name.is_empty()
                && d.device_name.len() <= MAX_NAME_LEN
                && is_printable_ascii(&d.device_name),
            "device_name",
        ) {
            d.device_name = defaults.device_name;
        }
        if !reset(
            d.config_server_url.is_empty()
                || (is_http_url(&d.config_server_url) && d.config_server_url.len() <= MAX_URL_LEN),
            "config_server_url",
        ) {
            d.config_server_url.clear();
        }
        if !reset(
            (HEARTBEAT_MIN_MS..=HEARTBEAT_MAX_MS).contains(&d.heartbeat_interval_ms),
            "heartbeat_interval_ms",
        ) {
            d.heartbeat_interval_ms = defaults.heartbeat_interval_ms;
        }

        let n = &mut self.network;
        if !reset(n.ssid.len() <= MAX_SSID_LEN && is_printable_ascii(&n.ssid), "ssid") {
            n.ssid.clear();
        }
        if !reset(n.password.len() <= MAX_PASSWORD_LEN, "password") {
            n.password.clear();
        }
        for (field, value) in [
            ("ip", &mut n.ip),
            ("subnet", &mut n.subnet),
            ("gateway", &mut n.gateway),
            ("dns", &mut n.dns),
        ] {
            if !reset(value.is_empty() || parse_ipv4(value).is_some(), field) {
                value.clear();
            }
        }
        if n.use_static_ip
            && !reset(!n.ip.is_empty() && !n.gateway.is_empty(), "use_static_ip")
        {
            n.use_static_ip = false;
        }

        for (idx, ch) in self.channels.iter_mut().enumerate() {
            if !reset(ch.name.len() <= MAX_NAME_LEN && is_printable_ascii(&ch.name), "channel name") {
                ch.name = format!("Button {idx}");
            }
            let action = core::mem::replace(&mut ch.action, ActionSpec::None);
            ch.action = action.revalidated();
        }

        let before = self.api_keys.len();
        self.api_keys.retain_valid();
        for _ in self.api_keys.len()..before {
            reset(false, "api key");
        }
        repaired
    }

    /// Collect every validation problem.  Channel-scoped errors are
    /// included; use [`ValidationError::is_fatal`] to separate them.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        self.validate_device(&mut errors);
        self.validate_network(&mut errors);
        for (idx, ch) in self.channels.iter().enumerate() {
            if ch.name.len() > MAX_NAME_LEN || !is_printable_ascii(&ch.name) {
                errors.push(ValidationError::ChannelName(idx as u8));
            }
            if let ActionSpec::Invalid(inv) = &ch.action {
                errors.push(ValidationError::Channel {
                    index: idx as u8,
                    reason: inv.reason.as_str(),
                });
            }
        }
        self.api_keys.validate(&mut errors);

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_device(&self, errors: &mut Vec<ValidationError>) {
        let d = &self.device;
        if d.device_name.is_empty() {
            errors.push(ValidationError::DeviceName("must not be empty"));
        } else if d.device_name.len() > MAX_NAME_LEN {
            errors.push(ValidationError::DeviceName("must be at most 31 bytes"));
        } else if !is_printable_ascii(&d.device_name) {
            errors.push(ValidationError::DeviceName("must be printable"));
        }
        if !d.config_server_url.is_empty()
            && (!is_http_url(&d.config_server_url) || d.config_server_url.len() > MAX_URL_LEN)
        {
            errors.push(ValidationError::ServerUrl);
        }
        if !(HEARTBEAT_MIN_MS..=HEARTBEAT_MAX_MS).contains(&d.heartbeat_interval_ms) {
            errors.push(ValidationError::HeartbeatInterval);
        }
    }

    fn validate_network(&self, errors: &mut Vec<ValidationError>) {
        let n = &self.network;
        if n.ssid.len() > MAX_SSID_LEN || !is_printable_ascii(&n.ssid) {
            errors.push(ValidationError::Ssid);
        }
        if n.password.len() > MAX_PASSWORD_LEN {
            errors.push(ValidationError::Password);
        }
        for (field, value) in [("ip", &n.ip), ("gateway", &n.gateway)] {
            let parsed = parse_ipv4(value);
            if n.use_static_ip && parsed.is_none() {
                errors.push(ValidationError::StaticIp(field));
            } else if !value.is_empty() && parsed.is_none() {
                errors.push(ValidationError::Address(field));
            }
        }
        for (field, value) in [("subnet", &n.subnet), ("dns", &n.dns)] {
            if !value.is_empty() && parse_ipv4(value).is_none() {
                errors.push(ValidationError::Address(field));
            }
        }
    }

    /// Merge a patch onto a copy of this record.  Returns the candidate and
    /// any errors found while merging (values that cannot even be stored).
    pub fn merged(&self, patch: &ConfigPatch) -> (Self, Vec<ValidationError>) {
        let mut next = self.clone();
        let mut errors = Vec::new();

        if let Some(d) = &patch.device {
            if let Some(name) = &d.name {
                next.device.device_name.clone_from(name);
            }
            if let Some(b) = d.brightness {
                match u8::try_from(b) {
                    Ok(b) => next.device.brightness = b,
                    Err(_) => errors.push(ValidationError::Brightness),
                }
            }
            if let Some(v) = d.discoverable {
                next.device.discoverable = v;
            }
            if let Some(v) = d.auto_sync {
                next.device.auto_sync = v;
            }
            if let Some(url) = &d.config_server_url {
                next.device.config_server_url.clone_from(url);
            }
            if let Some(ms) = d.heartbeat_interval_ms {
                match u32::try_from(ms) {
                    Ok(ms) => next.device.heartbeat_interval_ms = ms,
                    Err(_) => errors.push(ValidationError::HeartbeatInterval),
                }
            }
        }

        if let Some(n) = &patch.network {
            let net = &mut next.network;
            for (slot, value) in [
                (&mut net.ssid, &n.ssid),
                (&mut net.password, &n.password),
                (&mut net.ip, &n.ip),
                (&mut net.subnet, &n.subnet),
                (&mut net.gateway, &n.gateway),
                (&mut net.dns, &n.dns),
            ] {
                if let Some(v) = value {
                    slot.clone_from(v);
                }
            }
            if let Some(v) = n.static_ip {
                net.use_static_ip = v;
            }
        }

        for b in &patch.buttons {
            let Some(ch) = usize::try_from(b.id).ok().and_then(|i| next.channels.get_mut(i)) else {
                errors.push(ValidationError::UnknownChannel(b.id));
                continue;
            };
            if let Some(name) = &b.name {
                ch.name.clone_from(name);
            }
            if let Some(enabled) = b.enabled {
                ch.enabled = enabled;
            }
            match (b.action, &b.config) {
                (None, None) => {}
                (Some(code), params) => {
                    let empty = Value::Object(serde_json::Map::new());
                    ch.action = ActionSpec::from_wire(code, params.as_ref().unwrap_or(&empty));
                }
                (None, Some(params)) => {
                    ch.action = ActionSpec::from_wire(ch.action.code(), params);
                }
            }
        }

        for k in &patch.api_keys {
            match k.value.as_deref() {
                None | Some("") => {
                    next.api_keys.remove(&k.name);
                }
                Some(value) => {
                    if let Err(e) = next.api_keys.set(&k.name, value) {
                        errors.push(e);
                    }
                }
            }
        }

        (next, errors)
    }

    /// 32-bit multiplicative rolling hash (`h = h * 31 + byte`) over the
    /// fields a management client edits.  Detects change; not an integrity
    /// check.
    pub fn config_hash_value(&self) -> u32 {
        let mut h: u32 = 0;
        let mut feed = |s: &str| {
            for b in s.bytes() {
                h = h.wrapping_mul(31).wrapping_add(u32::from(b));
            }
        };
        feed(&self.device.device_name);
        feed(&self.device.brightness.to_string());
        feed(&self.network.ssid);
        for ch in &self.channels {
            feed(&ch.name);
            feed(&ch.action.code().to_string());
            feed(&ch.action.canonical_params());
        }
        h
    }

    /// Lowercase hex rendering of [`config_hash_value`](Self::config_hash_value).
    pub fn config_hash(&self) -> String {
        format!("{:x}", self.config_hash_value())
    }
}

// ───────────────────────────────────────────────────────────────
// Patches (wire format for set_config / SET_CONFIG)
// ───────────────────────────────────────────────────────────────

/// Partial update.  Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConfigPatch {
    #[serde(default)]
    pub device: Option<DevicePatch>,
    #[serde(default)]
    pub network: Option<NetworkPatch>,
    #[serde(default)]
    pub buttons: Vec<ChannelPatch>,
    #[serde(default)]
    pub api_keys: Vec<ApiKeyPatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DevicePatch {
    pub name: Option<String>,
    pub brightness: Option<i64>,
    pub discoverable: Option<bool>,
    #[serde(alias = "autoSync")]
    pub auto_sync: Option<bool>,
    #[serde(alias = "configServerUrl")]
    pub config_server_url: Option<String>,
    pub heartbeat_interval_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NetworkPatch {
    pub ssid: Option<String>,
    pub password: Option<String>,
    #[serde(rename = "staticIP", alias = "static_ip")]
    pub static_ip: Option<bool>,
    pub ip: Option<String>,
    pub subnet: Option<String>,
    pub gateway: Option<String>,
    pub dns: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelPatch {
    pub id: i64,
    pub name: Option<String>,
    pub action: Option<i64>,
    pub enabled: Option<bool>,
    pub config: Option<Value>,
}

/// An empty or missing value removes the key.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiKeyPatch {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl ConfigPatch {
    pub fn from_json(text: &str) -> Result<Self, ParseError> {
        serde_json::from_str(text).map_err(|_| ParseError::Malformed)
    }

    /// Patch that forgets the stored WiFi credentials.
    pub fn clear_wifi() -> Self {
        Self {
            network: Some(NetworkPatch {
                ssid: Some(String::new()),
                password: Some(String::new()),
                ..NetworkPatch::default()
            }),
            ..Self::default()
        }
    }
}
