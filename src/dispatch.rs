//! Action dispatcher.
//!
//! Turns one channel activation into exactly one side effect and reports
//! what happened.  The channel LED is toggled and pushed to the hardware
//! before any outbound call starts; the call itself is bounded by the
//! HTTP timeout and never retried.
//!
//! ```text
//!  activation ─▶ index ─▶ enabled ─▶ valid ─▶ not None ─▶ link ─▶ perform
//!                  │         │         │         │          │
//!                  ▼         ▼         ▼         ▼          ▼
//!               Skipped   Skipped   Skipped   Skipped    Skipped
//! ```

use core::fmt;
use std::net::SocketAddrV4;

use log::{info, warn};
use serde_json::json;

use crate::app::ports::{
    ConsolePort, DatagramPort, HttpPort, HttpRequest, IndicatorPort, LinkPort,
};
use crate::config::{
    ActionSpec, ApiKeyStore, Config, FIRMWARE_VERSION, HttpMethod, HttpParams, MidiParams,
    OscParams, WebhookParams, parse_ipv4,
};
use crate::drivers::channel_leds::ChannelLeds;
use crate::error::TransportError;

// ───────────────────────────────────────────────────────────────
// Outcome
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnknownChannel,
    Disabled,
    InvalidConfig,
    NoAction,
    LinkDown,
}

impl SkipReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnknownChannel => "unknown-channel",
            Self::Disabled => "disabled",
            Self::InvalidConfig => "invalid-config",
            Self::NoAction => "no-action",
            Self::LinkDown => "link-down",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchFailure {
    /// Request could not be completed.
    Transport(TransportError),
    /// Server answered with a non-2xx status.
    Status(u16),
    /// The action names an API key that is not in the store.
    MissingApiKey,
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{e}"),
            Self::Status(code) => write!(f, "HTTP status {code}"),
            Self::MissingApiKey => write!(f, "missing-api-key"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Skipped(SkipReason),
    Failed(DispatchFailure),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Skipped(r) => write!(f, "skipped ({})", r.as_str()),
            Self::Failed(e) => write!(f, "failed ({e})"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Dispatcher
// ───────────────────────────────────────────────────────────────

/// Everything a dispatch reads besides the ports.
pub struct DispatchContext<'a> {
    pub config: &'a Config,
    pub battery_volts: Option<f32>,
    pub now_ms: u64,
}

pub struct Dispatcher {
    http_timeout_ms: u32,
    user_agent: String,
}

impl Dispatcher {
    pub fn new(http_timeout_ms: u32) -> Self {
        Self {
            http_timeout_ms,
            user_agent: format!("PATCOM/{FIRMWARE_VERSION}"),
        }
    }

    /// Handle one activation of `channel`.
    pub fn dispatch<P>(
        &self,
        channel: u8,
        ctx: &DispatchContext<'_>,
        leds: &mut ChannelLeds,
        io: &mut P,
    ) -> Outcome
    where
        P: IndicatorPort + LinkPort + HttpPort + DatagramPort + ConsolePort,
    {
        let Some(cfg) = ctx.config.channels.get(usize::from(channel)) else {
            return Outcome::Skipped(SkipReason::UnknownChannel);
        };
        let brightness = ctx.config.device.brightness;

        leds.toggle(channel);
        leds.render(ctx.now_ms, brightness, io);

        let outcome = if !cfg.enabled {
            Outcome::Skipped(SkipReason::Disabled)
        } else if cfg.action.is_invalid() {
            Outcome::Skipped(SkipReason::InvalidConfig)
        } else if matches!(cfg.action, ActionSpec::None) {
            Outcome::Skipped(SkipReason::NoAction)
        } else if cfg.action.needs_link() && !io.is_connected() {
            Outcome::Skipped(SkipReason::LinkDown)
        } else {
            self.perform(channel, ctx, io)
        };

        match outcome {
            Outcome::Success => leds.set(channel, true),
            Outcome::Failed(_) => leds.start_error_flash(channel, ctx.now_ms),
            Outcome::Skipped(_) => {}
        }
        leds.render(ctx.now_ms, brightness, io);

        match outcome {
            Outcome::Failed(_) => warn!("Dispatcher: button {} {}", channel, outcome),
            _ => info!("Dispatcher: button {} {}", channel, outcome),
        }
        outcome
    }

    fn perform<P>(&self, channel: u8, ctx: &DispatchContext<'_>, io: &mut P) -> Outcome
    where
        P: HttpPort + DatagramPort + ConsolePort,
    {
        let config = ctx.config;
        let result = match &config.channels[usize::from(channel)].action {
            ActionSpec::Http(p) => self
                .http_request(p, &config.api_keys)
                .and_then(|req| Self::send(io, &req)),
            ActionSpec::Webhook(p) => self
                .webhook_request(p, channel, ctx)
                .and_then(|req| Self::send(io, &req)),
            ActionSpec::Serial(p) => {
                io.write_line(&format!("SERIAL_CMD:{}", p.command));
                Ok(())
            }
            ActionSpec::Midi(MidiParams { note, velocity, channel: midi_ch }) => {
                io.write_line(&format!("MIDI_NOTE:{midi_ch},{note},{velocity}"));
                Ok(())
            }
            ActionSpec::Script(p) => {
                io.write_line(&format!("SCRIPT:{}", p.code));
                Ok(())
            }
            ActionSpec::Osc(p) => Self::send_osc(io, p),
            ActionSpec::None | ActionSpec::Invalid(_) => {
                return Outcome::Skipped(SkipReason::NoAction);
            }
        };
        match result {
            Ok(()) => Outcome::Success,
            Err(e) => Outcome::Failed(e),
        }
    }

    fn base_request(&self, method: HttpMethod, url: &str, body: String) -> HttpRequest {
        HttpRequest {
            method,
            url: url.into(),
            headers: vec![
                ("Content-Type".into(), "application/json".into()),
                ("User-Agent".into(), self.user_agent.clone()),
            ],
            body,
            timeout_ms: self.http_timeout_ms,
        }
    }

    /// Build the request for an HTTP action.
    pub fn http_request(
        &self,
        params: &HttpParams,
        keys: &ApiKeyStore,
    ) -> Result<HttpRequest, DispatchFailure> {
        let mut req = self.base_request(params.method, &params.url, params.body.clone());
        if let Some(name) = &params.api_key {
            let value = keys.get(name).ok_or(DispatchFailure::MissingApiKey)?;
            req.headers.push((params.api_key_header.clone(), value.into()));
        }
        Ok(req)
    }

    /// Build the request for a webhook action.
    pub fn webhook_request(
        &self,
        params: &WebhookParams,
        channel: u8,
        ctx: &DispatchContext<'_>,
    ) -> Result<HttpRequest, DispatchFailure> {
        let device = &ctx.config.device;
        let body = json!({
            "device_id": device.device_id,
            "device_name": device.device_name,
            "button": channel,
            "button_name": ctx.config.channels[usize::from(channel)].name,
            "timestamp": ctx.now_ms,
            "battery": ctx.battery_volts,
        })
        .to_string();
        let mut req = self.base_request(HttpMethod::Post, &params.url, body);

        let secret = match (&params.secret_key, &params.secret) {
            (Some(key), _) => Some(
                ctx.config
                    .api_keys
                    .get(key)
                    .ok_or(DispatchFailure::MissingApiKey)?
                    .to_string(),
            ),
            (None, Some(literal)) => Some(literal.clone()),
            (None, None) => None,
        };
        if let Some(secret) = secret {
            req.headers.push(("X-Webhook-Secret".into(), secret));
        }
        Ok(req)
    }

    fn send(io: &mut impl HttpPort, req: &HttpRequest) -> Result<(), DispatchFailure> {
        let resp = io.request(req).map_err(DispatchFailure::Transport)?;
        if resp.is_success() {
            Ok(())
        } else {
            Err(DispatchFailure::Status(resp.status))
        }
    }

    fn send_osc(io: &mut impl DatagramPort, params: &OscParams) -> Result<(), DispatchFailure> {
        let ip = parse_ipv4(&params.host)
            .ok_or(DispatchFailure::Transport(TransportError::InvalidRequest))?;
        let packet = encode_osc_message(&params.address);
        io.send_to(&packet, SocketAddrV4::new(ip, params.port))
            .map_err(DispatchFailure::Transport)
    }
}

/// OSC 1.0 message with no arguments: the address pattern and an empty
/// type tag string, each NUL-terminated and padded to 4 bytes.
pub fn encode_osc_message(address: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(address.len() + 8);
    push_osc_string(&mut out, address);
    push_osc_string(&mut out, ",");
    out
}

fn push_osc_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    let pad = 4 - (s.len() % 4);
    out.extend(core::iter::repeat_n(0u8, pad));
}
