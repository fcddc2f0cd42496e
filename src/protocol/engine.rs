//! Protocol engine: turns inbound datagrams into replies.
//!
//! Every datagram passes a three-gate pipeline:
//!
//! 0. Discovery announcements (our own, looped back, or a peer's) are
//!    ignored before they reach the limiter.
//! 1. **Rate limiting**: token bucket rejects bursts (via `burster`).
//! 2. **Parsing**: malformed JSON and unknown `type`s are dropped.
//! 3. **Port routing**: a request is only served on its own port.
//!
//! Rejections never produce a reply; the caller logs them.  The engine
//! does not own a socket: the caller feeds datagrams in and sends the
//! returned [`Response`] back to the datagram's source.

use core::fmt;
use core::time::Duration;

use burster::Limiter;
use log::{debug, info, warn};

use crate::app::ports::{Datagram, StoragePort};
use crate::config::{CHANNEL_COUNT, ConfigPatch};
use crate::error::ParseError;
use crate::store::{Applied, ApplyError, ConfigStore};

use super::messages::{
    Announcement, ConfigView, DeviceStatus, Request, Response, UpdateResult, is_announcement,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// A `device_discovery` broadcast, ours looped back or a peer's.
    Announcement,
    RateLimited,
    Parse(ParseError),
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Announcement => write!(f, "discovery announcement"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::Parse(e) => write!(f, "{e}"),
        }
    }
}

/// What a served request produced.
#[derive(Debug)]
pub struct Handled {
    pub reply: Response,
    /// A remote test asked for this channel to be activated.
    pub test_channel: Option<u8>,
    /// Result of a `set_config` request.
    pub applied: Option<Result<Applied, ApplyError>>,
}

impl Handled {
    fn reply(reply: Response) -> Self {
        Self {
            reply,
            test_channel: None,
            applied: None,
        }
    }
}

pub struct ProtocolEngine {
    rate_limiter: burster::TokenBucket<fn() -> Duration>,
}

impl Default for ProtocolEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolEngine {
    pub fn new() -> Self {
        Self {
            rate_limiter: burster::TokenBucket::new_with_time_provider(
                10,
                10, // 10 requests per second, 10 burst capacity
                platform_now as fn() -> Duration,
            ),
        }
    }

    /// Consume one rate-limit token; returns `false` when exhausted.
    fn check_rate_limit(&mut self) -> bool {
        self.rate_limiter.try_consume(1).is_ok()
    }

    /// Serve one inbound datagram.
    pub fn handle<S: StoragePort>(
        &mut self,
        datagram: &Datagram,
        store: &mut ConfigStore<S>,
        status: &DeviceStatus,
    ) -> Result<Handled, Rejected> {
        if is_announcement(&datagram.payload) {
            return Err(Rejected::Announcement);
        }
        if !self.check_rate_limit() {
            return Err(Rejected::RateLimited);
        }
        let request = Request::parse(&datagram.payload).map_err(Rejected::Parse)?;
        if request.port() != datagram.local_port {
            return Err(Rejected::Parse(ParseError::WrongPort));
        }
        debug!("Protocol: {:?} from {}", request, datagram.source);

        let handled = match request {
            Request::DiscoverDevices => Handled::reply(Response::DeviceResponse(
                Announcement::new(store.config(), status),
            )),
            Request::GetConfig => {
                Handled::reply(Response::ConfigResponse(ConfigView::new(store.config())))
            }
            Request::SetConfig(patch) => {
                let (result, applied) = apply_patch(store, &patch);
                Handled {
                    reply: Response::ConfigUpdateResponse(result),
                    test_channel: None,
                    applied: Some(applied),
                }
            }
            Request::TestButton { button } => test_button(button),
        };
        Ok(handled)
    }

    /// Periodic discovery broadcast payload.
    pub fn announcement<S: StoragePort>(store: &ConfigStore<S>, status: &DeviceStatus) -> Response {
        Response::DeviceDiscovery(Announcement::new(store.config(), status))
    }
}

/// Apply a patch and describe the result for the management client.
pub fn apply_patch<S: StoragePort>(
    store: &mut ConfigStore<S>,
    patch: &ConfigPatch,
) -> (UpdateResult, Result<Applied, ApplyError>) {
    match store.apply(patch) {
        Ok(applied) => {
            info!("Protocol: configuration updated ({})", applied.config_hash);
            let result = UpdateResult {
                success: true,
                message: "Configuration updated".into(),
                config_hash: applied.config_hash.clone(),
                restart_required: applied.restart_required,
                errors: applied.warnings.iter().map(ToString::to_string).collect(),
            };
            (result, Ok(applied))
        }
        Err(err) => {
            warn!("Protocol: {}", err);
            let message = match &err {
                ApplyError::Invalid(_) => "Configuration rejected",
                ApplyError::Storage(_) => "Configuration not saved",
            };
            let result = UpdateResult::rejected(message, store.config().config_hash(), err.errors());
            (result, Err(err))
        }
    }
}

fn test_button(button: i64) -> Handled {
    match u8::try_from(button) {
        Ok(ch) if usize::from(ch) < CHANNEL_COUNT => Handled {
            reply: Response::TestResponse {
                success: true,
                message: format!("Button {ch} triggered"),
            },
            test_channel: Some(ch),
            applied: None,
        },
        _ => Handled::reply(Response::TestResponse {
            success: false,
            message: "Invalid button index".into(),
        }),
    }
}

// ── Platform time for rate limiter ───────────────────────────

#[cfg(target_os = "espidf")]
fn platform_now() -> Duration {
    let us = unsafe { esp_idf_sys::esp_timer_get_time() };
    Duration::from_micros(us as u64)
}

#[cfg(not(target_os = "espidf"))]
fn platform_now() -> Duration {
    use std::time::Instant;
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    START.get_or_init(Instant::now).elapsed()
}

// ── Tests ────────────────────────────────────────────────────
