//! Configuration sync with a management server.
//!
//! The agent announces the current config hash to the configured server
//! whenever it differs from the last hash the server acknowledged.  There
//! is no backlog: a failed attempt is simply repeated on the next interval.

use core::fmt;

use log::{info, warn};
use serde_json::json;

use crate::app::ports::{HttpPort, HttpRequest};
use crate::config::{Config, HttpMethod};
use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Server acknowledged the hash.
    Synced,
    /// The hash was already acknowledged; nothing sent.
    Unchanged,
    /// Sync is off, no server is set, the link is down, or power is critical.
    NotAttempted,
    Rejected(u16),
    Failed(TransportError),
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synced => write!(f, "synced"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::NotAttempted => write!(f, "not attempted"),
            Self::Rejected(code) => write!(f, "rejected (HTTP {code})"),
            Self::Failed(e) => write!(f, "failed ({e})"),
        }
    }
}

pub struct SyncAgent {
    last_synced: Option<String>,
    timeout_ms: u32,
}

impl SyncAgent {
    pub fn new(timeout_ms: u32) -> Self {
        Self {
            last_synced: None,
            timeout_ms,
        }
    }

    /// Hash the server last acknowledged.
    pub fn last_synced(&self) -> Option<&str> {
        self.last_synced.as_deref()
    }

    /// One sync attempt.  `allowed` folds in link and power gating.
    pub fn run(
        &mut self,
        config: &Config,
        allowed: bool,
        now_ms: u64,
        http: &mut impl HttpPort,
    ) -> (String, SyncOutcome) {
        let hash = config.config_hash();
        let device = &config.device;
        if !allowed || !device.auto_sync || device.config_server_url.is_empty() {
            return (hash, SyncOutcome::NotAttempted);
        }
        if self.last_synced.as_deref() == Some(hash.as_str()) {
            return (hash, SyncOutcome::Unchanged);
        }

        let request = HttpRequest {
            method: HttpMethod::Post,
            url: device.config_server_url.clone(),
            headers: vec![
                ("Content-Type".into(), "application/json".into()),
                ("X-Device-ID".into(), device.device_id.clone()),
                ("X-Config-Hash".into(), hash.clone()),
            ],
            body: json!({
                "device_id": device.device_id,
                "config_hash": hash,
                "timestamp": now_ms,
            })
            .to_string(),
            timeout_ms: self.timeout_ms,
        };

        let outcome = match http.request(&request) {
            Ok(resp) if resp.is_success() => {
                info!("Sync: config {} acknowledged", hash);
                self.last_synced = Some(hash.clone());
                SyncOutcome::Synced
            }
            Ok(resp) => {
                warn!("Sync: server answered {}", resp.status);
                SyncOutcome::Rejected(resp.status)
            }
            Err(e) => {
                warn!("Sync: {}", e);
                SyncOutcome::Failed(e)
            }
        };
        (hash, outcome)
    }
}
